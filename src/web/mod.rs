pub mod responses;
pub mod reviews;
pub mod router;
pub mod state;

pub use state::AppState;
