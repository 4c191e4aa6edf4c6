//! JSON API over the train cache, gate windows and crossing lookup.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::create_router;
pub use state::AppState;
