//! HTTP layer for on-demand air quality queries.
//!
//! Every endpoint reads through the service's cache; none of them
//! subscribe to updates.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
