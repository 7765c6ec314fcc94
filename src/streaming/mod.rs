mod api;
mod handlers;
mod server;

pub use api::{ApiError, ApiResult};
pub use server::{build_router, AppState, StreamServer};
