pub mod api;
pub mod auth_middleware;

pub use api::create_api_routes;
pub use auth_middleware::{auth_middleware, AuthenticatedUser};
