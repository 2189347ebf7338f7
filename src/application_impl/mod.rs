mod auth_session;
mod middleware;
mod pipeline;
mod refresh_coordinator;

pub use auth_session::*;
pub use middleware::*;
pub use pipeline::*;
pub use refresh_coordinator::*;
