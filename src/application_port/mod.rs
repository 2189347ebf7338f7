mod session_client;
mod token_refresher;

pub use session_client::*;
pub use token_refresher::*;
