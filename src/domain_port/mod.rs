mod token_holder;
mod transport;
mod user_notifier;

pub use token_holder::*;
pub use transport::*;
pub use user_notifier::*;
