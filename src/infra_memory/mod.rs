mod console_notifier;
mod notifier_fake;
mod token_holder_memory;

pub use console_notifier::*;
pub use notifier_fake::*;
pub use token_holder_memory::*;
