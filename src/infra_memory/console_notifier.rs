use crate::domain_port::UserNotifier;
use tracing::warn;

/// Prints notices to stderr, the user-facing channel of the command line client.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl UserNotifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        warn!(notice = message, "user notice");
        eprintln!("{}", message);
    }
}
