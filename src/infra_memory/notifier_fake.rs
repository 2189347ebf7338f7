use crate::domain_port::UserNotifier;
use std::sync::{Mutex, PoisonError};

/// Records notices instead of showing them.
#[derive(Debug, Default)]
pub struct FakeNotifier {
    messages: Mutex<Vec<String>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserNotifier for FakeNotifier {
    fn notify(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
