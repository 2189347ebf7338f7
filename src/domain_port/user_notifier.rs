/// Surfaces a message to the person using the client.
pub trait UserNotifier: Send + Sync {
    fn notify(&self, message: &str);
}
