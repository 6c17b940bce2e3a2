//! Where state changes go once they happen.

use warden_protocol::{Notification, ServerMessage};
use warden_session::ConnectionRegistry;

/// Receives every state change connected users should hear about.
///
/// The authority calls this after the change is complete, so the registry
/// already reflects it.
pub trait Notifier: Send + 'static {
    fn notify(&mut self, registry: &ConnectionRegistry, notification: &Notification);
}

/// Sends each notification to every established connection as a
/// [`ServerMessage::Event`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast;

impl Notifier for Broadcast {
    fn notify(&mut self, registry: &ConnectionRegistry, notification: &Notification) {
        registry.broadcast(&ServerMessage::Event {
            notification: notification.clone(),
        });
    }
}
