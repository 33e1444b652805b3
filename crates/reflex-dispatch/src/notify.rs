//! Notification delivery seam.
//!
//! Delivery itself (email transport, in-app notices) belongs to the
//! host; the dispatcher only decides when to call which channel, keyed
//! off an action's own notification flags.

/// Sender for completion notifications.
pub trait NotificationSender: Send + Sync {
    fn send_email(&self, user_id: i64, body: &str);
    fn send_in_app(&self, user_id: i64, body: &str);
}
