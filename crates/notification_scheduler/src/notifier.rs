use async_trait::async_trait;
use tracing::info;

use crate::types::{DueNotification, NotificationError};

/// Delivers fired alerts to users.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends an alert. Returns a delivery id.
    async fn send_opening_soon(
        &self,
        notification: &DueNotification,
    ) -> Result<String, NotificationError>;
}

/// Notifier that only writes the alert to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_opening_soon(
        &self,
        notification: &DueNotification,
    ) -> Result<String, NotificationError> {
        info!("🔔 [ALERT] To user {}: {}", notification.user_id, notification.subject());
        info!("🔔 [ALERT] {}", notification.message());

        Ok(format!("log-{}", notification.id))
    }
}
