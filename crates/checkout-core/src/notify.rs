//! Buyer Notification
//!
//! Dispatches the post-purchase notification (course access email). The
//! store's notified-set, not the notifier, is what guards against duplicate
//! sends across webhook re-delivery.

use async_trait::async_trait;

use crate::error::Result;
use crate::store::EmailAddress;
use crate::webhook::WebhookPayload;

/// Downstream notification dispatch
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify the buyer that their purchase was confirmed
    async fn purchase_confirmed(&self, email: &EmailAddress, payload: &WebhookPayload)
    -> Result<()>;
}

/// Logging stand-in for the transactional email provider
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn purchase_confirmed(
        &self,
        email: &EmailAddress,
        payload: &WebhookPayload,
    ) -> Result<()> {
        // TODO: wire up the transactional email provider
        tracing::info!(
            email = %email,
            payment_link_id = %payload.payment_link_id,
            payment_id = %payload.payment_id,
            "Sending course access email"
        );
        Ok(())
    }
}
