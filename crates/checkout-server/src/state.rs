//! Application State

use std::sync::Arc;

use checkout_core::{MemoryPurchaseStore, Notifier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Purchase store shared by the status endpoint and the webhook receiver
    pub store: Arc<MemoryPurchaseStore>,

    /// Notification dispatch (email stub)
    pub notifier: Arc<dyn Notifier>,

    /// Webhook signing secret (None if not configured - webhooks rejected)
    pub webhook_secret: Option<String>,
}
