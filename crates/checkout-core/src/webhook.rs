//! Payment Webhook Handling
//!
//! Verifies signed payment notifications from the provider and reconciles
//! completed payments against registered pending purchases.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CheckoutError, Result};
use crate::notify::Notifier;
use crate::store::{EmailAddress, PendingPurchase, PurchaseStore};

type HmacSha256 = Hmac<Sha256>;

/// Grace period before a matched pending purchase is removed, so in-flight
/// status polls still observe it as pending.
pub const PENDING_REMOVAL_DELAY: Duration = Duration::from_secs(5);

/// Blockchain network the payment settled on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    Ethereum,
    Polygon,
    Base,
    Solana,
}

/// Stablecoin used for the payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Usdc,
    Usdt,
    Pyusd,
}

/// Payment state reported by the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

/// Webhook payload, field names exactly as the provider sends them
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "paymentLinkID")]
    pub payment_link_id: String,

    #[serde(rename = "paymentID")]
    pub payment_id: String,

    #[serde(rename = "fromAddress")]
    pub from_address: String,

    #[serde(rename = "toAddress")]
    pub to_address: String,

    /// On-chain transaction hash
    pub hash: String,

    pub network: Network,

    pub token: TokenKind,

    pub amount: f64,

    pub status: PaymentStatus,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,

    /// Email the payer supplied on the hosted checkout page
    #[serde(rename = "Payer_Email", default)]
    pub payer_email: Option<String>,
}

/// Verify the webhook signature header.
///
/// The provider signs `{toAddress}{amount}` with HMAC-SHA256 and hex-encodes
/// the digest. `amount` is rendered in shortest form (`100`, not `100.0`),
/// matching how the provider concatenates it. The comparison is
/// constant-time.
pub fn verify_signature(
    secret: &str,
    to_address: &str,
    amount: f64,
    signature: &str,
) -> Result<()> {
    let claimed = hex::decode(signature).map_err(|_| CheckoutError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::Config(e.to_string()))?;
    mac.update(format!("{to_address}{amount}").as_bytes());

    mac.verify_slice(&claimed)
        .map_err(|_| CheckoutError::InvalidSignature)
}

/// Webhook handler
pub struct WebhookHandler<S: PurchaseStore + 'static> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    removal_delay: Duration,
}

impl<S: PurchaseStore + 'static> WebhookHandler<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            removal_delay: PENDING_REMOVAL_DELAY,
        }
    }

    /// Override the pending-removal grace period
    pub fn with_removal_delay(mut self, delay: Duration) -> Self {
        self.removal_delay = delay;
        self
    }

    /// Verify the signature and parse the payload
    pub fn parse_event(&self, body: &str, signature: &str, secret: &str) -> Result<WebhookPayload> {
        let payload: WebhookPayload =
            serde_json::from_str(body).map_err(|e| CheckoutError::Payload(e.to_string()))?;

        verify_signature(secret, &payload.to_address, payload.amount, signature)?;

        Ok(payload)
    }

    /// Process a verified webhook event.
    ///
    /// Completion is applied only when the payment is COMPLETED, carries a
    /// payer email, matches a pending purchase for that email's registered
    /// payment link, and the buyer has not already been notified. Anything
    /// else is an idempotent no-op so provider retries are never provoked.
    pub async fn handle(&self, payload: WebhookPayload) -> Result<()> {
        if payload.status != PaymentStatus::Completed {
            tracing::debug!(payment_id = %payload.payment_id, "Ignoring non-completed payment event");
            return Ok(());
        }

        let Some(raw_email) = payload.payer_email.as_deref() else {
            tracing::debug!(payment_id = %payload.payment_id, "Completed payment without payer email");
            return Ok(());
        };

        let email = EmailAddress::normalize(raw_email);
        tracing::info!(email = %email, payment_id = %payload.payment_id, "Processing completed payment");

        let Some(pending) = self.store.pending(&email)? else {
            tracing::info!(email = %email, "No pending purchase for payer");
            return Ok(());
        };

        if pending.payment_link_id != payload.payment_link_id {
            tracing::info!(
                email = %email,
                registered = %pending.payment_link_id,
                received = %payload.payment_link_id,
                "Payment link mismatch, ignoring"
            );
            return Ok(());
        }

        if self.store.was_notified(&email)? {
            tracing::info!(email = %email, "Buyer already notified, skipping re-delivered webhook");
            return Ok(());
        }

        self.store.mark_completed(&email)?;
        self.notifier.purchase_confirmed(&email, &payload).await?;
        self.store.mark_notified(&email)?;

        tracing::info!(email = %email, "Payment completed and notification sent");

        self.schedule_pending_removal(email, pending);

        Ok(())
    }

    /// Remove the pending entry after the grace period, but only if it is
    /// unchanged since the snapshot. A re-registration in the window wins.
    fn schedule_pending_removal(&self, email: EmailAddress, snapshot: PendingPurchase) {
        let store = self.store.clone();
        let delay = self.removal_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.remove_pending_if_unchanged(&email, &snapshot) {
                Ok(true) => {
                    tracing::debug!(email = %email, "Removed pending purchase after grace period");
                }
                Ok(false) => {
                    tracing::debug!(email = %email, "Pending purchase changed during grace period, kept");
                }
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "Failed to remove pending purchase");
                }
            }
        });
    }
}
