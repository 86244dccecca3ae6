//! # checkout-core
//!
//! Purchase reconciliation core for the course checkout site.
//!
//! The site sells a single product through a provider-hosted crypto payment
//! link. Because payment happens out-of-band on the provider's page, the
//! server correlates two independently initiated flows:
//!
//! ```text
//! ┌─────────┐ register ┌──────────────┐        ┌──────────────────┐
//! │ Browser │─────────▶│ PurchaseStore│◀───────│ Webhook receiver │
//! │ poller  │◀─────────│  (pending /  │ match  │ (signed provider │
//! └─────────┘  status  │  completed)  │        │  notifications)  │
//!              polls   └──────────────┘        └──────────────────┘
//! ```
//!
//! A status poll reports success only when a completed payment has been
//! matched against a pending registration for the same payment link. State
//! is in-memory and single-process; the [`PurchaseStore`] trait is the seam
//! for swapping in a shared external store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::{EmailAddress, LogNotifier, MemoryPurchaseStore, WebhookHandler};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryPurchaseStore::new());
//! let handler = WebhookHandler::new(store.clone(), Arc::new(LogNotifier));
//!
//! let email = EmailAddress::normalize("buyer@example.com");
//! store.register(&email, "plink_abc")?;
//!
//! let payload = handler.parse_event(&body, &signature, &secret)?;
//! handler.handle(payload).await?;
//! ```

mod error;
mod notify;
mod store;
mod webhook;

pub use error::{CheckoutError, Result};
pub use notify::{LogNotifier, Notifier};
pub use store::{
    EmailAddress, MemoryPurchaseStore, PendingPurchase, PurchaseStatus, PurchaseStore,
};
pub use webhook::{
    Network, PaymentStatus, TokenKind, WebhookHandler, WebhookPayload, PENDING_REMOVAL_DELAY,
    verify_signature,
};
