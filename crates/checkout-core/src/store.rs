//! Purchase State Management
//!
//! Tracks pending purchase intents, completed payments, and dispatched
//! notifications. All state is process-local and lives for the lifetime of
//! the store; nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// Buyer email, normalized to lower case for case-insensitive matching
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Normalize an email for use as a store key
    pub fn normalize(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_lowercase())
    }

    /// Get the address as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A buyer's declared intent to pay, awaiting provider confirmation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPurchase {
    /// Which product/offer the checkout session is for
    pub payment_link_id: String,

    /// When the intent was registered
    pub registered_at: DateTime<Utc>,
}

impl PendingPurchase {
    pub fn new(payment_link_id: impl Into<String>) -> Self {
        Self {
            payment_link_id: payment_link_id.into(),
            registered_at: Utc::now(),
        }
    }
}

/// Result of a status check for one (email, payment link) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatus {
    /// A valid completed webhook has been received for this email
    pub success: bool,

    /// A pending registration exists for this email and payment link
    pub is_pending: bool,

    /// Both of the above: the purchase this caller tracks has completed
    pub should_show_success: bool,
}

impl PurchaseStatus {
    fn evaluate(is_completed: bool, is_pending: bool) -> Self {
        Self {
            success: is_completed,
            is_pending,
            should_show_success: is_pending && is_completed,
        }
    }
}

/// Purchase state storage trait
///
/// Both the status endpoint and the webhook receiver depend on this
/// abstraction rather than on each other's state.
pub trait PurchaseStore: Send + Sync {
    /// Register (or overwrite) a pending purchase for an email
    fn register(&self, email: &EmailAddress, payment_link_id: &str) -> Result<PendingPurchase>;

    /// Get the pending purchase for an email, if any
    fn pending(&self, email: &EmailAddress) -> Result<Option<PendingPurchase>>;

    /// Evaluate the status booleans for one (email, payment link) pair
    fn status(&self, email: &EmailAddress, payment_link_id: &str) -> Result<PurchaseStatus>;

    /// Record that a valid completed payment was matched for this email
    fn mark_completed(&self, email: &EmailAddress) -> Result<()>;

    /// Whether the downstream notification has already been dispatched
    fn was_notified(&self, email: &EmailAddress) -> Result<bool>;

    /// Record that the downstream notification was dispatched
    fn mark_notified(&self, email: &EmailAddress) -> Result<()>;

    /// Delete the pending entry only if it still matches the snapshot taken
    /// when deletion was scheduled. Returns true if an entry was removed.
    ///
    /// A re-registration during the grace window replaces the entry, so the
    /// snapshot no longer matches and the newer intent survives.
    fn remove_pending_if_unchanged(
        &self,
        email: &EmailAddress,
        snapshot: &PendingPurchase,
    ) -> Result<bool>;
}

/// In-memory purchase store
///
/// Single-process only; a multi-instance deployment needs an external shared
/// store behind the same trait.
pub struct MemoryPurchaseStore {
    pending: RwLock<HashMap<EmailAddress, PendingPurchase>>,
    completed: RwLock<HashSet<EmailAddress>>,
    notified: RwLock<HashSet<EmailAddress>>,
}

impl Default for MemoryPurchaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            completed: RwLock::new(HashSet::new()),
            notified: RwLock::new(HashSet::new()),
        }
    }
}

// Lock poisoning only happens if a holder panicked; surface it as a storage
// error instead of propagating the panic.
fn poisoned<G>(_: std::sync::PoisonError<G>) -> CheckoutError {
    CheckoutError::Storage("purchase store lock poisoned".into())
}

impl PurchaseStore for MemoryPurchaseStore {
    fn register(&self, email: &EmailAddress, payment_link_id: &str) -> Result<PendingPurchase> {
        let entry = PendingPurchase::new(payment_link_id);
        let mut pending = self.pending.write().map_err(poisoned)?;
        pending.insert(email.clone(), entry.clone());
        Ok(entry)
    }

    fn pending(&self, email: &EmailAddress) -> Result<Option<PendingPurchase>> {
        let pending = self.pending.read().map_err(poisoned)?;
        Ok(pending.get(email).cloned())
    }

    fn status(&self, email: &EmailAddress, payment_link_id: &str) -> Result<PurchaseStatus> {
        let is_completed = self.completed.read().map_err(poisoned)?.contains(email);
        let is_pending = self
            .pending
            .read()
            .map_err(poisoned)?
            .get(email)
            .is_some_and(|p| p.payment_link_id == payment_link_id);

        Ok(PurchaseStatus::evaluate(is_completed, is_pending))
    }

    fn mark_completed(&self, email: &EmailAddress) -> Result<()> {
        self.completed.write().map_err(poisoned)?.insert(email.clone());
        Ok(())
    }

    fn was_notified(&self, email: &EmailAddress) -> Result<bool> {
        Ok(self.notified.read().map_err(poisoned)?.contains(email))
    }

    fn mark_notified(&self, email: &EmailAddress) -> Result<()> {
        self.notified.write().map_err(poisoned)?.insert(email.clone());
        Ok(())
    }

    fn remove_pending_if_unchanged(
        &self,
        email: &EmailAddress,
        snapshot: &PendingPurchase,
    ) -> Result<bool> {
        let mut pending = self.pending.write().map_err(poisoned)?;
        if pending.get(email) == Some(snapshot) {
            pending.remove(email);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(s: &str) -> EmailAddress {
        EmailAddress::normalize(s)
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(email("A@X.com"), email("a@x.com"));
        assert_eq!(email(" Buyer@Example.COM ").as_str(), "buyer@example.com");
    }

    #[test]
    fn test_register_then_status_is_pending_only() {
        let store = MemoryPurchaseStore::new();
        let e = email("a@x.com");

        store.register(&e, "L1").unwrap();
        let status = store.status(&e, "L1").unwrap();

        assert!(status.is_pending);
        assert!(!status.success);
        assert!(!status.should_show_success);
    }

    #[test]
    fn test_status_without_registration() {
        let store = MemoryPurchaseStore::new();
        let e = email("nobody@x.com");

        // Even a completed payment does not show success without a pending
        // entry for the link being asked about.
        store.mark_completed(&e).unwrap();
        let status = store.status(&e, "L1").unwrap();

        assert!(status.success);
        assert!(!status.is_pending);
        assert!(!status.should_show_success);
    }

    #[test]
    fn test_link_mismatch_is_not_pending() {
        let store = MemoryPurchaseStore::new();
        let e = email("b@x.com");

        store.register(&e, "L1").unwrap();
        let status = store.status(&e, "L2").unwrap();

        assert!(!status.is_pending);
        assert!(!status.should_show_success);
    }

    #[test]
    fn test_reregistration_overwrites() {
        let store = MemoryPurchaseStore::new();
        let e = email("c@x.com");

        store.register(&e, "L1").unwrap();
        store.register(&e, "L2").unwrap();

        assert!(!store.status(&e, "L1").unwrap().is_pending);
        assert!(store.status(&e, "L2").unwrap().is_pending);
    }

    #[test]
    fn test_completed_and_pending_shows_success() {
        let store = MemoryPurchaseStore::new();
        let e = email("d@x.com");

        store.register(&e, "L1").unwrap();
        store.mark_completed(&e).unwrap();
        let status = store.status(&e, "L1").unwrap();

        assert!(status.success);
        assert!(status.is_pending);
        assert!(status.should_show_success);
    }

    #[test]
    fn test_notified_flag() {
        let store = MemoryPurchaseStore::new();
        let e = email("e@x.com");

        assert!(!store.was_notified(&e).unwrap());
        store.mark_notified(&e).unwrap();
        assert!(store.was_notified(&e).unwrap());
    }

    #[test]
    fn test_compare_and_delete_removes_unchanged_entry() {
        let store = MemoryPurchaseStore::new();
        let e = email("f@x.com");

        let snapshot = store.register(&e, "L1").unwrap();
        assert!(store.remove_pending_if_unchanged(&e, &snapshot).unwrap());
        assert!(store.pending(&e).unwrap().is_none());
    }

    #[test]
    fn test_compare_and_delete_spares_reregistered_entry() {
        let store = MemoryPurchaseStore::new();
        let e = email("g@x.com");

        let snapshot = store.register(&e, "L1").unwrap();
        // Buyer re-registers during the grace window.
        store.register(&e, "L2").unwrap();

        assert!(!store.remove_pending_if_unchanged(&e, &snapshot).unwrap());
        assert!(store.status(&e, "L2").unwrap().is_pending);
    }
}
