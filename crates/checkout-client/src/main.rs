//! Checkout Poller
//!
//! Registers the buyer's purchase intent, then polls the status endpoint at
//! a fixed interval until the purchase is confirmed. Each tick awaits the
//! in-flight request before the next fires, so polls never overlap even if
//! a request hangs past the interval.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_client::StatusClient;

/// Poller configuration
#[derive(Clone, Debug)]
struct PollerConfig {
    /// Checkout server base URL
    base_url: String,

    /// Buyer email to poll under
    email: String,

    /// Payment link being purchased
    payment_link_id: String,

    /// Fixed polling interval
    interval: Duration,
}

impl PollerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let base_url =
            std::env::var("CHECKOUT_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let email = std::env::var("BUYER_EMAIL")
            .map_err(|_| anyhow::anyhow!("BUYER_EMAIL not set"))?;
        let payment_link_id = std::env::var("PAYMENT_LINK_ID")
            .map_err(|_| anyhow::anyhow!("PAYMENT_LINK_ID not set"))?;
        let interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or(Duration::from_secs(2), Duration::from_secs);

        Ok(Self {
            base_url,
            email,
            payment_link_id,
            interval,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = PollerConfig::from_env()?;
    let client = StatusClient::new(config.base_url.clone());

    client
        .register(&config.email, &config.payment_link_id)
        .await?;
    tracing::info!(
        email = %config.email,
        payment_link_id = %config.payment_link_id,
        "Registered purchase intent - complete payment on the hosted page"
    );

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match client
            .check_status(&config.email, &config.payment_link_id)
            .await
        {
            Ok(status) if status.should_show_success => {
                tracing::info!("Purchase confirmed - payment received");
                break;
            }
            Ok(status) => {
                tracing::debug!(
                    success = status.success,
                    is_pending = status.is_pending,
                    "Payment still pending"
                );
            }
            Err(e) => {
                // Transient failures look like "still pending" to the buyer.
                tracing::warn!(error = %e, "Status check failed, will retry");
            }
        }
    }

    Ok(())
}
