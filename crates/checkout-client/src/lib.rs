//! # checkout-client
//!
//! Buyer-side client for the checkout server. Registers the buyer's intent
//! to purchase, then polls the status endpoint until the provider's webhook
//! has been reconciled and the purchase shows as confirmed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use checkout_core::{EmailAddress, PurchaseStatus};

/// Client-side errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    email: &'a str,
    payment_link_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    registered: bool,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    error: String,
}

/// Client for the registration/status endpoint
pub struct StatusClient {
    http: reqwest::Client,
    base_url: String,
}

impl StatusClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Register intent to purchase before opening the hosted payment page.
    ///
    /// The email is normalized here so the client polls under the same key
    /// the webhook receiver will match against.
    pub async fn register(&self, email: &str, payment_link_id: &str) -> Result<bool, ClientError> {
        let email = EmailAddress::normalize(email);
        let response: RegisterResponse = self
            .post(&StatusRequest {
                email: email.as_str(),
                payment_link_id,
                action: Some("register"),
            })
            .await?;
        Ok(response.registered)
    }

    /// Ask whether the purchase this client tracks has completed
    pub async fn check_status(
        &self,
        email: &str,
        payment_link_id: &str,
    ) -> Result<PurchaseStatus, ClientError> {
        let email = EmailAddress::normalize(email);
        self.post(&StatusRequest {
            email: email.as_str(),
            payment_link_id,
            action: None,
        })
        .await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        request: &StatusRequest<'_>,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/check-payment-status", self.base_url))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response
                .json::<ServerError>()
                .await
                .map_or_else(|e| e.to_string(), |e| e.error);
            Err(ClientError::Server(error))
        }
    }
}
