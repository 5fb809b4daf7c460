use crate::configuration::StripeSettings;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

// Stripe rejects signatures older than 5 minutes; mirror that window
const SIGNATURE_TOLERANCE_SECONDS: i64 = 300;

pub struct StripeClient {
    http_client: reqwest::Client,
    api_base_url: String,
    secret_key: Secret<String>,
    webhook_secret: Secret<String>,
    success_url: String,
    cancel_url: String,
}

pub struct CheckoutLineItem {
    pub name: String,
    pub currency: String,
    // Minor currency units (cents for usd)
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, serde::Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(thiserror::Error, Debug)]
pub enum CheckoutSessionError {
    #[error("Failed to call the checkout session API")]
    Request(#[from] reqwest::Error),
    #[error("Checkout session request rejected with status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum WebhookVerificationError {
    #[error("Missing stripe-signature header")]
    MissingHeader,
    #[error("Malformed stripe-signature header")]
    MalformedHeader,
    #[error("Webhook timestamp is outside the allowed tolerance")]
    StaleTimestamp,
    #[error("Webhook signature does not match the payload")]
    SignatureMismatch,
    #[error("Failed to deserialize the webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

#[derive(serde::Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(serde::Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    // The shape of data.object depends on the event type, so only the id is
    // pulled out; events without one yield None
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|id| id.as_str())
    }
}

impl StripeClient {
    pub fn new(settings: StripeSettings) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base_url: settings.api_base_url,
            secret_key: settings.secret_key,
            webhook_secret: settings.webhook_secret,
            success_url: settings.success_url,
            cancel_url: settings.cancel_url,
        }
    }

    pub async fn create_checkout_session(
        &self,
        customer_email: &str,
        line_items: &[CheckoutLineItem],
    ) -> Result<CheckoutSession, CheckoutSessionError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base_url);

        // Stripe expects bracketed form encoding, not JSON
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            ("customer_email".into(), customer_email.into()),
        ];
        for (i, item) in line_items.iter().enumerate() {
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                item.currency.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.to_string(),
            ));
            params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CheckoutSessionError::Api { status, body });
        }

        Ok(response.json::<CheckoutSession>().await?)
    }

    // Verification runs over the exact raw bytes Stripe signed
    // The payload is only parsed as JSON after the signature checks out
    pub fn verify_webhook_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookVerificationError> {
        let mut timestamp = None;
        let mut candidate_signatures = Vec::new();
        for part in signature_header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidate_signatures.push(value),
                // Unknown schemes (e.g. v0) are ignored
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(WebhookVerificationError::MalformedHeader)?;
        if candidate_signatures.is_empty() {
            return Err(WebhookVerificationError::MalformedHeader);
        }

        let timestamp_seconds: i64 = timestamp
            .parse()
            .map_err(|_| WebhookVerificationError::MalformedHeader)?;
        if (chrono::Utc::now().timestamp() - timestamp_seconds).abs() > SIGNATURE_TOLERANCE_SECONDS
        {
            return Err(WebhookVerificationError::StaleTimestamp);
        }

        // Stripe signs "{timestamp}.{raw body}" and sends one v1 entry per
        // active secret during secret rotation
        let verified = candidate_signatures.iter().any(|candidate| {
            let Ok(candidate) = hex::decode(candidate) else {
                return false;
            };
            let mut mac =
                HmacSha256::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
                    .expect("HMAC accepts keys of any length");
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(payload);
            // Constant-time comparison
            mac.verify_slice(&candidate).is_ok()
        });
        if !verified {
            return Err(WebhookVerificationError::SignatureMismatch);
        }

        Ok(serde_json::from_slice::<StripeEvent>(payload)?)
    }
}
