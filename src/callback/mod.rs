//! Signed callback dispatcher (§4.G): outbound webhook delivery with HMAC
//! signing and retry. Grounded on the teacher's
//! `whatsapp::client::WhatsAppClient` for the HTTP client shape (connect/
//! request timeouts, errors folded into a result rather than propagated).

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use crate::central::{CallbackLog, CentralStore};

type HmacSha256 = Hmac<Sha256>;

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 16_000;
const RESPONSE_SNIPPET_LEN: usize = 500;
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Outcome of a single callback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response; dispatch is done.
    Delivered,
    /// Non-2xx or network failure, eligible for retry.
    Retryable,
    /// 4xx other than 408/429; dispatch stops (§4.G).
    Terminal,
}

/// HMAC-signed outbound webhook dispatcher.
#[derive(Clone)]
pub struct CallbackSender {
    client: reqwest::Client,
    central: CentralStore,
}

impl CallbackSender {
    /// Build a sender backed by the central store's `callbacklogs` table.
    pub fn new(central: CentralStore) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build callback HTTP client, using default");
                reqwest::Client::default()
            });
        Self { client, central }
    }

    /// Fire-and-forget dispatch (§4.I step 5, §4.H `webhook_notify`): spawn
    /// a task that retries independently of the caller.
    pub fn dispatch(&self, callback_url: String, payload: Value) {
        self.dispatch_with_secret(callback_url, payload, None, None)
    }

    /// Same as [`Self::dispatch`] but with an explicit HMAC secret and
    /// optional associated event log id.
    pub fn dispatch_with_secret(
        &self,
        callback_url: String,
        payload: Value,
        secret: Option<String>,
        event_log_id: Option<Uuid>,
    ) {
        let sender = self.clone();
        tokio::spawn(async move {
            sender.send(&callback_url, &payload, secret.as_deref(), event_log_id).await;
        });
    }

    /// `send(callbackUrl, payload, secret)`: POST the payload with an HMAC
    /// signature header, retrying on transient failure up to
    /// [`MAX_ATTEMPTS`] with exponential backoff (§4.G).
    pub async fn send(
        &self,
        callback_url: &str,
        payload: &Value,
        secret: Option<&str>,
        event_log_id: Option<Uuid>,
    ) {
        let body = payload.to_string();
        let signature = sign(&body, secret.unwrap_or(""));

        for attempt in 1..=MAX_ATTEMPTS {
            let outcome = self.attempt(callback_url, &body, &signature, attempt, event_log_id).await;
            match outcome {
                AttemptOutcome::Delivered | AttemptOutcome::Terminal => return,
                AttemptOutcome::Retryable if attempt == MAX_ATTEMPTS => {
                    tracing::warn!(callback_url, attempt, "callback exhausted retries");
                    return;
                }
                AttemptOutcome::Retryable => {
                    let shift = attempt.saturating_sub(1);
                    let backoff = (BASE_BACKOFF_MS.saturating_mul(1 << shift)).min(MAX_BACKOFF_MS);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        callback_url: &str,
        body: &str,
        signature: &str,
        attempt: u32,
        event_log_id: Option<Uuid>,
    ) -> AttemptOutcome {
        let signature_header = format!("sha256={signature}");
        let result = self
            .client
            .post(callback_url)
            .header("content-type", "application/json")
            .header("x-ecodrix-signature", &signature_header)
            .body(body.to_string())
            .send()
            .await;

        let (http_status, response_snippet, outcome) = match result {
            Ok(resp) => {
                let status = resp.status();
                let snippet = resp
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(RESPONSE_SNIPPET_LEN)
                    .collect::<String>();
                let outcome = if status.is_success() {
                    AttemptOutcome::Delivered
                } else if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
                    AttemptOutcome::Retryable
                } else {
                    AttemptOutcome::Terminal
                };
                (Some(status.as_u16()), Some(snippet), outcome)
            }
            Err(e) => {
                tracing::warn!(callback_url, attempt, error = %e, "callback request failed");
                (None, Some(e.to_string()), AttemptOutcome::Retryable)
            }
        };

        let log = CallbackLog {
            id: Uuid::new_v4(),
            event_log_id,
            callback_url: callback_url.to_string(),
            attempt,
            http_status,
            response_snippet,
            signature_header,
            created_at: Utc::now(),
        };
        if let Err(e) = self.central.insert_callback_log(&log).await {
            tracing::error!(error = %e, "failed to persist callback log");
        }

        outcome
    }
}

/// Compute `hex(hmac_sha256(secret, body))` (§4.G, §6).
pub fn sign(body: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payload_and_secret_yield_identical_signature() {
        assert_eq!(sign("{\"a\":1}", "secret"), sign("{\"a\":1}", "secret"));
    }

    #[test]
    fn any_byte_change_changes_signature() {
        assert_ne!(sign("{\"a\":1}", "secret"), sign("{\"a\":2}", "secret"));
        assert_ne!(sign("{\"a\":1}", "secret"), sign("{\"a\":1}", "other"));
    }

    #[tokio::test]
    async fn delivered_on_2xx_stops_retry_loop() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let central = CentralStore::from_pool(pool);
        let sender = CallbackSender::new(central);

        sender
            .send(&server.uri(), &serde_json::json!({"ok": true}), Some("secret"), None)
            .await;
    }

    #[tokio::test]
    async fn terminal_4xx_does_not_retry() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let central = CentralStore::from_pool(pool);
        let sender = CallbackSender::new(central);

        sender
            .send(&server.uri(), &serde_json::json!({"ok": true}), Some("secret"), None)
            .await;
    }
}
