//! Messaging (WhatsApp) provider client, grounded on the teacher's
//! `whatsapp::client::WhatsAppClient`: a small `reqwest::Client` with
//! connect/request timeouts talking to a local sidecar, errors swallowed
//! into a result envelope instead of propagated (the caller is always an
//! automation action that must not crash the trigger request, §4.H).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{MessagingProvider, SendResult};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct BridgeResponse {
    success: bool,
    provider_message_id: Option<String>,
    error: Option<String>,
}

/// HTTP client for a WhatsApp-sending sidecar.
pub struct HttpMessagingProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMessagingProvider {
    /// Build a client pointing at `base_url` (e.g. `http://127.0.0.1:3001`).
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build messaging HTTP client, using default");
                reqwest::Client::default()
            });
        Self { client, base_url }
    }
}

#[async_trait]
impl MessagingProvider for HttpMessagingProvider {
    async fn send_templated(
        &self,
        tenant_code: &str,
        to: &str,
        template_name: &str,
        language: &str,
        variables: &[String],
    ) -> SendResult {
        let url = format!("{}/send-templated", self.base_url);
        let body = serde_json::json!({
            "tenantCode": tenant_code,
            "to": to,
            "templateName": template_name,
            "language": language,
            "variables": variables,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<BridgeResponse>().await {
                Ok(parsed) => SendResult {
                    success: parsed.success,
                    provider_message_id: parsed.provider_message_id,
                    error: parsed.error,
                },
                Err(e) => SendResult {
                    success: false,
                    provider_message_id: None,
                    error: Some(format!("malformed sidecar response: {e}")),
                },
            },
            Ok(resp) => SendResult {
                success: false,
                provider_message_id: None,
                error: Some(format!("sidecar returned {}", resp.status())),
            },
            Err(e) => {
                tracing::warn!(tenant_code, error = %e, "messaging provider request failed");
                SendResult {
                    success: false,
                    provider_message_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
