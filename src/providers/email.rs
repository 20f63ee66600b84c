//! Email provider client, shaped the same way as
//! [`super::whatsapp::HttpMessagingProvider`]: a thin `reqwest` wrapper over
//! a sidecar, never propagating transport errors past a result envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{EmailMessage, EmailProvider, EmailResult};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct BridgeResponse {
    success: bool,
    message_id: Option<String>,
    error: Option<String>,
}

/// HTTP client for an SMTP-sending sidecar.
pub struct HttpEmailProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmailProvider {
    /// Build a client pointing at `base_url`.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build email HTTP client, using default");
                reqwest::Client::default()
            });
        Self { client, base_url }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_email(&self, tenant_code: &str, message: EmailMessage) -> EmailResult {
        let url = format!("{}/send", self.base_url);
        let body = serde_json::json!({
            "tenantCode": tenant_code,
            "to": message.to,
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<BridgeResponse>().await {
                Ok(parsed) => EmailResult {
                    success: parsed.success,
                    message_id: parsed.message_id,
                    error: parsed.error,
                },
                Err(e) => EmailResult {
                    success: false,
                    message_id: None,
                    error: Some(format!("malformed sidecar response: {e}")),
                },
            },
            Ok(resp) => EmailResult {
                success: false,
                message_id: None,
                error: Some(format!("sidecar returned {}", resp.status())),
            },
            Err(e) => {
                tracing::warn!(tenant_code, error = %e, "email provider request failed");
                EmailResult {
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
