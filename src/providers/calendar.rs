//! Calendar provider client, same shape as the other provider clients.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CalendarProvider, MeetingRequest, MeetingResult};

const CONNECT_TIMEOUT_SECS: u64 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct BridgeResponse {
    success: bool,
    hangout_link: Option<String>,
    event_id: Option<String>,
    error: Option<String>,
}

/// HTTP client for a calendar provider (e.g. Google Calendar).
pub struct HttpCalendarProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarProvider {
    /// Build a client pointing at `base_url`.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build calendar HTTP client, using default");
                reqwest::Client::default()
            });
        Self { client, base_url }
    }
}

#[async_trait]
impl CalendarProvider for HttpCalendarProvider {
    async fn create_meeting(&self, tenant_code: &str, request: MeetingRequest) -> MeetingResult {
        let url = format!("{}/calendar/events", self.base_url);
        let body = serde_json::json!({
            "tenantCode": tenant_code,
            "summary": request.summary,
            "start": request.start,
            "end": request.end,
            "attendees": request.attendees,
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<BridgeResponse>().await {
                Ok(parsed) => MeetingResult {
                    success: parsed.success,
                    hangout_link: parsed.hangout_link,
                    event_id: parsed.event_id,
                    error: parsed.error,
                },
                Err(e) => MeetingResult {
                    success: false,
                    hangout_link: None,
                    event_id: None,
                    error: Some(format!("malformed provider response: {e}")),
                },
            },
            Ok(resp) => MeetingResult {
                success: false,
                hangout_link: None,
                event_id: None,
                error: Some(format!("calendar provider returned {}", resp.status())),
            },
            Err(e) => {
                tracing::warn!(tenant_code, error = %e, "calendar provider request failed");
                MeetingResult {
                    success: false,
                    hangout_link: None,
                    event_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
