//! Collaborator contracts for outbound side effects (§6). The core only
//! defines what it asks of these provider clients; vendor protocol detail
//! is out of scope (§1).

pub mod calendar;
pub mod email;
pub mod whatsapp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use calendar::HttpCalendarProvider;
pub use email::HttpEmailProvider;
pub use whatsapp::HttpMessagingProvider;

/// Result of `sendTemplated` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    /// Whether the provider accepted the send.
    pub success: bool,
    /// Provider-assigned message id, if accepted.
    pub provider_message_id: Option<String>,
    /// Error message, if rejected.
    pub error: Option<String>,
}

/// Result of `sendEmail` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailResult {
    /// Whether the provider accepted the send.
    pub success: bool,
    /// Provider-assigned message id, if accepted.
    pub message_id: Option<String>,
    /// Error message, if rejected.
    pub error: Option<String>,
}

/// Result of `createMeeting` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingResult {
    /// Whether the provider created the meeting.
    pub success: bool,
    /// Join link, if created.
    pub hangout_link: Option<String>,
    /// Provider-assigned event id, if created.
    pub event_id: Option<String>,
    /// Error message, if creation failed.
    pub error: Option<String>,
}

/// Recipient/body for `sendEmail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain-text body.
    pub text: String,
}

/// Summary/time window/attendees for `createMeeting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRequest {
    /// Meeting summary/title.
    pub summary: String,
    /// Start instant, RFC 3339.
    pub start: String,
    /// End instant, RFC 3339.
    pub end: String,
    /// Attendee email addresses.
    pub attendees: Vec<String>,
}

/// Messaging (WhatsApp) provider contract (§6).
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Send a templated message to `to` using `template_name`/`language`,
    /// with positional `variables`.
    async fn send_templated(
        &self,
        tenant_code: &str,
        to: &str,
        template_name: &str,
        language: &str,
        variables: &[String],
    ) -> SendResult;
}

/// Email provider contract (§6).
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send `message` on behalf of `tenant_code`.
    async fn send_email(&self, tenant_code: &str, message: EmailMessage) -> EmailResult;
}

/// Calendar provider contract (§6).
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Create a meeting on behalf of `tenant_code`.
    async fn create_meeting(&self, tenant_code: &str, request: MeetingRequest) -> MeetingResult;
}
