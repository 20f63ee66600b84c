//! Job payload shapes (§6, §9).
//!
//! The source's job payloads are shaped implicitly by call sites; per
//! §9/§14 that's resolved here as one `JobPayload` enum, one variant per
//! recognized `type` string, each carrying a type-specific struct instead
//! of an open `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The eight job types recognized by the worker (§6 job data envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobPayload {
    /// Re-entry into `runAutomations` for a delayed trigger (§4.I step 6).
    AutomationEvent(AutomationEventPayload),
    /// A single deferred action from a matched rule (§4.H action dispatch).
    AutomationAction(AutomationActionPayload),
    /// A standalone email send.
    Email(EmailPayload),
    /// A standalone calendar meeting creation.
    Meeting(MeetingPayload),
    /// A scheduled reminder message.
    Reminder(ReminderPayload),
    /// Recompute a lead's score.
    ScoreRefresh(ScoreRefreshPayload),
    /// A standalone outbound webhook notification.
    WebhookNotify(WebhookNotifyPayload),
    /// Fan-out of a template to many recipients.
    WhatsappBroadcast(WhatsappBroadcastPayload),
}

impl JobPayload {
    /// The `type` string stored in the job envelope (§6).
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::AutomationEvent(_) => "crm.automation_event",
            JobPayload::AutomationAction(_) => "crm.automation_action",
            JobPayload::Email(_) => "crm.email",
            JobPayload::Meeting(_) => "crm.meeting",
            JobPayload::Reminder(_) => "crm.reminder",
            JobPayload::ScoreRefresh(_) => "crm.score_refresh",
            JobPayload::WebhookNotify(_) => "crm.webhook_notify",
            JobPayload::WhatsappBroadcast(_) => "crm.whatsapp_broadcast",
        }
    }

    /// Parse a `(type, payload)` pair from a stored job envelope.
    ///
    /// # Errors
    ///
    /// Returns a message if `job_type` is unrecognized or `payload` does
    /// not match that type's shape.
    pub fn from_envelope(job_type: &str, payload: Value) -> Result<Self, String> {
        match job_type {
            "crm.automation_event" => serde_json::from_value(payload)
                .map(JobPayload::AutomationEvent)
                .map_err(|e| e.to_string()),
            "crm.automation_action" => serde_json::from_value(payload)
                .map(JobPayload::AutomationAction)
                .map_err(|e| e.to_string()),
            "crm.email" => serde_json::from_value(payload)
                .map(JobPayload::Email)
                .map_err(|e| e.to_string()),
            "crm.meeting" => serde_json::from_value(payload)
                .map(JobPayload::Meeting)
                .map_err(|e| e.to_string()),
            "crm.reminder" => serde_json::from_value(payload)
                .map(JobPayload::Reminder)
                .map_err(|e| e.to_string()),
            "crm.score_refresh" => serde_json::from_value(payload)
                .map(JobPayload::ScoreRefresh)
                .map_err(|e| e.to_string()),
            "crm.webhook_notify" => serde_json::from_value(payload)
                .map(JobPayload::WebhookNotify)
                .map_err(|e| e.to_string()),
            "crm.whatsapp_broadcast" => serde_json::from_value(payload)
                .map(JobPayload::WhatsappBroadcast)
                .map_err(|e| e.to_string()),
            other => Err(format!("unrecognized job type '{other}'")),
        }
    }
}

/// Re-entry payload for `crm.automation_event` (§4.I step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationEventPayload {
    /// The trigger name to re-fire.
    pub trigger: String,
    /// Lead this event concerns, resolved at enqueue time.
    pub lead_id: Uuid,
    /// Stage id, for `stage_enter`/`stage_exit` triggers.
    pub stage_id: Option<Uuid>,
    /// Tag name, for `tag_added`/`tag_removed` triggers.
    pub tag_name: Option<String>,
    /// Lead score, for `score_above`/`score_below` triggers.
    pub score: Option<f64>,
    /// Enriched variables built in step 6 of the trigger protocol.
    pub variables: Value,
}

/// Deferred single-action payload for `crm.automation_action` (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationActionPayload {
    /// The rule this action belongs to (for re-entrancy bookkeeping).
    pub rule_id: Uuid,
    /// Action type (`send_whatsapp`, `move_stage`, ...).
    pub action_type: String,
    /// Action-specific configuration, as declared on the rule.
    pub action_config: Value,
    /// Lead this action acts on.
    pub lead_id: Uuid,
    /// Context variables carried from the triggering event.
    pub ctx_variables: Value,
}

/// Standalone email send payload for `crm.email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    /// Lead this email concerns, if any.
    pub lead_id: Option<Uuid>,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Plain-text body.
    pub text: String,
}

/// Standalone meeting creation payload for `crm.meeting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingPayload {
    /// Lead this meeting concerns.
    pub lead_id: Uuid,
    /// Meeting summary/title.
    pub summary: String,
    /// Start instant, RFC 3339.
    pub start: String,
    /// End instant, RFC 3339.
    pub end: String,
    /// Attendee email addresses.
    pub attendees: Vec<String>,
}

/// Scheduled reminder payload for `crm.reminder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderPayload {
    /// Lead this reminder concerns.
    pub lead_id: Uuid,
    /// Reminder message body.
    pub message: String,
}

/// Score recompute payload for `crm.score_refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRefreshPayload {
    /// Lead whose score should be recomputed.
    pub lead_id: Uuid,
}

/// Standalone webhook payload for `crm.webhook_notify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNotifyPayload {
    /// Destination URL.
    pub callback_url: String,
    /// JSON body to sign and send.
    pub body: Value,
}

/// Broadcast fan-out payload for `crm.whatsapp_broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsappBroadcastPayload {
    /// Broadcast row this fan-out belongs to.
    pub broadcast_id: Uuid,
    /// Template to send.
    pub template_name: String,
    /// Template language code.
    pub language: String,
    /// Recipients, as raw phone numbers.
    pub recipients: Vec<String>,
    /// Per-position variable values, shared across all recipients.
    pub variables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_through_from_envelope() {
        let payload = JobPayload::Reminder(ReminderPayload {
            lead_id: Uuid::new_v4(),
            message: "hi".to_string(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        let parsed = JobPayload::from_envelope(payload.job_type(), json).unwrap();
        assert_eq!(parsed.job_type(), "crm.reminder");
    }

    #[test]
    fn unrecognized_type_is_rejected() {
        assert!(JobPayload::from_envelope("crm.unknown", serde_json::json!({})).is_err());
    }
}
