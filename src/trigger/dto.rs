//! Request/response shapes for `POST /workflows/trigger` (§4.I).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Inbound trigger request body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerRequest {
    /// Business event name, matched against rule `trigger`.
    pub trigger: String,
    /// Target phone number, used to resolve/create the lead.
    pub phone: String,
    /// Target email, attached to a newly created lead.
    pub email: Option<String>,
    /// Caller-supplied template/condition variables.
    pub variables: Value,
    /// Free-form event data, folded into `enrichedVariables` as `data.*`.
    pub data: Value,
    /// Whether to create a calendar meeting before rule matching.
    pub requires_meet: bool,
    /// Meeting parameters, used only if `requiresMeet` is set.
    pub meet_config: Option<MeetConfig>,
    /// Outbound callback URL for progress notifications.
    pub callback_url: Option<String>,
    /// Caller-supplied metadata echoed back on every callback.
    pub callback_metadata: Option<Value>,
    /// Minutes to delay rule evaluation; `0` runs inline.
    pub delay_minutes: i64,
    /// Whether to create a lead when none matches `(tenantCode, phone)`.
    pub create_lead_if_missing: bool,
    /// Extra fields folded into a newly created lead.
    pub lead_data: Option<Value>,
}

impl Default for TriggerRequest {
    fn default() -> Self {
        Self {
            trigger: String::new(),
            phone: String::new(),
            email: None,
            variables: Value::Null,
            data: Value::Null,
            requires_meet: false,
            meet_config: None,
            callback_url: None,
            callback_metadata: None,
            delay_minutes: 0,
            create_lead_if_missing: false,
            lead_data: None,
        }
    }
}

/// Calendar meeting parameters supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetConfig {
    /// Meeting title; falls back to the trigger name if absent.
    pub summary: Option<String>,
    /// Start instant, RFC 3339.
    pub start: String,
    /// End instant, RFC 3339.
    pub end: String,
    /// Attendee email addresses.
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Response body for a handled trigger request (§4.I step 8).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    /// Id of the EventLog row created for this request.
    pub event_log_id: Uuid,
    /// Trigger name echoed back.
    pub trigger: String,
    /// Lead resolved or created for this request.
    pub lead_id: Uuid,
    /// Calendar meeting link, if one was created.
    pub meet_link: Option<String>,
    /// Non-fatal calendar failure message, if `requiresMeet` failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meet_warning: Option<String>,
    /// Number of active rules matched against `trigger`.
    pub rules_matched: i32,
    /// Whether rule evaluation was deferred to the queue.
    pub scheduled: bool,
}
