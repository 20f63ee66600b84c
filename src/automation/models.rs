//! Tenant-owned automation and CRM data model (§3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lead lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    /// Actively worked.
    Open,
    /// Converted successfully.
    Won,
    /// Lost to a competitor or abandoned.
    Lost,
    /// Soft-deleted.
    Archived,
}

impl LeadStatus {
    /// The string stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Open => "open",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
            LeadStatus::Archived => "archived",
        }
    }

    /// Parse from the stored column value, defaulting to `Open`.
    pub fn parse(s: &str) -> Self {
        match s {
            "won" => LeadStatus::Won,
            "lost" => LeadStatus::Lost,
            "archived" => LeadStatus::Archived,
            _ => LeadStatus::Open,
        }
    }
}

/// Lead score breakdown (§3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LeadScore {
    /// Aggregate score.
    pub total: f64,
    /// Recency-of-contact component.
    pub recency: f64,
    /// Engagement component.
    pub engagement: f64,
    /// Pipeline-depth component.
    pub stage_depth: f64,
    /// Deal-size component.
    pub deal_size: f64,
    /// Source-quality component.
    pub source_quality: f64,
}

/// Tenant-owned object references a lead links out to (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadRefs {
    /// Linked appointment id, if any.
    pub appointment: Option<String>,
    /// Linked booking id, if any.
    pub booking: Option<String>,
    /// Linked order id, if any.
    pub order: Option<String>,
    /// Linked meeting id, if any.
    pub meeting: Option<String>,
}

/// A lead (tenant-owned, §3). `(tenantCode, phone, pipelineId)` uniquely
/// identifies a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Row id.
    pub id: Uuid,
    /// Tenant this lead belongs to; duplicated for defensive filtering.
    pub tenant_code: String,
    /// Given name, if known.
    pub first_name: Option<String>,
    /// Family name, if known.
    pub last_name: Option<String>,
    /// Email address, if known.
    pub email: Option<String>,
    /// E.164-ish phone number (validated at the trigger endpoint).
    pub phone: String,
    /// Pipeline this lead is in.
    pub pipeline_id: Uuid,
    /// Current stage within that pipeline.
    pub stage_id: Uuid,
    /// Lifecycle status.
    pub status: LeadStatus,
    /// Deal value, if known.
    pub deal_value: Option<f64>,
    /// Acquisition source label.
    pub source: Option<String>,
    /// Owning user/agent identifier.
    pub assigned_to: Option<String>,
    /// Free-form tag set.
    pub tags: Vec<String>,
    /// Tenant-owned object references.
    pub metadata_refs: LeadRefs,
    /// Free key/value extension bag; condition paths dot into this.
    pub metadata_extra: Value,
    /// Score breakdown.
    pub score: LeadScore,
    /// Last time this lead was contacted.
    pub last_contacted_at: Option<chrono::DateTime<chrono::Utc>>,
    /// When the lead converted to `won`, if it has.
    pub converted_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Soft-delete flag.
    pub is_archived: bool,
    /// Row creation time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A sales pipeline (tenant-owned, §3). Exactly one default per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Row id.
    pub id: Uuid,
    /// Tenant this pipeline belongs to.
    pub tenant_code: String,
    /// Display name.
    pub name: String,
    /// Whether this is the tenant's default pipeline.
    pub is_default: bool,
}

/// A stage within a [`Pipeline`] (tenant-owned, §3). A stage may be
/// `is_won` or `is_lost`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Row id.
    pub id: Uuid,
    /// Tenant this stage belongs to.
    pub tenant_code: String,
    /// Pipeline this stage belongs to.
    pub pipeline_id: Uuid,
    /// Display name.
    pub name: String,
    /// Ordering position within the pipeline.
    pub position: i32,
    /// Whether this is the pipeline's default/entry stage.
    pub is_default: bool,
    /// Whether reaching this stage marks the lead won.
    pub is_won: bool,
    /// Whether reaching this stage marks the lead lost.
    pub is_lost: bool,
    /// Win probability, 0-100.
    pub probability: i32,
}

/// Automation trigger names (§4.H rule selection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Any named business event not otherwise enumerated here
    /// (`form_submitted`, `appointment_confirmed`, ...).
    Named(String),
    /// Lead entered a pipeline stage.
    StageEnter,
    /// Lead left a pipeline stage.
    StageExit,
    /// Lead score crossed above a threshold.
    ScoreAbove,
    /// Lead score crossed below a threshold.
    ScoreBelow,
    /// A tag was added to the lead.
    TagAdded,
    /// A tag was removed from the lead.
    TagRemoved,
    /// The lead has gone quiet for `inactiveDays`.
    NoContact,
}

impl TriggerKind {
    /// Parse a trigger name as received over the wire or stored on a rule.
    pub fn parse(s: &str) -> Self {
        match s {
            "stage_enter" => TriggerKind::StageEnter,
            "stage_exit" => TriggerKind::StageExit,
            "score_above" => TriggerKind::ScoreAbove,
            "score_below" => TriggerKind::ScoreBelow,
            "tag_added" => TriggerKind::TagAdded,
            "tag_removed" => TriggerKind::TagRemoved,
            "no_contact" => TriggerKind::NoContact,
            other => TriggerKind::Named(other.to_string()),
        }
    }

    /// The string stored on the rule / received over the wire.
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::Named(s) => s,
            TriggerKind::StageEnter => "stage_enter",
            TriggerKind::StageExit => "stage_exit",
            TriggerKind::ScoreAbove => "score_above",
            TriggerKind::ScoreBelow => "score_below",
            TriggerKind::TagAdded => "tag_added",
            TriggerKind::TagRemoved => "tag_removed",
            TriggerKind::NoContact => "no_contact",
        }
    }
}

/// Gating configuration for a rule's trigger (§4.H rule selection).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Required stage id, for `stage_enter`/`stage_exit`.
    pub stage_id: Option<Uuid>,
    /// Required pipeline id, for stage-scoped triggers.
    pub pipeline_id: Option<Uuid>,
    /// Score threshold, for `score_above`/`score_below`.
    pub score_threshold: Option<f64>,
    /// Required tag name, for `tag_added`/`tag_removed`.
    pub tag_name: Option<String>,
    /// Inactivity threshold in days, for `no_contact`.
    pub inactive_days: Option<i64>,
}

/// Condition operator (§4.H condition evaluation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Value is an array containing the field value.
    In,
    /// Field value (string or array) contains the condition value.
    Contains,
}

/// A rule's optional single condition (§3, §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted field path into the lead (supports `metadata.extra.*`).
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Comparison value.
    pub value: Value,
}

/// Action type (§3, §4.H executeAction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Send a templated WhatsApp message.
    SendWhatsapp,
    /// Send an email.
    SendEmail,
    /// Move the lead to another pipeline stage.
    MoveStage,
    /// Reassign the lead to another owner.
    AssignTo,
    /// Add a tag.
    AddTag,
    /// Remove a tag.
    RemoveTag,
    /// Invoke the callback sender.
    WebhookNotify,
    /// Create a calendar meeting.
    CreateMeeting,
}

/// One action within a rule's `actions[]` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    /// Action type.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Delay before execution, in minutes; `0` means inline (§4.H).
    pub delay_minutes: i64,
    /// Action-specific configuration (e.g. `{tag: "new"}`, template name).
    pub config: Value,
}

/// A tenant-owned automation rule (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Row id.
    pub id: Uuid,
    /// Tenant this rule belongs to.
    pub tenant_code: String,
    /// Trigger this rule fires on.
    pub trigger: TriggerKind,
    /// Gating configuration for the trigger.
    pub trigger_config: TriggerConfig,
    /// Optional single condition, evaluated against the lead.
    pub condition: Option<Condition>,
    /// Ordered actions to execute on match.
    pub actions: Vec<RuleAction>,
    /// Whether this rule is eligible for matching.
    pub is_active: bool,
    /// Number of times this rule has fired.
    pub execution_count: i64,
    /// Last time this rule fired.
    pub last_executed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Empty-variable policy for a template mapping (§4.H template resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyVariablePolicy {
    /// Abort the send entirely.
    SkipSend,
    /// Substitute the mapping's fallback literal.
    UseFallback,
    /// Substitute an empty string.
    SendAnyway,
}

/// Source a template variable position resolves from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableSource {
    /// A dotted field path into the lead.
    LeadField { path: String },
    /// A fixed literal value.
    Static { value: String },
    /// A formula over other fields (evaluated the same as a lead field for
    /// the subset of expressions this core supports: a dotted path with an
    /// optional fallback).
    Formula { expression: String },
    /// A value injected by the engine itself (e.g. `resolved.meetLink`).
    System { key: String },
    /// Filled in by a human at send time; resolves to empty unless already
    /// present in `ctx.resolved`.
    Manual,
}

/// One position-to-source mapping entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// 1-based placeholder position (`{{1}}`, `{{2}}`, ...).
    pub position: u32,
    /// Where this position's value comes from.
    pub source: VariableSource,
    /// Literal substituted when the resolved value is empty and the
    /// template's policy is `use_fallback`.
    pub fallback: Option<String>,
}

/// A vendor-side messaging template (tenant-owned, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingTemplate {
    /// Row id.
    pub id: Uuid,
    /// Tenant this template belongs to.
    pub tenant_code: String,
    /// Vendor-side template name.
    pub name: String,
    /// Vendor-side language code.
    pub language: String,
    /// Position-to-source mapping.
    pub variables: Vec<TemplateVariable>,
    /// What to do when a resolved variable is empty.
    pub empty_variable_policy: EmptyVariablePolicy,
}
