//! `executeAction` dispatch (§4.H). Every action either mutates the lead in
//! place, calls a provider, or both; side effects on provider failure are
//! caught and logged to lead activity, never propagated to crash the
//! trigger request (§7 Propagation).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::models::{ActionType, Lead, LeadStatus};
use super::store::TenantStore;
use super::templates::{self, ResolutionContext};
use crate::callback::CallbackSender;
use crate::providers::{CalendarProvider, EmailMessage, EmailProvider, MeetingRequest, MessagingProvider};

/// A trigger re-emitted by an action, to be processed within the same
/// logical chain (§4.H re-entrancy, §4.H move_stage/add_tag/remove_tag).
#[derive(Debug, Clone)]
pub struct ReentrantTrigger {
    /// Trigger name to re-fire (`stage_enter`, `stage_exit`, `tag_added`,
    /// `tag_removed`).
    pub trigger: String,
    /// Stage id, for `stage_enter`/`stage_exit`.
    pub stage_id: Option<Uuid>,
    /// Tag name, for `tag_added`/`tag_removed`.
    pub tag_name: Option<String>,
}

/// Dependencies an action needs to produce its side effect.
pub struct ActionDeps {
    /// Tenant-scoped store for the lead/pipeline/template reads+writes.
    pub store: TenantStore,
    /// Outbound callback dispatcher, for `webhook_notify`.
    pub callback: Arc<CallbackSender>,
    /// Messaging provider, for `send_whatsapp`.
    pub messaging: Arc<dyn MessagingProvider>,
    /// Email provider, for `send_email`.
    pub email: Arc<dyn EmailProvider>,
    /// Calendar provider, for `create_meeting`.
    pub calendar: Arc<dyn CalendarProvider>,
    /// Tenant's decrypted HMAC webhook secret, for `webhook_notify`.
    pub hmac_secret: Option<String>,
}

/// Whether an action type is eligible for inline execution when
/// `delayMinutes == 0` (§4.H: "tag changes, assignment, stage move").
pub fn is_low_latency(action_type: ActionType) -> bool {
    matches!(
        action_type,
        ActionType::AddTag | ActionType::RemoveTag | ActionType::AssignTo | ActionType::MoveStage
    )
}

/// Execute one action against `lead`, returning any triggers it re-emits.
///
/// # Errors
///
/// Returns [`sqlx::Error`] only for the underlying persistence of the lead
/// mutation; provider failures are captured into lead activity and do not
/// surface as an `Err`.
pub async fn execute_action(
    action_type: ActionType,
    config: &Value,
    tenant_code: &str,
    lead: &mut Lead,
    ctx_variables: &Value,
    deps: &ActionDeps,
) -> Result<Vec<ReentrantTrigger>, sqlx::Error> {
    match action_type {
        ActionType::AddTag => {
            let tag = config.get("tag").and_then(Value::as_str).unwrap_or_default();
            let changed = !lead.tags.iter().any(|t| t == tag);
            if changed {
                lead.tags.push(tag.to_string());
                deps.store.save_lead(lead).await?;
                return Ok(vec![ReentrantTrigger {
                    trigger: "tag_added".to_string(),
                    stage_id: None,
                    tag_name: Some(tag.to_string()),
                }]);
            }
            Ok(vec![])
        }

        ActionType::RemoveTag => {
            let tag = config.get("tag").and_then(Value::as_str).unwrap_or_default();
            let before = lead.tags.len();
            lead.tags.retain(|t| t != tag);
            if lead.tags.len() != before {
                deps.store.save_lead(lead).await?;
                return Ok(vec![ReentrantTrigger {
                    trigger: "tag_removed".to_string(),
                    stage_id: None,
                    tag_name: Some(tag.to_string()),
                }]);
            }
            Ok(vec![])
        }

        ActionType::AssignTo => {
            let assignee = config.get("assignedTo").and_then(Value::as_str);
            lead.assigned_to = assignee.map(str::to_string);
            deps.store.save_lead(lead).await?;
            deps.store
                .log_activity(
                    tenant_code,
                    lead.id,
                    "assigned",
                    &format!("assigned to {}", assignee.unwrap_or("unassigned")),
                )
                .await?;
            Ok(vec![])
        }

        ActionType::MoveStage => {
            let Some(stage_id) = config
                .get("stageId")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                return Ok(vec![]);
            };
            let exited_stage = lead.stage_id;
            lead.stage_id = stage_id;

            if let Ok(Some(stage)) = deps.store.get_stage(tenant_code, stage_id).await {
                if stage.is_won {
                    lead.status = LeadStatus::Won;
                    lead.converted_at = Some(Utc::now());
                } else if stage.is_lost {
                    lead.status = LeadStatus::Lost;
                }
            }
            deps.store.save_lead(lead).await?;

            Ok(vec![
                ReentrantTrigger {
                    trigger: "stage_exit".to_string(),
                    stage_id: Some(exited_stage),
                    tag_name: None,
                },
                ReentrantTrigger {
                    trigger: "stage_enter".to_string(),
                    stage_id: Some(stage_id),
                    tag_name: None,
                },
            ])
        }

        ActionType::SendWhatsapp => {
            let template_name = config.get("template").and_then(Value::as_str).unwrap_or_default();
            let Ok(Some(template)) = deps.store.get_template_by_name(tenant_code, template_name).await
            else {
                deps.store
                    .log_activity(tenant_code, lead.id, "send_whatsapp_failed", "template not found")
                    .await?;
                return Ok(vec![]);
            };

            let resolved = serde_json::json!({});
            let resolution_ctx = ResolutionContext { lead, event: ctx_variables, resolved: &resolved };
            let variables = match templates::resolve(&template, &resolution_ctx) {
                Ok(v) => v,
                Err(e) => {
                    deps.store.log_activity(tenant_code, lead.id, "send_whatsapp_aborted", &e.to_string()).await?;
                    return Ok(vec![]);
                }
            };

            let conversation_id = deps.store.ensure_conversation(tenant_code, &lead.phone, Some(lead.id)).await?;
            let result = deps
                .messaging
                .send_templated(tenant_code, &lead.phone, template_name, &template.language, &variables)
                .await;

            deps.store
                .record_message(
                    tenant_code,
                    conversation_id,
                    if result.success { "sent" } else { "failed" },
                    template_name,
                    result.provider_message_id.as_deref(),
                )
                .await?;
            if !result.success {
                deps.store
                    .log_activity(
                        tenant_code,
                        lead.id,
                        "send_whatsapp_failed",
                        result.error.as_deref().unwrap_or("unknown error"),
                    )
                    .await?;
            }
            Ok(vec![])
        }

        ActionType::SendEmail => {
            let to = config
                .get("to")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| lead.email.clone())
                .unwrap_or_default();
            let subject = config.get("subject").and_then(Value::as_str).unwrap_or_default().to_string();
            let html = config.get("html").and_then(Value::as_str).unwrap_or_default().to_string();
            let text = config.get("text").and_then(Value::as_str).unwrap_or_default().to_string();

            let result = deps
                .email
                .send_email(tenant_code, EmailMessage { to, subject, html, text })
                .await;
            if !result.success {
                deps.store
                    .log_activity(
                        tenant_code,
                        lead.id,
                        "send_email_failed",
                        result.error.as_deref().unwrap_or("unknown error"),
                    )
                    .await?;
            }
            Ok(vec![])
        }

        ActionType::WebhookNotify => {
            if let Some(url) = config.get("callbackUrl").and_then(Value::as_str) {
                let body = config.get("body").cloned().unwrap_or(Value::Null);
                deps.callback
                    .dispatch_with_secret(url.to_string(), body, deps.hmac_secret.clone(), None);
            }
            Ok(vec![])
        }

        ActionType::CreateMeeting => {
            let summary = config.get("summary").and_then(Value::as_str).unwrap_or("Meeting").to_string();
            let start = config.get("start").and_then(Value::as_str).unwrap_or_default().to_string();
            let end = config.get("end").and_then(Value::as_str).unwrap_or_default().to_string();
            let attendees = config
                .get("attendees")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();

            let result = deps
                .calendar
                .create_meeting(tenant_code, MeetingRequest { summary, start, end, attendees })
                .await;

            if result.success {
                if let Value::Object(map) = &mut lead.metadata_extra {
                    map.insert(
                        "meetLink".to_string(),
                        Value::String(result.hangout_link.unwrap_or_default()),
                    );
                }
                deps.store.save_lead(lead).await?;
            } else {
                deps.store
                    .log_activity(
                        tenant_code,
                        lead.id,
                        "create_meeting_failed",
                        result.error.as_deref().unwrap_or("unknown error"),
                    )
                    .await?;
            }
            Ok(vec![])
        }
    }
}
