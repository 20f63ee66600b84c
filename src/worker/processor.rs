//! Job dispatch (§4.F execution step): turns one claimed [`Job`] into a
//! concrete side effect. Dispatch-by-type shape grounded on the teacher's
//! `heartbeat::scheduler::execute_task`/`execute_tool`.
//!
//! Every provider client folds its own failure modes (bad status, malformed
//! response, transport error) into a plain `{success, error}` result rather
//! than a classified error, so standalone job dispatch here always reports
//! provider failure as [`CoreError::Transient`]: the worker's retry-vs-fail
//! decision runs purely on the job's own `attempts`/`maxAttempts` ledger
//! (§4.F), not on error kind, so the classification only affects the HTTP
//! status a human reading `lastError` would never see directly.

use std::sync::Arc;

use serde_json::Value;

use crate::automation::{scoring, AutomationEngine, TenantStore, TriggerContext};
use crate::callback::CallbackSender;
use crate::central::{CentralStore, Job};
use crate::crypto::CryptoKey;
use crate::error::CoreError;
use crate::providers::{
    CalendarProvider, EmailMessage, EmailProvider, MeetingRequest, MessagingProvider,
};
use crate::queue::payload::{JobPayload, WhatsappBroadcastPayload};
use crate::tenant::TenantRegistry;

/// Dependencies shared by every job dispatch.
pub struct ProcessorDeps {
    /// Central store, for tenant secrets lookup.
    pub central: CentralStore,
    /// Tenant connection registry, resolved per job.
    pub registry: Arc<TenantRegistry>,
    /// The automation engine, for `crm.automation_event`/`crm.automation_action`.
    pub engine: Arc<AutomationEngine>,
    /// Outbound callback dispatcher, for `crm.webhook_notify`.
    pub callback: Arc<CallbackSender>,
    /// Messaging provider, for `crm.whatsapp_broadcast`.
    pub messaging: Arc<dyn MessagingProvider>,
    /// Email provider, for `crm.email`/`crm.reminder`.
    pub email: Arc<dyn EmailProvider>,
    /// Calendar provider, for `crm.meeting`.
    pub calendar: Arc<dyn CalendarProvider>,
    /// Key used to decrypt tenant secrets (e.g. the webhook HMAC secret).
    pub crypto_key: CryptoKey,
}

/// Execute one claimed job to completion or a classified failure.
///
/// # Errors
///
/// Returns [`CoreError`] describing why the job failed.
pub async fn process(deps: &ProcessorDeps, job: &Job) -> Result<(), CoreError> {
    let tenant_code = job
        .data
        .get("tenantCode")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Internal("job envelope missing tenantCode".to_string()))?
        .to_string();
    let job_type = job
        .data
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Internal("job envelope missing type".to_string()))?;
    let raw_payload = job.data.get("payload").cloned().unwrap_or(Value::Null);

    let payload = JobPayload::from_envelope(job_type, raw_payload).map_err(CoreError::Permanent)?;

    let handle = deps.registry.resolve(&tenant_code).await?;
    let store = TenantStore::new(handle.pool.clone());

    match payload {
        JobPayload::AutomationEvent(p) => {
            let secret = hmac_secret(deps, &tenant_code).await?;
            deps.engine
                .run_automations(
                    &tenant_code,
                    &store,
                    secret,
                    TriggerContext {
                        trigger: p.trigger,
                        lead_id: p.lead_id,
                        stage_id: p.stage_id,
                        tag_name: p.tag_name,
                        score: p.score,
                        variables: p.variables,
                    },
                )
                .await
                .map_err(CoreError::from)?;
        }

        JobPayload::AutomationAction(p) => {
            let secret = hmac_secret(deps, &tenant_code).await?;
            deps.engine
                .execute_deferred_action(&tenant_code, &store, secret, p)
                .await
                .map_err(CoreError::from)?;
        }

        JobPayload::Email(p) => {
            let result = deps
                .email
                .send_email(
                    &tenant_code,
                    EmailMessage { to: p.to, subject: p.subject, html: p.html, text: p.text },
                )
                .await;
            if !result.success {
                return Err(CoreError::Transient(
                    result.error.unwrap_or_else(|| "email send failed".to_string()),
                ));
            }
        }

        JobPayload::Meeting(p) => {
            let lead_id = p.lead_id;
            let result = deps
                .calendar
                .create_meeting(
                    &tenant_code,
                    MeetingRequest {
                        summary: p.summary,
                        start: p.start,
                        end: p.end,
                        attendees: p.attendees,
                    },
                )
                .await;
            if !result.success {
                return Err(CoreError::Transient(
                    result.error.unwrap_or_else(|| "meeting creation failed".to_string()),
                ));
            }
            if let Some(link) = result.hangout_link {
                let mut lead = store.get_lead(&tenant_code, lead_id).await?;
                if let Value::Object(map) = &mut lead.metadata_extra {
                    map.insert("meetLink".to_string(), Value::String(link));
                }
                store.save_lead(&lead).await.map_err(CoreError::from)?;
            }
        }

        JobPayload::Reminder(p) => {
            let lead = store.get_lead(&tenant_code, p.lead_id).await?;
            let Some(to) = lead.email.clone() else {
                return Err(CoreError::Permanent(
                    "lead has no email address for reminder delivery".to_string(),
                ));
            };
            let result = deps
                .email
                .send_email(
                    &tenant_code,
                    EmailMessage {
                        to,
                        subject: "Reminder".to_string(),
                        html: p.message.clone(),
                        text: p.message,
                    },
                )
                .await;
            if !result.success {
                return Err(CoreError::Transient(
                    result.error.unwrap_or_else(|| "reminder send failed".to_string()),
                ));
            }
        }

        JobPayload::ScoreRefresh(p) => {
            let mut lead = store.get_lead(&tenant_code, p.lead_id).await?;
            let stage = store.get_stage(&tenant_code, lead.stage_id).await.map_err(CoreError::from)?;
            lead.score = scoring::recompute(&lead, stage.as_ref());
            store.save_lead(&lead).await.map_err(CoreError::from)?;
        }

        JobPayload::WebhookNotify(p) => {
            // `CallbackSender::send` already retries internally (§4.G, up to
            // 5 attempts); once it returns, every attempt is in CallbackLog
            // and there is nothing left for the job ledger to retry.
            let secret = hmac_secret(deps, &tenant_code).await?;
            deps.callback.send(&p.callback_url, &p.body, secret.as_deref(), None).await;
        }

        JobPayload::WhatsappBroadcast(p) => {
            dispatch_broadcast(deps, &tenant_code, &store, p).await?;
        }
    }

    Ok(())
}

async fn hmac_secret(deps: &ProcessorDeps, tenant_code: &str) -> Result<Option<String>, CoreError> {
    let Some(secrets) = deps.central.get_secrets(tenant_code).await? else {
        return Ok(None);
    };
    let decrypted = secrets
        .decrypted(&deps.crypto_key)
        .map_err(|e| CoreError::Internal(format!("failed to decrypt tenant secrets: {e}")))?;
    Ok(decrypted.hmac_webhook_secret)
}

async fn dispatch_broadcast(
    deps: &ProcessorDeps,
    tenant_code: &str,
    store: &TenantStore,
    payload: WhatsappBroadcastPayload,
) -> Result<(), CoreError> {
    store.set_broadcast_status(tenant_code, payload.broadcast_id, "sending").await.map_err(CoreError::from)?;

    let mut failures = 0usize;
    for phone in &payload.recipients {
        let conversation_id =
            store.ensure_conversation(tenant_code, phone, None).await.map_err(CoreError::from)?;
        let result = deps
            .messaging
            .send_templated(tenant_code, phone, &payload.template_name, &payload.language, &payload.variables)
            .await;
        store
            .record_message(
                tenant_code,
                conversation_id,
                if result.success { "sent" } else { "failed" },
                &payload.template_name,
                result.provider_message_id.as_deref(),
            )
            .await
            .map_err(CoreError::from)?;
        if !result.success {
            failures = failures.saturating_add(1);
        }
    }

    let all_failed = !payload.recipients.is_empty() && failures == payload.recipients.len();
    let final_status = if all_failed { "failed" } else { "sent" };
    store
        .set_broadcast_status(tenant_code, payload.broadcast_id, final_status)
        .await
        .map_err(CoreError::from)?;

    if all_failed {
        return Err(CoreError::Transient(format!(
            "broadcast {} failed for all {} recipients",
            payload.broadcast_id, failures
        )));
    }
    Ok(())
}
