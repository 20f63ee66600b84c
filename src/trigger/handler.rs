//! `POST /workflows/trigger` handler (§4.I): the universal entry point
//! into the automation engine. Dispatch-then-respond shape grounded on
//! `openibank-api::handlers` (resolve state, act, map errors via
//! `IntoResponse`).

use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::dto::{TriggerRequest, TriggerResponse};
use super::{validation, TenantCode, TriggerState};
use crate::automation::{TenantStore, TriggerContext};
use crate::central::models::{EventLog, EventLogStatus};
use crate::error::CoreError;
use crate::providers::MeetingRequest;
use crate::queue::payload::{AutomationEventPayload, JobPayload};
use crate::queue::EnqueueOptions;

/// Handle one trigger request, converting any [`CoreError`] to its mapped
/// HTTP response.
pub async fn trigger(
    State(state): State<Arc<TriggerState>>,
    Extension(TenantCode(tenant_code)): Extension<TenantCode>,
    Json(req): Json<TriggerRequest>,
) -> Response {
    match handle(&state, &tenant_code, req).await {
        Ok(body) => (axum::http::StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: &TriggerState,
    tenant_code: &str,
    req: TriggerRequest,
) -> Result<TriggerResponse, CoreError> {
    validation::validate(&req)?;

    let handle = state.registry.resolve(tenant_code).await?;
    let store = TenantStore::new(handle.pool.clone());

    // Step 1: persist EventLog {status: received, payload: sanitized}.
    let event_log_id = Uuid::new_v4();
    let sanitized_payload = serde_json::json!({
        "trigger": req.trigger,
        "phone": req.phone,
        "email": req.email,
        "variables": req.variables,
        "data": req.data,
    });
    let event_log = EventLog {
        id: event_log_id,
        tenant_code: tenant_code.to_string(),
        trigger: req.trigger.clone(),
        phone: Some(req.phone.clone()),
        email: req.email.clone(),
        status: EventLogStatus::Received,
        payload: sanitized_payload,
        rules_matched: 0,
        jobs_created: 0,
        meet_link: None,
        callback_url: req.callback_url.clone(),
        callback_status: None,
        error: None,
        created_at: Utc::now(),
    };
    state.central.insert_event_log(&event_log).await.map_err(CoreError::from)?;

    // Step 2: resolve/create the lead, or fail LEAD_NOT_FOUND.
    let lead = match store.find_lead_by_phone(tenant_code, &req.phone).await.map_err(CoreError::from)? {
        Some(lead) => lead,
        None if req.create_lead_if_missing => {
            let (pipeline, stage) =
                store.ensure_default_pipeline(tenant_code).await.map_err(CoreError::from)?;
            store
                .create_lead(
                    tenant_code,
                    &req.phone,
                    req.email.as_deref(),
                    pipeline.id,
                    stage.id,
                    req.lead_data.clone().unwrap_or(Value::Null),
                )
                .await
                .map_err(CoreError::from)?
        }
        None => {
            let _ = state
                .central
                .update_event_log(event_log_id, EventLogStatus::Failed, None, None, None, Some("LEAD_NOT_FOUND"))
                .await;
            return Err(CoreError::NotFound("LEAD_NOT_FOUND".to_string()));
        }
    };

    // Step 3: optional calendar meeting; failure is a warning, not a fail.
    let mut meet_link = None;
    let mut meet_warning = None;
    if req.requires_meet {
        let request = build_meeting_request(&req, &lead);
        let result = state.calendar.create_meeting(tenant_code, request).await;
        if result.success {
            meet_link = result.hangout_link;
        } else {
            meet_warning = Some(result.error.unwrap_or_else(|| "calendar provider failed".to_string()));
        }
    }

    // Step 4: count matching rules, move EventLog to processing.
    let rules_matched = i32::try_from(
        store.find_matching_rules(tenant_code, &req.trigger).await.map_err(CoreError::from)?.len(),
    )
    .unwrap_or(i32::MAX);
    state
        .central
        .update_event_log(
            event_log_id,
            EventLogStatus::Processing,
            Some(rules_matched),
            None,
            meet_link.as_deref(),
            None,
        )
        .await
        .map_err(CoreError::from)?;

    // Step 5: non-blocking initial `queued` callback.
    if let Some(callback_url) = &req.callback_url {
        let secret = hmac_secret(state, tenant_code).await?;
        let mut queued_payload = serde_json::json!({
            "eventLogId": event_log_id,
            "status": "queued",
            "trigger": req.trigger,
        });
        if let (Some(meta), Value::Object(map)) = (&req.callback_metadata, &mut queued_payload) {
            map.insert("metadata".to_string(), meta.clone());
        }
        state.callback.dispatch_with_secret(callback_url.clone(), queued_payload, secret, Some(event_log_id));
    }

    // Step 6: build enrichedVariables, then run inline or enqueue.
    let enriched_variables = enriched_variables(&req, meet_link.as_deref());
    let scheduled = req.delay_minutes > 0;
    let jobs_created = if scheduled {
        enqueue_delayed(state, tenant_code, &req, lead.id, enriched_variables, req.delay_minutes).await?;
        1
    } else {
        run_inline(state, tenant_code, &store, &req, lead.id, enriched_variables).await?
    };

    // Step 7: EventLog {status: completed, jobsCreated}.
    state
        .central
        .update_event_log(
            event_log_id,
            EventLogStatus::Completed,
            Some(rules_matched),
            Some(jobs_created),
            meet_link.as_deref(),
            None,
        )
        .await
        .map_err(CoreError::from)?;

    // Step 8: respond.
    Ok(TriggerResponse {
        event_log_id,
        trigger: req.trigger,
        lead_id: lead.id,
        meet_link,
        meet_warning,
        rules_matched,
        scheduled,
    })
}

fn build_meeting_request(req: &TriggerRequest, lead: &crate::automation::Lead) -> MeetingRequest {
    let now = Utc::now();
    let default_start = now + chrono::Duration::hours(1);
    let default_end = default_start + chrono::Duration::minutes(30);

    match &req.meet_config {
        Some(cfg) => MeetingRequest {
            summary: cfg.summary.clone().unwrap_or_else(|| req.trigger.clone()),
            start: cfg.start.clone(),
            end: cfg.end.clone(),
            attendees: cfg.attendees.clone(),
        },
        None => MeetingRequest {
            summary: req.trigger.clone(),
            start: default_start.to_rfc3339(),
            end: default_end.to_rfc3339(),
            attendees: lead.email.clone().into_iter().collect(),
        },
    }
}

fn enriched_variables(req: &TriggerRequest, meet_link: Option<&str>) -> Value {
    let mut vars = match &req.variables {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    vars.insert("meetLink".to_string(), meet_link.map_or(Value::Null, |l| Value::String(l.to_string())));
    vars.insert("phone".to_string(), Value::String(req.phone.clone()));
    vars.insert("email".to_string(), req.email.clone().map_or(Value::Null, Value::String));
    vars.insert("trigger".to_string(), Value::String(req.trigger.clone()));
    if let Value::Object(data) = &req.data {
        for (key, value) in data {
            vars.insert(format!("data.{key}"), value.clone());
        }
    }
    Value::Object(vars)
}

async fn enqueue_delayed(
    state: &TriggerState,
    tenant_code: &str,
    req: &TriggerRequest,
    lead_id: Uuid,
    enriched_variables: Value,
    delay_minutes: i64,
) -> Result<(), CoreError> {
    let payload = JobPayload::AutomationEvent(AutomationEventPayload {
        trigger: req.trigger.clone(),
        lead_id,
        stage_id: None,
        tag_name: None,
        score: None,
        variables: enriched_variables,
    });
    let delay_ms = delay_minutes.saturating_mul(60_000);
    state
        .queue
        .enqueue(&state.queue_name, tenant_code, &payload, EnqueueOptions { delay_ms, ..EnqueueOptions::default() })
        .await
        .map_err(CoreError::from)?;
    Ok(())
}

async fn run_inline(
    state: &TriggerState,
    tenant_code: &str,
    store: &TenantStore,
    req: &TriggerRequest,
    lead_id: Uuid,
    enriched_variables: Value,
) -> Result<i32, CoreError> {
    let secret = hmac_secret(state, tenant_code).await?;
    let outcome = state
        .engine
        .run_automations(
            tenant_code,
            store,
            secret,
            TriggerContext {
                trigger: req.trigger.clone(),
                lead_id,
                stage_id: None,
                tag_name: None,
                score: None,
                variables: enriched_variables,
            },
        )
        .await
        .map_err(CoreError::from)?;
    Ok(outcome.jobs_created)
}

async fn hmac_secret(state: &TriggerState, tenant_code: &str) -> Result<Option<String>, CoreError> {
    let Some(secrets) = state.central.get_secrets(tenant_code).await? else {
        return Ok(None);
    };
    let decrypted = secrets
        .decrypted(&state.crypto_key)
        .map_err(|e| CoreError::Internal(format!("failed to decrypt tenant secrets: {e}")))?;
    Ok(decrypted.hmac_webhook_secret)
}
