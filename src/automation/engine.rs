//! The automation engine (§4.H): rule match + action execution, fired
//! either inline from the trigger endpoint or re-entered from a delayed
//! queue job. Dispatch shape (resolve tenant state, then act) mirrors the
//! teacher's `providers::router::ModelRouter`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::actions::{self, ActionDeps};
use super::conditions;
use super::models::{ActionType, AutomationRule, Lead, TriggerKind};
use super::store::TenantStore;
use crate::callback::CallbackSender;
use crate::providers::{CalendarProvider, EmailProvider, MessagingProvider};
use crate::queue::{payload::AutomationActionPayload, EnqueueOptions, JobPayload, JobQueue};

/// Inputs to one `runAutomations` entry (§4.H entry points).
#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// Trigger name.
    pub trigger: String,
    /// Lead id this trigger concerns.
    pub lead_id: Uuid,
    /// Stage id, for `stage_enter`/`stage_exit` gating.
    pub stage_id: Option<Uuid>,
    /// Tag name, for `tag_added`/`tag_removed` gating.
    pub tag_name: Option<String>,
    /// Lead score, for `score_above`/`score_below` gating.
    pub score: Option<f64>,
    /// Context variables available to template/condition resolution.
    pub variables: Value,
}

/// Aggregate result of one (possibly re-entrant) `runAutomations` chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOutcome {
    /// Total rules matched across the whole chain.
    pub rules_matched: i32,
    /// Jobs enqueued for deferred actions across the whole chain.
    pub jobs_created: i32,
}

/// The rule-match/action-dispatch engine.
pub struct AutomationEngine {
    queue: JobQueue,
    queue_name: String,
    callback: Arc<CallbackSender>,
    messaging: Arc<dyn MessagingProvider>,
    email: Arc<dyn EmailProvider>,
    calendar: Arc<dyn CalendarProvider>,
}

impl AutomationEngine {
    /// Build an engine over its collaborators (§9: "the worker accepts a
    /// registry... the engine accepts the queue as a dependency").
    ///
    /// `queue_name` must match the worker's configured `[worker] queueName`
    /// (`crate::config::WorkerConfig::queue_name`): deferred actions enqueued
    /// under any other name would sit on a queue the worker never polls.
    pub fn new(
        queue: JobQueue,
        queue_name: impl Into<String>,
        callback: Arc<CallbackSender>,
        messaging: Arc<dyn MessagingProvider>,
        email: Arc<dyn EmailProvider>,
        calendar: Arc<dyn CalendarProvider>,
    ) -> Self {
        Self { queue, queue_name: queue_name.into(), callback, messaging, email, calendar }
    }

    /// `runAutomations(tenantCode, ctx)`: match rules, dispatch actions,
    /// and drain any triggers re-emitted along the way (§4.H) under one
    /// re-entrancy guard.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on tenant-store failure.
    pub async fn run_automations(
        &self,
        tenant_code: &str,
        store: &TenantStore,
        hmac_secret: Option<String>,
        ctx: TriggerContext,
    ) -> Result<RunOutcome, sqlx::Error> {
        let mut guard: HashSet<(Uuid, Uuid)> = HashSet::new();
        let mut work = vec![ctx];
        let mut outcome = RunOutcome::default();

        while let Some(ctx) = work.pop() {
            let mut lead = store.get_lead(tenant_code, ctx.lead_id).await.map_err(|e| match e {
                crate::error::CoreError::NotFound(_) => sqlx::Error::RowNotFound,
                _ => sqlx::Error::Protocol("lead lookup failed".to_string()),
            })?;

            let rules = store.find_matching_rules(tenant_code, &ctx.trigger).await?;
            let matching: Vec<&AutomationRule> =
                rules.iter().filter(|r| gate_matches(r, &ctx, &lead)).collect();
            let matched_count = i32::try_from(matching.len()).unwrap_or(i32::MAX);
            outcome.rules_matched = outcome.rules_matched.saturating_add(matched_count);

            for rule in matching {
                if !guard.insert((rule.id, lead.id)) {
                    continue;
                }

                if let Some(condition) = &rule.condition {
                    if !conditions::evaluate(condition, &lead) {
                        continue;
                    }
                }

                store.record_rule_execution(rule.id).await?;

                for action in &rule.actions {
                    if action.delay_minutes == 0 && actions::is_low_latency(action.action_type) {
                        let deps = ActionDeps {
                            store: store.clone(),
                            callback: Arc::clone(&self.callback),
                            messaging: Arc::clone(&self.messaging),
                            email: Arc::clone(&self.email),
                            calendar: Arc::clone(&self.calendar),
                            hmac_secret: hmac_secret.clone(),
                        };
                        let reentrant = actions::execute_action(
                            action.action_type,
                            &action.config,
                            tenant_code,
                            &mut lead,
                            &ctx.variables,
                            &deps,
                        )
                        .await?;
                        for r in reentrant {
                            work.push(TriggerContext {
                                trigger: r.trigger,
                                lead_id: lead.id,
                                stage_id: r.stage_id,
                                tag_name: r.tag_name,
                                score: None,
                                variables: ctx.variables.clone(),
                            });
                        }
                    } else if action.delay_minutes == 0 {
                        // Low-latency-ineligible action with no delay still
                        // runs inline: no queue hop buys anything when
                        // delayMs would be zero anyway.
                        let deps = ActionDeps {
                            store: store.clone(),
                            callback: Arc::clone(&self.callback),
                            messaging: Arc::clone(&self.messaging),
                            email: Arc::clone(&self.email),
                            calendar: Arc::clone(&self.calendar),
                            hmac_secret: hmac_secret.clone(),
                        };
                        actions::execute_action(
                            action.action_type,
                            &action.config,
                            tenant_code,
                            &mut lead,
                            &ctx.variables,
                            &deps,
                        )
                        .await?;
                    } else {
                        let payload = JobPayload::AutomationAction(AutomationActionPayload {
                            rule_id: rule.id,
                            action_type: action_type_str(action.action_type).to_string(),
                            action_config: action.config.clone(),
                            lead_id: lead.id,
                            ctx_variables: ctx.variables.clone(),
                        });
                        self.queue
                            .enqueue(
                                &self.queue_name,
                                tenant_code,
                                &payload,
                                EnqueueOptions {
                                    delay_ms: action.delay_minutes.saturating_mul(60_000),
                                    ..Default::default()
                                },
                            )
                            .await?;
                        outcome.jobs_created = outcome.jobs_created.saturating_add(1);
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Execute a single deferred action dequeued by the worker
    /// (`crm.automation_action`, §4.H).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on tenant-store failure.
    pub async fn execute_deferred_action(
        &self,
        tenant_code: &str,
        store: &TenantStore,
        hmac_secret: Option<String>,
        payload: AutomationActionPayload,
    ) -> Result<(), sqlx::Error> {
        let mut lead = store.get_lead(tenant_code, payload.lead_id).await.map_err(|e| match e {
            crate::error::CoreError::NotFound(_) => sqlx::Error::RowNotFound,
            _ => sqlx::Error::Protocol("lead lookup failed".to_string()),
        })?;

        let deps = ActionDeps {
            store: store.clone(),
            callback: Arc::clone(&self.callback),
            messaging: Arc::clone(&self.messaging),
            email: Arc::clone(&self.email),
            calendar: Arc::clone(&self.calendar),
            hmac_secret,
        };
        actions::execute_action(
            parse_action_type(&payload.action_type),
            &payload.action_config,
            tenant_code,
            &mut lead,
            &payload.ctx_variables,
            &deps,
        )
        .await?;
        Ok(())
    }
}

fn gate_matches(rule: &AutomationRule, ctx: &TriggerContext, lead: &Lead) -> bool {
    match rule.trigger {
        TriggerKind::StageEnter | TriggerKind::StageExit => {
            rule.trigger_config.stage_id.is_some() && rule.trigger_config.stage_id == ctx.stage_id
        }
        TriggerKind::ScoreAbove => rule
            .trigger_config
            .score_threshold
            .zip(ctx.score)
            .is_some_and(|(threshold, score)| score >= threshold),
        TriggerKind::ScoreBelow => rule
            .trigger_config
            .score_threshold
            .zip(ctx.score)
            .is_some_and(|(threshold, score)| score <= threshold),
        TriggerKind::TagAdded | TriggerKind::TagRemoved => {
            rule.trigger_config.tag_name.is_some() && rule.trigger_config.tag_name == ctx.tag_name
        }
        TriggerKind::NoContact => {
            let Some(inactive_days) = rule.trigger_config.inactive_days else { return false };
            let Some(last_contacted) = lead.last_contacted_at else { return true };
            (chrono::Utc::now() - last_contacted).num_days() >= inactive_days
        }
        TriggerKind::Named(ref name) => name == &ctx.trigger,
    }
}

fn action_type_str(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::SendWhatsapp => "send_whatsapp",
        ActionType::SendEmail => "send_email",
        ActionType::MoveStage => "move_stage",
        ActionType::AssignTo => "assign_to",
        ActionType::AddTag => "add_tag",
        ActionType::RemoveTag => "remove_tag",
        ActionType::WebhookNotify => "webhook_notify",
        ActionType::CreateMeeting => "create_meeting",
    }
}

fn parse_action_type(s: &str) -> ActionType {
    match s {
        "send_email" => ActionType::SendEmail,
        "move_stage" => ActionType::MoveStage,
        "assign_to" => ActionType::AssignTo,
        "add_tag" => ActionType::AddTag,
        "remove_tag" => ActionType::RemoveTag,
        "webhook_notify" => ActionType::WebhookNotify,
        "create_meeting" => ActionType::CreateMeeting,
        _ => ActionType::SendWhatsapp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::models::{
        Condition, ConditionOperator, LeadRefs, LeadScore, LeadStatus, RuleAction, TriggerConfig,
    };
    use crate::central::CentralStore;
    use crate::providers::{EmailResult, MeetingResult, SendResult};
    use async_trait::async_trait;
    use chrono::Utc;

    struct NullMessaging;
    #[async_trait]
    impl MessagingProvider for NullMessaging {
        async fn send_templated(&self, _: &str, _: &str, _: &str, _: &str, _: &[String]) -> SendResult {
            SendResult { success: true, provider_message_id: Some("id-1".to_string()), error: None }
        }
    }

    struct NullEmail;
    #[async_trait]
    impl EmailProvider for NullEmail {
        async fn send_email(&self, _: &str, _: crate::providers::EmailMessage) -> EmailResult {
            EmailResult { success: true, message_id: None, error: None }
        }
    }

    struct NullCalendar;
    #[async_trait]
    impl CalendarProvider for NullCalendar {
        async fn create_meeting(&self, _: &str, _: crate::providers::MeetingRequest) -> MeetingResult {
            MeetingResult { success: true, hangout_link: Some("link".to_string()), event_id: None, error: None }
        }
    }

    async fn test_setup() -> (AutomationEngine, TenantStore, Lead) {
        let central_pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        let central = CentralStore::from_pool(central_pool);
        let queue = JobQueue::new(central.clone());
        let callback = Arc::new(CallbackSender::new(central));

        let tenant_pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::tenant::schema::init(&tenant_pool).await.unwrap();
        let store = TenantStore::new(tenant_pool);
        let (pipeline, stage) = store.ensure_default_pipeline("ACME").await.unwrap();

        let lead = store
            .create_lead("ACME", "919876543210", None, pipeline.id, stage.id, serde_json::json!({}))
            .await
            .unwrap();

        let engine = AutomationEngine::new(
            queue,
            "crm",
            callback,
            Arc::new(NullMessaging),
            Arc::new(NullEmail),
            Arc::new(NullCalendar),
        );
        (engine, store, lead)
    }

    #[tokio::test]
    async fn add_tag_reentrant_trigger_is_guarded_against_loop() {
        let (engine, store, lead) = test_setup().await;

        let rule = AutomationRule {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            trigger: TriggerKind::Named("form_submitted".to_string()),
            trigger_config: TriggerConfig::default(),
            condition: None,
            actions: vec![RuleAction {
                action_type: ActionType::AddTag,
                delay_minutes: 0,
                config: serde_json::json!({"tag": "new"}),
            }],
            is_active: true,
            execution_count: 0,
            last_executed_at: None,
        };
        store.insert_rule(&rule).await.unwrap();

        let tag_rule = AutomationRule {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            trigger: TriggerKind::TagAdded,
            trigger_config: TriggerConfig { tag_name: Some("new".to_string()), ..Default::default() },
            condition: None,
            actions: vec![RuleAction {
                action_type: ActionType::AddTag,
                delay_minutes: 0,
                config: serde_json::json!({"tag": "new"}),
            }],
            is_active: true,
            execution_count: 0,
            last_executed_at: None,
        };
        store.insert_rule(&tag_rule).await.unwrap();

        let outcome = engine
            .run_automations(
                "ACME",
                &store,
                None,
                TriggerContext {
                    trigger: "form_submitted".to_string(),
                    lead_id: lead.id,
                    stage_id: None,
                    tag_name: None,
                    score: None,
                    variables: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.rules_matched, 2);
        let refetched = store.get_lead("ACME", lead.id).await.unwrap();
        assert_eq!(refetched.tags, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn inactive_rule_never_matches() {
        let (engine, store, lead) = test_setup().await;
        let rule = AutomationRule {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            trigger: TriggerKind::Named("form_submitted".to_string()),
            trigger_config: TriggerConfig::default(),
            condition: None,
            actions: vec![],
            is_active: false,
            execution_count: 0,
            last_executed_at: None,
        };
        store.insert_rule(&rule).await.unwrap();

        let outcome = engine
            .run_automations(
                "ACME",
                &store,
                None,
                TriggerContext {
                    trigger: "form_submitted".to_string(),
                    lead_id: lead.id,
                    stage_id: None,
                    tag_name: None,
                    score: None,
                    variables: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.rules_matched, 0);
    }

    #[tokio::test]
    async fn condition_gates_action_dispatch() {
        let (engine, store, lead) = test_setup().await;
        let mut lead = lead;
        lead.source = Some("organic".to_string());
        store.save_lead(&lead).await.unwrap();

        let rule = AutomationRule {
            id: Uuid::new_v4(),
            tenant_code: "ACME".to_string(),
            trigger: TriggerKind::Named("form_submitted".to_string()),
            trigger_config: TriggerConfig::default(),
            condition: Some(Condition {
                field: "source".to_string(),
                operator: ConditionOperator::Eq,
                value: serde_json::json!("ads"),
            }),
            actions: vec![RuleAction {
                action_type: ActionType::AddTag,
                delay_minutes: 0,
                config: serde_json::json!({"tag": "paid"}),
            }],
            is_active: true,
            execution_count: 0,
            last_executed_at: None,
        };
        store.insert_rule(&rule).await.unwrap();

        engine
            .run_automations(
                "ACME",
                &store,
                None,
                TriggerContext {
                    trigger: "form_submitted".to_string(),
                    lead_id: lead.id,
                    stage_id: None,
                    tag_name: None,
                    score: None,
                    variables: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let refetched = store.get_lead("ACME", lead.id).await.unwrap();
        assert!(refetched.tags.is_empty(), "condition mismatch must skip the action");
    }
}
