//! Tenant-scoped CRUD over the tables in [`crate::tenant::schema`].
//! Grounded on the same raw-`sqlx::query` style as
//! [`crate::central::store::CentralStore`]; every statement filters on
//! `tenant_code` (§3: "a query without it is a bug").

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::models::{
    AutomationRule, Condition, ConditionOperator, EmptyVariablePolicy, Lead, LeadRefs, LeadScore,
    LeadStatus, MessagingTemplate, Pipeline, PipelineStage, RuleAction, TemplateVariable,
    TriggerKind,
};
use crate::error::CoreError;

/// Handle for tenant-scoped automation/CRM reads and writes.
#[derive(Clone)]
pub struct TenantStore {
    pool: SqlitePool,
}

impl TenantStore {
    /// Build a store over an already-connected tenant pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---- Pipelines -------------------------------------------------------

    /// Fetch the tenant's default pipeline, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_default_pipeline(
        &self,
        tenant_code: &str,
    ) -> Result<Option<Pipeline>, sqlx::Error> {
        sqlx::query("SELECT id, tenant_code, name, is_default FROM pipelines WHERE tenant_code = ?1 AND is_default = 1")
            .bind(tenant_code)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_pipeline)
            .transpose()
    }

    fn row_to_pipeline(row: sqlx::sqlite::SqliteRow) -> Result<Pipeline, sqlx::Error> {
        Ok(Pipeline {
            id: parse_uuid(row.try_get("id")?),
            tenant_code: row.try_get("tenant_code")?,
            name: row.try_get("name")?,
            is_default: row.try_get::<i64, _>("is_default")? != 0,
        })
    }

    /// Fetch the default (entry) stage of a pipeline, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_default_stage(
        &self,
        tenant_code: &str,
        pipeline_id: Uuid,
    ) -> Result<Option<PipelineStage>, sqlx::Error> {
        sqlx::query(
            "SELECT id, tenant_code, pipeline_id, name, position, is_default, is_won, is_lost,
                    probability
             FROM pipelinestages
             WHERE tenant_code = ?1 AND pipeline_id = ?2 AND is_default = 1",
        )
        .bind(tenant_code)
        .bind(pipeline_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_stage)
        .transpose()
    }

    /// Fetch one stage by id.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_stage(
        &self,
        tenant_code: &str,
        stage_id: Uuid,
    ) -> Result<Option<PipelineStage>, sqlx::Error> {
        sqlx::query(
            "SELECT id, tenant_code, pipeline_id, name, position, is_default, is_won, is_lost,
                    probability
             FROM pipelinestages WHERE tenant_code = ?1 AND id = ?2",
        )
        .bind(tenant_code)
        .bind(stage_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_stage)
        .transpose()
    }

    fn row_to_stage(row: sqlx::sqlite::SqliteRow) -> Result<PipelineStage, sqlx::Error> {
        Ok(PipelineStage {
            id: parse_uuid(row.try_get("id")?),
            tenant_code: row.try_get("tenant_code")?,
            pipeline_id: parse_uuid(row.try_get("pipeline_id")?),
            name: row.try_get("name")?,
            position: row.try_get("position")?,
            is_default: row.try_get::<i64, _>("is_default")? != 0,
            is_won: row.try_get::<i64, _>("is_won")? != 0,
            is_lost: row.try_get::<i64, _>("is_lost")? != 0,
            probability: row.try_get("probability")?,
        })
    }

    /// Create a default pipeline and default stage for a tenant that has
    /// none (§4.I step 2: "create default pipeline/stage if tenant has
    /// none").
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn ensure_default_pipeline(
        &self,
        tenant_code: &str,
    ) -> Result<(Pipeline, PipelineStage), sqlx::Error> {
        if let Some(pipeline) = self.get_default_pipeline(tenant_code).await? {
            let stage = self
                .get_default_stage(tenant_code, pipeline.id)
                .await?
                .expect("a default pipeline always has a default stage");
            return Ok((pipeline, stage));
        }

        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            tenant_code: tenant_code.to_string(),
            name: "Default Pipeline".to_string(),
            is_default: true,
        };
        sqlx::query(
            "INSERT INTO pipelines (id, tenant_code, name, is_default) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(pipeline.id.to_string())
        .bind(&pipeline.tenant_code)
        .bind(&pipeline.name)
        .bind(i64::from(pipeline.is_default))
        .execute(&self.pool)
        .await?;

        let stage = PipelineStage {
            id: Uuid::new_v4(),
            tenant_code: tenant_code.to_string(),
            pipeline_id: pipeline.id,
            name: "New".to_string(),
            position: 0,
            is_default: true,
            is_won: false,
            is_lost: false,
            probability: 10,
        };
        sqlx::query(
            "INSERT INTO pipelinestages (id, tenant_code, pipeline_id, name, position, is_default,
                is_won, is_lost, probability)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(stage.id.to_string())
        .bind(&stage.tenant_code)
        .bind(stage.pipeline_id.to_string())
        .bind(&stage.name)
        .bind(stage.position)
        .bind(i64::from(stage.is_default))
        .bind(i64::from(stage.is_won))
        .bind(i64::from(stage.is_lost))
        .bind(stage.probability)
        .execute(&self.pool)
        .await?;

        tracing::info!(tenant_code, "created default pipeline and stage");
        Ok((pipeline, stage))
    }

    // ---- Leads ------------------------------------------------------------

    /// Look up a lead by `(tenantCode, phone)` in the tenant's default
    /// pipeline (§4.I step 2: "resolve lead by `(tenantCode, phone)`").
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn find_lead_by_phone(
        &self,
        tenant_code: &str,
        phone: &str,
    ) -> Result<Option<Lead>, sqlx::Error> {
        sqlx::query(
            "SELECT * FROM leads WHERE tenant_code = ?1 AND phone = ?2 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(tenant_code)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_lead)
        .transpose()
    }

    /// Fetch a lead by id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if absent, else a wrapped
    /// [`sqlx::Error`].
    pub async fn get_lead(&self, tenant_code: &str, lead_id: Uuid) -> Result<Lead, CoreError> {
        sqlx::query("SELECT * FROM leads WHERE tenant_code = ?1 AND id = ?2")
            .bind(tenant_code)
            .bind(lead_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_lead)
            .transpose()?
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))
    }

    /// Create a new lead in the given pipeline/stage.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn create_lead(
        &self,
        tenant_code: &str,
        phone: &str,
        email: Option<&str>,
        pipeline_id: Uuid,
        stage_id: Uuid,
        extra_fields: Value,
    ) -> Result<Lead, sqlx::Error> {
        let first_name = extra_fields
            .get("firstName")
            .and_then(Value::as_str)
            .map(str::to_string);
        let last_name = extra_fields
            .get("lastName")
            .and_then(Value::as_str)
            .map(str::to_string);
        let source = extra_fields
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string);

        let lead = Lead {
            id: Uuid::new_v4(),
            tenant_code: tenant_code.to_string(),
            first_name,
            last_name,
            email: email.map(str::to_string),
            phone: phone.to_string(),
            pipeline_id,
            stage_id,
            status: LeadStatus::Open,
            deal_value: None,
            source,
            assigned_to: None,
            tags: Vec::new(),
            metadata_refs: LeadRefs::default(),
            metadata_extra: Value::Object(serde_json::Map::new()),
            score: LeadScore::default(),
            last_contacted_at: None,
            converted_at: None,
            is_archived: false,
            created_at: Utc::now(),
        };
        self.insert_lead(&lead).await?;
        Ok(lead)
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO leads (id, tenant_code, first_name, last_name, email, phone, pipeline_id,
                stage_id, status, deal_value, source, assigned_to, tags, metadata_refs,
                metadata_extra, score_total, score_recency, score_engagement, score_stage_depth,
                score_deal_size, score_source_quality, last_contacted_at, converted_at,
                is_archived, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)",
        )
        .bind(lead.id.to_string())
        .bind(&lead.tenant_code)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(lead.pipeline_id.to_string())
        .bind(lead.stage_id.to_string())
        .bind(lead.status.as_str())
        .bind(lead.deal_value)
        .bind(&lead.source)
        .bind(&lead.assigned_to)
        .bind(serde_json::to_string(&lead.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&lead.metadata_refs).unwrap_or_else(|_| "{}".to_string()))
        .bind(lead.metadata_extra.to_string())
        .bind(lead.score.total)
        .bind(lead.score.recency)
        .bind(lead.score.engagement)
        .bind(lead.score.stage_depth)
        .bind(lead.score.deal_size)
        .bind(lead.score.source_quality)
        .bind(lead.last_contacted_at.map(|t| t.to_rfc3339()))
        .bind(lead.converted_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(lead.is_archived))
        .bind(lead.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a full lead record (used after in-memory mutation by the
    /// automation engine's action handlers).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn save_lead(&self, lead: &Lead) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE leads SET first_name=?2, last_name=?3, email=?4, pipeline_id=?5, stage_id=?6,
                status=?7, deal_value=?8, source=?9, assigned_to=?10, tags=?11, metadata_refs=?12,
                metadata_extra=?13, score_total=?14, score_recency=?15, score_engagement=?16,
                score_stage_depth=?17, score_deal_size=?18, score_source_quality=?19,
                last_contacted_at=?20, converted_at=?21, is_archived=?22
             WHERE id = ?1 AND tenant_code = ?23",
        )
        .bind(lead.id.to_string())
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.email)
        .bind(lead.pipeline_id.to_string())
        .bind(lead.stage_id.to_string())
        .bind(lead.status.as_str())
        .bind(lead.deal_value)
        .bind(&lead.source)
        .bind(&lead.assigned_to)
        .bind(serde_json::to_string(&lead.tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(serde_json::to_string(&lead.metadata_refs).unwrap_or_else(|_| "{}".to_string()))
        .bind(lead.metadata_extra.to_string())
        .bind(lead.score.total)
        .bind(lead.score.recency)
        .bind(lead.score.engagement)
        .bind(lead.score.stage_depth)
        .bind(lead.score.deal_size)
        .bind(lead.score.source_quality)
        .bind(lead.last_contacted_at.map(|t| t.to_rfc3339()))
        .bind(lead.converted_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(lead.is_archived))
        .bind(&lead.tenant_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_lead(row: sqlx::sqlite::SqliteRow) -> Result<Lead, sqlx::Error> {
        let tags_str: String = row.try_get("tags")?;
        let refs_str: String = row.try_get("metadata_refs")?;
        let extra_str: String = row.try_get("metadata_extra")?;
        let status_str: String = row.try_get("status")?;
        let last_contacted: Option<String> = row.try_get("last_contacted_at")?;
        let converted: Option<String> = row.try_get("converted_at")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(Lead {
            id: parse_uuid(row.try_get("id")?),
            tenant_code: row.try_get("tenant_code")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            pipeline_id: parse_uuid(row.try_get("pipeline_id")?),
            stage_id: parse_uuid(row.try_get("stage_id")?),
            status: LeadStatus::parse(&status_str),
            deal_value: row.try_get("deal_value")?,
            source: row.try_get("source")?,
            assigned_to: row.try_get("assigned_to")?,
            tags: serde_json::from_str(&tags_str).unwrap_or_default(),
            metadata_refs: serde_json::from_str(&refs_str).unwrap_or_default(),
            metadata_extra: serde_json::from_str(&extra_str).unwrap_or(Value::Null),
            score: LeadScore {
                total: row.try_get("score_total")?,
                recency: row.try_get("score_recency")?,
                engagement: row.try_get("score_engagement")?,
                stage_depth: row.try_get("score_stage_depth")?,
                deal_size: row.try_get("score_deal_size")?,
                source_quality: row.try_get("score_source_quality")?,
            },
            last_contacted_at: last_contacted.as_deref().map(parse_rfc3339),
            converted_at: converted.as_deref().map(parse_rfc3339),
            is_archived: row.try_get::<i64, _>("is_archived")? != 0,
            created_at: parse_rfc3339(&created_at),
        })
    }

    // ---- Automation rules --------------------------------------------------

    /// Load active rules matching `(tenantCode, trigger)` (§4.H rule
    /// selection).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn find_matching_rules(
        &self,
        tenant_code: &str,
        trigger: &str,
    ) -> Result<Vec<AutomationRule>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM automationrules WHERE tenant_code = ?1 AND trigger = ?2 AND is_active = 1",
        )
        .bind(tenant_code)
        .bind(trigger)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_rule).collect()
    }

    fn row_to_rule(row: sqlx::sqlite::SqliteRow) -> Result<AutomationRule, sqlx::Error> {
        let trigger_config_str: String = row.try_get("trigger_config")?;
        let actions_str: String = row.try_get("actions")?;
        let trigger_str: String = row.try_get("trigger")?;
        let condition_field: Option<String> = row.try_get("condition_field")?;
        let condition_operator: Option<String> = row.try_get("condition_operator")?;
        let condition_value: Option<String> = row.try_get("condition_value")?;
        let last_executed: Option<String> = row.try_get("last_executed_at")?;

        let condition = match (condition_field, condition_operator, condition_value) {
            (Some(field), Some(op), Some(value)) => Some(Condition {
                field,
                operator: parse_operator(&op),
                value: serde_json::from_str(&value).unwrap_or(Value::Null),
            }),
            _ => None,
        };

        Ok(AutomationRule {
            id: parse_uuid(row.try_get("id")?),
            tenant_code: row.try_get("tenant_code")?,
            trigger: TriggerKind::parse(&trigger_str),
            trigger_config: serde_json::from_str(&trigger_config_str).unwrap_or_default(),
            condition,
            actions: serde_json::from_str::<Vec<RuleAction>>(&actions_str).unwrap_or_default(),
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            execution_count: row.try_get("execution_count")?,
            last_executed_at: last_executed.as_deref().map(parse_rfc3339),
        })
    }

    /// Insert a new rule.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn insert_rule(&self, rule: &AutomationRule) -> Result<(), sqlx::Error> {
        let (cf, co, cv) = match &rule.condition {
            Some(c) => (
                Some(c.field.clone()),
                Some(operator_str(c.operator).to_string()),
                Some(c.value.to_string()),
            ),
            None => (None, None, None),
        };
        sqlx::query(
            "INSERT INTO automationrules (id, tenant_code, trigger, trigger_config,
                condition_field, condition_operator, condition_value, actions, is_active,
                execution_count, last_executed_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        )
        .bind(rule.id.to_string())
        .bind(&rule.tenant_code)
        .bind(rule.trigger.as_str())
        .bind(serde_json::to_string(&rule.trigger_config).unwrap_or_else(|_| "{}".to_string()))
        .bind(cf)
        .bind(co)
        .bind(cv)
        .bind(serde_json::to_string(&rule.actions).unwrap_or_else(|_| "[]".to_string()))
        .bind(i64::from(rule.is_active))
        .bind(rule.execution_count)
        .bind(rule.last_executed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record that a rule fired: increment `executionCount`, set
    /// `lastExecutedAt` (§4.H action dispatch).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn record_rule_execution(&self, rule_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE automationrules SET execution_count = execution_count + 1, last_executed_at = ?2
             WHERE id = ?1",
        )
        .bind(rule_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record an activity against a lead (used by `assign_to`, §4.H).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn log_activity(
        &self,
        tenant_code: &str,
        lead_id: Uuid,
        kind: &str,
        detail: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO leadactivities (id, tenant_code, lead_id, kind, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_code)
        .bind(lead_id.to_string())
        .bind(kind)
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Conversations / messages ------------------------------------------

    /// Ensure a conversation exists for `(tenantCode, phone)` and return its
    /// id (§4.H `send_whatsapp`: "ensure a conversation exists").
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn ensure_conversation(
        &self,
        tenant_code: &str,
        phone: &str,
        lead_id: Option<Uuid>,
    ) -> Result<Uuid, sqlx::Error> {
        if let Some(row) = sqlx::query(
            "SELECT id FROM conversations WHERE tenant_code = ?1 AND phone = ?2",
        )
        .bind(tenant_code)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(parse_uuid(row.try_get("id")?));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO conversations (id, tenant_code, phone, lead_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id.to_string())
        .bind(tenant_code)
        .bind(phone)
        .bind(lead_id.map(|id| id.to_string()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Record an outbound message against a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn record_message(
        &self,
        tenant_code: &str,
        conversation_id: Uuid,
        status: &str,
        body: &str,
        provider_message_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO messages (id, tenant_code, conversation_id, direction, status, body,
                provider_message_id, created_at)
             VALUES (?1, ?2, ?3, 'outbound', ?4, ?5, ?6, ?7)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_code)
        .bind(conversation_id.to_string())
        .bind(status)
        .bind(body)
        .bind(provider_message_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl TenantStore {
    // ---- Templates ------------------------------------------------------

    /// Look up a messaging template by vendor-side name.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_template_by_name(
        &self,
        tenant_code: &str,
        name: &str,
    ) -> Result<Option<MessagingTemplate>, sqlx::Error> {
        sqlx::query(
            "SELECT id, tenant_code, name, language, variable_mapping, empty_variable_policy
             FROM templates WHERE tenant_code = ?1 AND name = ?2",
        )
        .bind(tenant_code)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_template)
        .transpose()
    }

    fn row_to_template(row: sqlx::sqlite::SqliteRow) -> Result<MessagingTemplate, sqlx::Error> {
        let mapping_str: String = row.try_get("variable_mapping")?;
        let policy_str: String = row.try_get("empty_variable_policy")?;
        Ok(MessagingTemplate {
            id: parse_uuid(row.try_get("id")?),
            tenant_code: row.try_get("tenant_code")?,
            name: row.try_get("name")?,
            language: row.try_get("language")?,
            variables: serde_json::from_str::<Vec<TemplateVariable>>(&mapping_str).unwrap_or_default(),
            empty_variable_policy: match policy_str.as_str() {
                "skip_send" => EmptyVariablePolicy::SkipSend,
                "use_fallback" => EmptyVariablePolicy::UseFallback,
                _ => EmptyVariablePolicy::SendAnyway,
            },
        })
    }

    // ---- Broadcasts -------------------------------------------------------

    /// Update a broadcast row's status (`crm.whatsapp_broadcast` fan-out
    /// result). A no-op if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn set_broadcast_status(
        &self,
        tenant_code: &str,
        broadcast_id: Uuid,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE broadcasts SET status = ?3 WHERE id = ?1 AND tenant_code = ?2")
            .bind(broadcast_id.to_string())
            .bind(tenant_code)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert or replace a messaging template.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn upsert_template(&self, template: &MessagingTemplate) -> Result<(), sqlx::Error> {
        let policy = match template.empty_variable_policy {
            EmptyVariablePolicy::SkipSend => "skip_send",
            EmptyVariablePolicy::UseFallback => "use_fallback",
            EmptyVariablePolicy::SendAnyway => "send_anyway",
        };
        sqlx::query(
            "INSERT INTO templates (id, tenant_code, name, language, variable_mapping, empty_variable_policy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET name=?3, language=?4, variable_mapping=?5, empty_variable_policy=?6",
        )
        .bind(template.id.to_string())
        .bind(&template.tenant_code)
        .bind(&template.name)
        .bind(&template.language)
        .bind(serde_json::to_string(&template.variables).unwrap_or_else(|_| "[]".to_string()))
        .bind(policy)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_operator(s: &str) -> ConditionOperator {
    match s {
        "neq" => ConditionOperator::Neq,
        "gt" => ConditionOperator::Gt,
        "gte" => ConditionOperator::Gte,
        "lt" => ConditionOperator::Lt,
        "lte" => ConditionOperator::Lte,
        "in" => ConditionOperator::In,
        "contains" => ConditionOperator::Contains,
        _ => ConditionOperator::Eq,
    }
}

fn operator_str(op: ConditionOperator) -> &'static str {
    match op {
        ConditionOperator::Eq => "eq",
        ConditionOperator::Neq => "neq",
        ConditionOperator::Gt => "gt",
        ConditionOperator::Gte => "gte",
        ConditionOperator::Lt => "lt",
        ConditionOperator::Lte => "lte",
        ConditionOperator::In => "in",
        ConditionOperator::Contains => "contains",
    }
}
