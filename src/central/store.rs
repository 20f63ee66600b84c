//! The central store (§4.B): one shared connection, one collection per
//! entity. Secrets reads go through [`crate::crypto`] transparently via
//! [`super::models::TenantSecrets::decrypted`]. No core-level write locks —
//! SQLite's row-level atomicity is enough, matching the spec's
//! "document-level atomicity suffices".

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::models::{
    CallbackLog, EventLog, EventLogStatus, Job, JobStatus, Tenant, TenantConnectionSource,
    TenantSecrets,
};
use crate::error::CoreError;

/// Handle to the central store's single shared connection pool.
#[derive(Clone)]
pub struct CentralStore {
    pool: SqlitePool,
}

impl CentralStore {
    /// Connect and ensure schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] if the connection or schema creation fails.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Build a store directly from an already-open pool (tests).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it doesn't already exist. `from_pool` callers
    /// (fixtures wiring a bare in-memory pool) must call this before the
    /// first write; `connect` already runs it internally.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] if schema creation fails.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        self.init_schema().await
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clients (
                tenant_code TEXT PRIMARY KEY,
                api_key TEXT NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clientdatasources (
                tenant_code TEXT PRIMARY KEY,
                connection_string_encrypted TEXT NOT NULL,
                active INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS clientsecrets (
                tenant_code TEXT PRIMARY KEY,
                messaging_api_token TEXT,
                messaging_phone_id TEXT,
                messaging_webhook_token TEXT,
                calendar_client_id TEXT,
                calendar_client_secret TEXT,
                calendar_refresh_token TEXT,
                smtp_host TEXT,
                smtp_user TEXT,
                smtp_password TEXT,
                hmac_webhook_secret TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                queue_name TEXT NOT NULL,
                data TEXT NOT NULL,
                priority INTEGER NOT NULL,
                run_at TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                max_attempts INTEGER NOT NULL,
                last_error TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                failed_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_jobs_claimable
             ON jobs (queue_name, status, priority, run_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS eventlogs (
                id TEXT PRIMARY KEY,
                tenant_code TEXT NOT NULL,
                trigger TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                rules_matched INTEGER NOT NULL,
                jobs_created INTEGER NOT NULL,
                meet_link TEXT,
                callback_url TEXT,
                callback_status TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS callbacklogs (
                id TEXT PRIMARY KEY,
                event_log_id TEXT,
                callback_url TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                http_status INTEGER,
                response_snippet TEXT,
                signature_header TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- Tenant --------------------------------------------------------

    /// Look up a tenant by code.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure; `Ok(None)` if absent.
    pub async fn get_tenant(&self, tenant_code: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query("SELECT tenant_code, api_key, status FROM clients WHERE tenant_code = ?1")
            .bind(tenant_code)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| {
                Ok(Tenant {
                    tenant_code: row.try_get("tenant_code")?,
                    api_key: row.try_get("api_key")?,
                    status: row.try_get("status")?,
                })
            })
            .transpose()
    }

    /// Insert or replace a tenant record.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO clients (tenant_code, api_key, status) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_code) DO UPDATE SET api_key = ?2, status = ?3",
        )
        .bind(&tenant.tenant_code)
        .bind(&tenant.api_key)
        .bind(&tenant.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- TenantConnectionSource -----------------------------------------

    /// Look up the encrypted connection string for a tenant (§4.C).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotProvisioned`] if the tenant has no active
    /// connection source, or a wrapped [`sqlx::Error`] on connection
    /// failure.
    pub async fn get_connection_source(
        &self,
        tenant_code: &str,
    ) -> Result<TenantConnectionSource, CoreError> {
        let row = sqlx::query(
            "SELECT tenant_code, connection_string_encrypted, active
             FROM clientdatasources WHERE tenant_code = ?1 AND active = 1",
        )
        .bind(tenant_code)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| {
            CoreError::NotProvisioned(format!("tenant '{tenant_code}' has no active connection source"))
        })?;

        Ok(TenantConnectionSource {
            tenant_code: row.try_get("tenant_code")?,
            connection_string_encrypted: row.try_get("connection_string_encrypted")?,
            active: row.try_get::<i64, _>("active")? != 0,
        })
    }

    /// Insert or replace a tenant's connection source.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn upsert_connection_source(
        &self,
        source: &TenantConnectionSource,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO clientdatasources (tenant_code, connection_string_encrypted, active)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_code) DO UPDATE SET connection_string_encrypted = ?2, active = ?3",
        )
        .bind(&source.tenant_code)
        .bind(&source.connection_string_encrypted)
        .bind(i64::from(source.active))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- TenantSecrets ---------------------------------------------------

    /// Look up a tenant's encrypted secrets bundle.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_secrets(
        &self,
        tenant_code: &str,
    ) -> Result<Option<TenantSecrets>, sqlx::Error> {
        sqlx::query(
            "SELECT tenant_code, messaging_api_token, messaging_phone_id,
                    messaging_webhook_token, calendar_client_id, calendar_client_secret,
                    calendar_refresh_token, smtp_host, smtp_user, smtp_password,
                    hmac_webhook_secret
             FROM clientsecrets WHERE tenant_code = ?1",
        )
        .bind(tenant_code)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| {
            Ok(TenantSecrets {
                tenant_code: row.try_get("tenant_code")?,
                messaging_api_token: row.try_get("messaging_api_token")?,
                messaging_phone_id: row.try_get("messaging_phone_id")?,
                messaging_webhook_token: row.try_get("messaging_webhook_token")?,
                calendar_client_id: row.try_get("calendar_client_id")?,
                calendar_client_secret: row.try_get("calendar_client_secret")?,
                calendar_refresh_token: row.try_get("calendar_refresh_token")?,
                smtp_host: row.try_get("smtp_host")?,
                smtp_user: row.try_get("smtp_user")?,
                smtp_password: row.try_get("smtp_password")?,
                hmac_webhook_secret: row.try_get("hmac_webhook_secret")?,
            })
        })
        .transpose()
    }

    /// Insert or replace a tenant's secrets bundle (already encrypted).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn upsert_secrets(&self, secrets: &TenantSecrets) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO clientsecrets (tenant_code, messaging_api_token, messaging_phone_id,
                messaging_webhook_token, calendar_client_id, calendar_client_secret,
                calendar_refresh_token, smtp_host, smtp_user, smtp_password, hmac_webhook_secret)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(tenant_code) DO UPDATE SET
                messaging_api_token = ?2, messaging_phone_id = ?3, messaging_webhook_token = ?4,
                calendar_client_id = ?5, calendar_client_secret = ?6, calendar_refresh_token = ?7,
                smtp_host = ?8, smtp_user = ?9, smtp_password = ?10, hmac_webhook_secret = ?11",
        )
        .bind(&secrets.tenant_code)
        .bind(&secrets.messaging_api_token)
        .bind(&secrets.messaging_phone_id)
        .bind(&secrets.messaging_webhook_token)
        .bind(&secrets.calendar_client_id)
        .bind(&secrets.calendar_client_secret)
        .bind(&secrets.calendar_refresh_token)
        .bind(&secrets.smtp_host)
        .bind(&secrets.smtp_user)
        .bind(&secrets.smtp_password)
        .bind(&secrets.hmac_webhook_secret)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Jobs -------------------------------------------------------------

    /// Insert a new waiting job (§4.D).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn insert_job(&self, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO jobs (id, queue_name, data, priority, run_at, status, attempts,
                max_attempts, last_error, created_at, completed_at, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(job.id.to_string())
        .bind(&job.queue_name)
        .bind(job.data.to_string())
        .bind(job.priority)
        .bind(job.run_at.to_rfc3339())
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(&job.last_error)
        .bind(job.created_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(job.failed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically claim one waiting, due job from `queue_name`, lowest
    /// `(priority, run_at)` first (§4.F claim protocol). The
    /// `waiting -> active` transition is the sole coordination primitive
    /// between the worker's concurrent in-flight slots.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn claim_next_job(&self, queue_name: &str) -> Result<Option<Job>, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id FROM jobs
             WHERE queue_name = ?1 AND status = 'waiting' AND run_at <= ?2
             ORDER BY priority ASC, run_at ASC
             LIMIT 1",
        )
        .bind(queue_name)
        .bind(&now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let id: String = row.try_get("id")?;

        let updated = sqlx::query(
            "UPDATE jobs SET status = 'active' WHERE id = ?1 AND status = 'waiting'",
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // Lost the race to another in-flight claim; nothing claimed.
            tx.commit().await?;
            return Ok(None);
        }

        let claimed = self.fetch_job_tx(&mut tx, &id).await?;
        tx.commit().await?;
        Ok(claimed)
    }

    async fn fetch_job_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query(
            "SELECT id, queue_name, data, priority, run_at, status, attempts, max_attempts,
                    last_error, created_at, completed_at, failed_at
             FROM jobs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .map(Self::row_to_job)
        .transpose()
    }

    /// Fetch a job by id, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query(
            "SELECT id, queue_name, data, priority, run_at, status, attempts, max_attempts,
                    last_error, created_at, completed_at, failed_at
             FROM jobs WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_job)
        .transpose()
    }

    fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, sqlx::Error> {
        let data_str: String = row.try_get("data")?;
        let data: Value = serde_json::from_str(&data_str).unwrap_or(Value::Null);
        let status_str: String = row.try_get("status")?;
        let run_at: String = row.try_get("run_at")?;
        let created_at: String = row.try_get("created_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;
        let failed_at: Option<String> = row.try_get("failed_at")?;
        let id_str: String = row.try_get("id")?;

        Ok(Job {
            id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
            queue_name: row.try_get("queue_name")?,
            data,
            priority: row.try_get("priority")?,
            run_at: parse_rfc3339(&run_at),
            status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Waiting),
            attempts: u32::try_from(row.try_get::<i64, _>("attempts")?).unwrap_or(0),
            max_attempts: u32::try_from(row.try_get::<i64, _>("max_attempts")?).unwrap_or(0),
            last_error: row.try_get("last_error")?,
            created_at: parse_rfc3339(&created_at),
            completed_at: completed_at.as_deref().map(parse_rfc3339),
            failed_at: failed_at.as_deref().map(parse_rfc3339),
        })
    }

    /// Mark a job completed (§4.F).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn complete_job(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = ?2 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt: retry with backoff, or fail permanently if
    /// `attempts` has reached `max_attempts` (§4.F).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn retry_or_fail_job(
        &self,
        id: Uuid,
        attempts: u32,
        max_attempts: u32,
        error_message: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        if attempts >= max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', failed_at = ?2, attempts = ?3, last_error = ?4
                 WHERE id = ?1",
            )
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(attempts)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
        } else {
            let run_at = next_run_at.unwrap_or_else(Utc::now).to_rfc3339();
            sqlx::query(
                "UPDATE jobs SET status = 'waiting', attempts = ?2, last_error = ?3, run_at = ?4
                 WHERE id = ?1",
            )
            .bind(id.to_string())
            .bind(attempts)
            .bind(error_message)
            .bind(run_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ---- EventLog -----------------------------------------------------

    /// Insert a new event log row.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn insert_event_log(&self, log: &EventLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO eventlogs (id, tenant_code, trigger, phone, email, status, payload,
                rules_matched, jobs_created, meet_link, callback_url, callback_status, error,
                created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(log.id.to_string())
        .bind(&log.tenant_code)
        .bind(&log.trigger)
        .bind(&log.phone)
        .bind(&log.email)
        .bind(log.status.as_str())
        .bind(log.payload.to_string())
        .bind(log.rules_matched)
        .bind(log.jobs_created)
        .bind(&log.meet_link)
        .bind(&log.callback_url)
        .bind(&log.callback_status)
        .bind(&log.error)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update mutable event log fields.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_event_log(
        &self,
        id: Uuid,
        status: EventLogStatus,
        rules_matched: Option<i32>,
        jobs_created: Option<i32>,
        meet_link: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE eventlogs SET
                status = ?2,
                rules_matched = COALESCE(?3, rules_matched),
                jobs_created = COALESCE(?4, jobs_created),
                meet_link = COALESCE(?5, meet_link),
                error = COALESCE(?6, error)
             WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(rules_matched)
        .bind(jobs_created)
        .bind(meet_link)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read event logs for a tenant, most recent first (`GET /events/logs`).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn list_event_logs(
        &self,
        tenant_code: &str,
        limit: i64,
    ) -> Result<Vec<EventLog>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, tenant_code, trigger, phone, email, status, payload, rules_matched,
                    jobs_created, meet_link, callback_url, callback_status, error, created_at
             FROM eventlogs WHERE tenant_code = ?1 ORDER BY created_at DESC LIMIT ?2",
        )
        .bind(tenant_code)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event_log).collect()
    }

    fn row_to_event_log(row: sqlx::sqlite::SqliteRow) -> Result<EventLog, sqlx::Error> {
        let payload_str: String = row.try_get("payload")?;
        let status_str: String = row.try_get("status")?;
        let id_str: String = row.try_get("id")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(EventLog {
            id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
            tenant_code: row.try_get("tenant_code")?,
            trigger: row.try_get("trigger")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            status: match status_str.as_str() {
                "received" => EventLogStatus::Received,
                "processing" => EventLogStatus::Processing,
                "completed" => EventLogStatus::Completed,
                _ => EventLogStatus::Failed,
            },
            payload: serde_json::from_str(&payload_str).unwrap_or(Value::Null),
            rules_matched: row.try_get("rules_matched")?,
            jobs_created: row.try_get("jobs_created")?,
            meet_link: row.try_get("meet_link")?,
            callback_url: row.try_get("callback_url")?,
            callback_status: row.try_get("callback_status")?,
            error: row.try_get("error")?,
            created_at: parse_rfc3339(&created_at),
        })
    }

    // ---- CallbackLog ------------------------------------------------------

    /// Persist one callback attempt (§4.G).
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn insert_callback_log(&self, log: &CallbackLog) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO callbacklogs (id, event_log_id, callback_url, attempt, http_status,
                response_snippet, signature_header, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(log.id.to_string())
        .bind(log.event_log_id.map(|id| id.to_string()))
        .bind(&log.callback_url)
        .bind(log.attempt)
        .bind(log.http_status.map(i64::from))
        .bind(&log.response_snippet)
        .bind(&log.signature_header)
        .bind(log.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::models::JobStatus;

    async fn test_store() -> CentralStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = CentralStore::from_pool(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn sample_job(priority: i32) -> Job {
        Job {
            id: Uuid::new_v4(),
            queue_name: "crm".to_string(),
            data: serde_json::json!({"tenantCode": "ACME", "type": "crm.automation_event"}),
            priority,
            run_at: Utc::now(),
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: 3,
            last_error: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        }
    }

    #[tokio::test]
    async fn claim_returns_lowest_priority_first() {
        let store = test_store().await;
        let low = sample_job(5);
        let high = sample_job(1);
        store.insert_job(&low).await.unwrap();
        store.insert_job(&high).await.unwrap();

        let claimed = store.claim_next_job("crm").await.unwrap().unwrap();
        assert_eq!(claimed.id, high.id);
        assert_eq!(claimed.status, JobStatus::Active);
    }

    #[tokio::test]
    async fn claim_skips_jobs_not_yet_due() {
        let store = test_store().await;
        let mut future = sample_job(1);
        future.run_at = Utc::now() + chrono::Duration::hours(1);
        store.insert_job(&future).await.unwrap();

        assert!(store.claim_next_job("crm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_sets_backoff_runat_and_waiting() {
        let store = test_store().await;
        let job = sample_job(1);
        store.insert_job(&job).await.unwrap();
        store.claim_next_job("crm").await.unwrap();

        let next_run = Utc::now() + chrono::Duration::seconds(4);
        store
            .retry_or_fail_job(job.id, 1, 3, "boom", Some(next_run))
            .await
            .unwrap();

        let refetched = store.claim_next_job("crm").await.unwrap();
        assert!(refetched.is_none(), "not due yet");
    }

    #[tokio::test]
    async fn exhausted_attempts_marks_failed() {
        let store = test_store().await;
        let job = sample_job(1);
        store.insert_job(&job).await.unwrap();
        store.claim_next_job("crm").await.unwrap();

        store
            .retry_or_fail_job(job.id, 3, 3, "boom", None)
            .await
            .unwrap();

        assert!(store.claim_next_job("crm").await.unwrap().is_none());
    }
}
