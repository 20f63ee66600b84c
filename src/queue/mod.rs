//! The durable central job queue (§4.D/E): one collection across all
//! tenants and queues, claim/retry/backoff semantics live in
//! [`crate::central::CentralStore`] and [`crate::worker`]. This module is
//! the enqueue-side primitive and the job payload contract.

pub mod payload;

pub use payload::JobPayload;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::central::{CentralStore, Job, JobStatus};

/// Enqueue options; all optional with the defaults from §4.D.
#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    /// Delay before the job becomes claimable, in milliseconds.
    pub delay_ms: i64,
    /// Claim precedence; lower runs first.
    pub priority: i32,
    /// Attempts allowed before the job is marked failed.
    pub max_attempts: u32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            priority: 5,
            max_attempts: 3,
        }
    }
}

/// Enqueue primitive over the job store (§4.D/E).
#[derive(Clone)]
pub struct JobQueue {
    central: CentralStore,
}

impl JobQueue {
    /// Build a queue handle over the given central store.
    pub fn new(central: CentralStore) -> Self {
        Self { central }
    }

    /// `add(queueName, data, opts)`: persist a new waiting job.
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn add(
        &self,
        queue_name: &str,
        data: Value,
        opts: EnqueueOptions,
    ) -> Result<Job, sqlx::Error> {
        let delay_ms = opts.delay_ms.max(0);
        let job = Job {
            id: Uuid::new_v4(),
            queue_name: queue_name.to_string(),
            data,
            priority: opts.priority,
            run_at: Utc::now() + ChronoDuration::milliseconds(delay_ms),
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: opts.max_attempts,
            last_error: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        };
        self.central.insert_job(&job).await?;
        Ok(job)
    }

    /// Convenience wrapper building the `{tenantCode, type, payload}`
    /// envelope (§6) from a typed [`JobPayload`].
    ///
    /// # Errors
    ///
    /// Returns [`sqlx::Error`] on connection failure.
    pub async fn enqueue(
        &self,
        queue_name: &str,
        tenant_code: &str,
        payload: &JobPayload,
        opts: EnqueueOptions,
    ) -> Result<Job, sqlx::Error> {
        let data = serde_json::json!({
            "tenantCode": tenant_code,
            "type": payload.job_type(),
            "payload": payload,
        });
        self.add(queue_name, data, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_central() -> CentralStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let central = CentralStore::from_pool(pool);
        central.ensure_schema().await.unwrap();
        central
    }

    #[tokio::test]
    async fn add_defaults_to_waiting_with_zero_attempts() {
        let central = test_central().await;
        let queue = JobQueue::new(central.clone());

        let job = queue
            .add("crm", serde_json::json!({"tenantCode": "ACME"}), EnqueueOptions::default())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.priority, 5);

        let claimed = central.claim_next_job("crm").await.unwrap();
        assert!(claimed.is_some());
    }

    #[tokio::test]
    async fn delay_ms_pushes_run_at_into_the_future() {
        let central = test_central().await;
        let queue = JobQueue::new(central.clone());

        let job = queue
            .add(
                "crm",
                serde_json::json!({}),
                EnqueueOptions {
                    delay_ms: 5 * 60_000,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let delta = job.run_at - Utc::now();
        assert!(delta.num_seconds() > 295 && delta.num_seconds() <= 300);
        assert!(central.claim_next_job("crm").await.unwrap().is_none());
    }
}
