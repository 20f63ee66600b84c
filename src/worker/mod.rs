//! The job worker (§4.F): a polling loop over [`CentralStore::claim_next_job`]
//! with up to `concurrency` jobs in flight, grounded on the teacher's
//! `heartbeat::run_heartbeat` — a `tokio::select!` between a tick interval
//! and a shutdown watch channel, logging at every state transition.

pub mod processor;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::central::{CentralStore, Job};
use crate::config::WorkerConfig;
pub use processor::ProcessorDeps;

/// Drive the claim/execute/retry loop until `shutdown_rx` fires.
///
/// Stopping the worker halts polling only; jobs already claimed run to
/// completion before this function returns (§4.F Cancellation: "no forced
/// cancel").
pub async fn run_worker(
    central: CentralStore,
    deps: Arc<ProcessorDeps>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    tracing::info!(
        queue = %config.queue_name,
        concurrency = config.concurrency,
        poll_interval_ms = config.poll_interval_ms,
        "worker started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                while in_flight.try_join_next().is_some() {}

                while in_flight.len() < config.concurrency {
                    match central.claim_next_job(&config.queue_name).await {
                        Ok(Some(job)) => {
                            let deps = Arc::clone(&deps);
                            let central = central.clone();
                            let base_backoff_ms = config.base_backoff_ms;
                            in_flight.spawn(async move {
                                run_one(&central, &deps, job, base_backoff_ms).await;
                            });
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to claim next job");
                            break;
                        }
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    tracing::info!(in_flight = in_flight.len(), "worker shutting down, draining in-flight jobs");
                    break;
                }
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    tracing::info!("worker stopped");
}

async fn run_one(central: &CentralStore, deps: &ProcessorDeps, job: Job, base_backoff_ms: u64) {
    let job_id = job.id;
    match processor::process(deps, &job).await {
        Ok(()) => {
            if let Err(e) = central.complete_job(job_id).await {
                tracing::error!(job_id = %job_id, error = %e, "failed to mark job completed");
            }
        }
        Err(err) => {
            let attempts = job.attempts.saturating_add(1);
            let backoff_ms = base_backoff_ms.saturating_mul(2u64.saturating_pow(attempts));
            let backoff_millis = i64::try_from(backoff_ms).unwrap_or(i64::MAX);
            let next_run_at = Utc::now() + chrono::Duration::milliseconds(backoff_millis);

            tracing::warn!(job_id = %job_id, attempts, error = %err, "job attempt failed");
            if let Err(e) = central
                .retry_or_fail_job(job_id, attempts, job.max_attempts, &err.to_string(), Some(next_run_at))
                .await
            {
                tracing::error!(job_id = %job_id, error = %e, "failed to record job retry/failure");
            }
        }
    }
}
