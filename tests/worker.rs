//! End-to-end coverage of the worker's claim/execute/retry loop (§4.F,
//! spec §8 "worker retry/backoff"): a real `run_worker` task drains a real
//! job through a failing, then succeeding, provider mock.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use automation_core::automation::AutomationEngine;
use automation_core::callback::CallbackSender;
use automation_core::central::{CentralStore, JobStatus};
use automation_core::config::{TenantConfig, WorkerConfig};
use automation_core::crypto::CryptoKey;
use automation_core::queue::payload::{EmailPayload, JobPayload};
use automation_core::queue::{EnqueueOptions, JobQueue};
use automation_core::tenant::TenantRegistry;
use automation_core::worker::{self, ProcessorDeps};
use tokio::sync::watch;

use support::{in_memory_central, provision_tenant, test_key, AlwaysSendMessaging, SwitchableCalendar, SwitchableEmail};

const TENANT: &str = "ACME";

async fn run_worker_for(central: CentralStore, deps: Arc<ProcessorDeps>, millis: u64) {
    let (tx, rx) = watch::channel(false);
    let config = WorkerConfig {
        queue_name: "crm".to_string(),
        concurrency: 4,
        poll_interval_ms: 20,
        base_backoff_ms: 10,
        default_max_attempts: 3,
    };
    let handle = tokio::spawn(async move {
        worker::run_worker(central, deps, config, rx).await;
    });
    tokio::time::sleep(Duration::from_millis(millis)).await;
    let _ = tx.send(true);
    handle.await.unwrap();
}

async fn build_deps(email_succeeds: Arc<std::sync::atomic::AtomicBool>) -> (CentralStore, Arc<ProcessorDeps>, CryptoKey) {
    let data_dir = tempfile::tempdir().unwrap();
    let key = test_key();
    let central = in_memory_central().await;
    provision_tenant(&central, &key, TENANT, "key").await;

    let registry = Arc::new(TenantRegistry::new(
        central.clone(),
        key.clone(),
        TenantConfig {
            data_dir: data_dir.path().to_string_lossy().to_string(),
            pool_size: 5,
            server_selection_timeout_ms: 5_000,
            socket_timeout_ms: 5_000,
        },
    ));
    // Pre-warm the tenant connection; `data_dir` only needs to outlive this
    // call since the pool keeps the SQLite file open afterward.
    registry.resolve(TENANT).await.unwrap();
    std::mem::forget(data_dir);

    let queue = JobQueue::new(central.clone());
    let callback = Arc::new(CallbackSender::new(central.clone()));
    let calendar = Arc::new(SwitchableCalendar::new(true));
    let email = Arc::new(SwitchableEmail { succeed: email_succeeds });
    let messaging = Arc::new(AlwaysSendMessaging);
    let engine = Arc::new(AutomationEngine::new(queue.clone(), "crm", Arc::clone(&callback), messaging.clone(), email.clone(), calendar.clone()));

    let deps = Arc::new(ProcessorDeps {
        central: central.clone(),
        registry,
        engine,
        callback,
        messaging,
        email,
        calendar,
        crypto_key: key.clone(),
    });
    (central, deps, key)
}

fn email_payload() -> JobPayload {
    JobPayload::Email(EmailPayload {
        lead_id: None,
        to: "lead@example.com".to_string(),
        subject: "hi".to_string(),
        html: "<p>hi</p>".to_string(),
        text: "hi".to_string(),
    })
}

#[tokio::test]
async fn failing_job_exhausts_attempts_and_is_marked_failed() {
    let email_ok = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let (central, deps, _key) = build_deps(Arc::clone(&email_ok)).await;

    let queue = JobQueue::new(central.clone());
    let job = queue
        .enqueue("crm", TENANT, &email_payload(), EnqueueOptions { max_attempts: 2, ..EnqueueOptions::default() })
        .await
        .unwrap();

    // Two attempts at 10ms base backoff (20ms, 40ms) plus poll slack.
    run_worker_for(central.clone(), deps, 400).await;

    let row = central.get_job(job.id).await.unwrap().expect("job still exists");
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.attempts, 2);
}

#[tokio::test]
async fn job_succeeding_after_a_retry_completes() {
    let email_ok = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let (central, deps, _key) = build_deps(Arc::clone(&email_ok)).await;

    let queue = JobQueue::new(central.clone());
    let job = queue
        .enqueue("crm", TENANT, &email_payload(), EnqueueOptions { max_attempts: 5, ..EnqueueOptions::default() })
        .await
        .unwrap();

    // Flip the provider to succeed shortly after the first attempt fails.
    let flip_flag = Arc::clone(&email_ok);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flip_flag.store(true, Ordering::SeqCst);
    });

    run_worker_for(central.clone(), deps, 400).await;

    let row = central.get_job(job.id).await.unwrap().expect("job still exists");
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.attempts, 2);
}
