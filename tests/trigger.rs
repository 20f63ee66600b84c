//! End-to-end coverage of `POST /workflows/trigger` (spec §8): a request
//! enters through the real axum router, hits a real (in-memory) central
//! store and a real file-backed tenant store, and only the outbound
//! provider clients are mocked.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use automation_core::automation::{AutomationEngine, TenantStore};
use automation_core::callback::CallbackSender;
use automation_core::queue::JobQueue;
use automation_core::tenant::TenantRegistry;
use automation_core::trigger::rate_limit::RateLimiter;
use automation_core::trigger::{self, TriggerState};
use automation_core::{config::TenantConfig, automation::models::*};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use support::{in_memory_central, provision_tenant, test_key, AlwaysSendMessaging, SwitchableCalendar, SwitchableEmail};

const TENANT: &str = "ACME";
const API_KEY: &str = "secret-api-key";

struct Stack {
    state: Arc<TriggerState>,
    store: TenantStore,
    calendar_ok: Arc<std::sync::atomic::AtomicBool>,
    _data_dir: tempfile::TempDir,
}

async fn build_stack() -> Stack {
    let data_dir = tempfile::tempdir().unwrap();
    let key = test_key();
    let central = in_memory_central().await;
    provision_tenant(&central, &key, TENANT, API_KEY).await;

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
    let handle = registry.resolve(TENANT).await.unwrap();
    let store = TenantStore::new(handle.pool.clone());

    let queue = JobQueue::new(central.clone());
    let callback = Arc::new(CallbackSender::new(central.clone()));
    let calendar = Arc::new(SwitchableCalendar::new(true));
    let calendar_ok = Arc::clone(&calendar.succeed);
    let email = Arc::new(SwitchableEmail::new(true));
    let messaging = Arc::new(AlwaysSendMessaging);

    let engine = Arc::new(AutomationEngine::new(
        queue.clone(),
        "crm",
        Arc::clone(&callback),
        messaging.clone(),
        email.clone(),
        calendar.clone(),
    ));

    let state = Arc::new(TriggerState {
        central,
        registry,
        queue,
        queue_name: "crm".to_string(),
        engine,
        callback,
        calendar,
        crypto_key: key,
        rate_limiter: RateLimiter::new(60),
    });

    Stack { state, store, calendar_ok, _data_dir: data_dir }
}

async fn insert_named_rule(store: &TenantStore, trigger_name: &str, actions: Vec<RuleAction>) {
    store
        .insert_rule(&AutomationRule {
            id: Uuid::new_v4(),
            tenant_code: TENANT.to_string(),
            trigger: TriggerKind::Named(trigger_name.to_string()),
            trigger_config: TriggerConfig::default(),
            condition: None,
            actions,
            is_active: true,
            execution_count: 0,
            last_executed_at: None,
        })
        .await
        .unwrap();
}

fn request(api_key: &str, client_code: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/workflows/trigger")
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .header("x-client-code", client_code)
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn immediate_rule_match_no_meet_required() {
    let stack = build_stack().await;
    insert_named_rule(
        &stack.store,
        "lead.created",
        vec![RuleAction { action_type: ActionType::AddTag, delay_minutes: 0, config: json!({"tag": "new"}) }],
    )
    .await;

    let app = trigger::router(Arc::clone(&stack.state));
    let body = json!({
        "trigger": "lead.created",
        "phone": "+15550001",
        "requiresMeet": false,
        "delayMinutes": 0,
        "createLeadIfMissing": true,
    });
    let response = app.oneshot(request(API_KEY, TENANT, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let resp = body_json(response).await;
    assert_eq!(resp["scheduled"], json!(false));
    assert_eq!(resp["rulesMatched"], json!(1));
    assert!(resp["meetLink"].is_null());

    let lead_id = Uuid::parse_str(resp["leadId"].as_str().unwrap()).unwrap();
    let lead = stack.store.get_lead(TENANT, lead_id).await.unwrap();
    assert!(lead.tags.contains(&"new".to_string()));
}

#[tokio::test]
async fn delayed_event_enqueues_rather_than_running_inline() {
    let stack = build_stack().await;
    insert_named_rule(
        &stack.store,
        "lead.created",
        vec![RuleAction { action_type: ActionType::AddTag, delay_minutes: 0, config: json!({"tag": "new"}) }],
    )
    .await;

    let app = trigger::router(Arc::clone(&stack.state));
    let body = json!({
        "trigger": "lead.created",
        "phone": "+15550002",
        "delayMinutes": 5,
        "createLeadIfMissing": true,
    });
    let response = app.oneshot(request(API_KEY, TENANT, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let resp = body_json(response).await;
    assert_eq!(resp["scheduled"], json!(true));

    let job = stack.state.central.claim_next_job("crm").await.unwrap();
    assert!(job.is_none(), "job is delayed 5 minutes, must not be claimable yet");
}

#[tokio::test]
async fn meet_required_but_calendar_fails_is_a_non_fatal_warning() {
    let stack = build_stack().await;
    stack.calendar_ok.store(false, Ordering::SeqCst);

    let app = trigger::router(Arc::clone(&stack.state));
    let body = json!({
        "trigger": "lead.created",
        "phone": "+15550003",
        "requiresMeet": true,
        "createLeadIfMissing": true,
    });
    let response = app.oneshot(request(API_KEY, TENANT, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let resp = body_json(response).await;
    assert!(resp["meetLink"].is_null());
    assert_eq!(resp["meetWarning"], json!("quota"));

    let logs = stack.state.central.list_event_logs(TENANT, 10).await.unwrap();
    let log = logs.into_iter().find(|l| l.phone.as_deref() == Some("+15550003")).unwrap();
    assert_eq!(log.status.as_str(), "completed");
}

#[tokio::test]
async fn lead_missing_without_create_flag_is_not_found() {
    let stack = build_stack().await;

    let app = trigger::router(Arc::clone(&stack.state));
    let body = json!({
        "trigger": "lead.created",
        "phone": "+15559999",
        "createLeadIfMissing": false,
    });
    let response = app.oneshot(request(API_KEY, TENANT, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let resp = body_json(response).await;
    assert_eq!(resp["code"], json!("NOT_FOUND"));

    let logs = stack.state.central.list_event_logs(TENANT, 10).await.unwrap();
    let log = logs.into_iter().find(|l| l.phone.as_deref() == Some("+15559999")).unwrap();
    assert_eq!(log.status.as_str(), "failed");
    assert_eq!(log.error.as_deref(), Some("LEAD_NOT_FOUND"));
}

#[tokio::test]
async fn wrong_api_key_is_unauthorized() {
    let stack = build_stack().await;
    let app = trigger::router(Arc::clone(&stack.state));
    let body = json!({"trigger": "lead.created", "phone": "+15550001", "createLeadIfMissing": true});
    let response = app.oneshot(request("wrong-key", TENANT, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_isolation_same_phone_resolves_to_distinct_leads() {
    let data_dir = tempfile::tempdir().unwrap();
    let key = test_key();
    let central = in_memory_central().await;
    provision_tenant(&central, &key, "ACME", "acme-key").await;
    provision_tenant(&central, &key, "GLOBEX", "globex-key").await;

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
    let queue = JobQueue::new(central.clone());
    let callback = Arc::new(CallbackSender::new(central.clone()));
    let calendar = Arc::new(SwitchableCalendar::new(true));
    let email = Arc::new(SwitchableEmail::new(true));
    let messaging = Arc::new(AlwaysSendMessaging);
    let engine = Arc::new(AutomationEngine::new(queue.clone(), "crm", Arc::clone(&callback), messaging, email, calendar.clone()));
    let state = Arc::new(TriggerState {
        central: central.clone(),
        registry,
        queue,
        queue_name: "crm".to_string(),
        engine,
        callback,
        calendar,
        crypto_key: key,
        rate_limiter: RateLimiter::new(60),
    });

    let phone = "+15551234";
    let body = json!({"trigger": "lead.created", "phone": phone, "createLeadIfMissing": true});

    let app_a = trigger::router(Arc::clone(&state));
    let resp_a = app_a.oneshot(request("acme-key", "ACME", body.clone())).await.unwrap();
    assert_eq!(resp_a.status(), StatusCode::OK);
    let lead_a = body_json(resp_a).await["leadId"].as_str().unwrap().to_string();

    let app_b = trigger::router(Arc::clone(&state));
    let resp_b = app_b.oneshot(request("globex-key", "GLOBEX", body)).await.unwrap();
    assert_eq!(resp_b.status(), StatusCode::OK);
    let lead_b = body_json(resp_b).await["leadId"].as_str().unwrap().to_string();

    assert_ne!(lead_a, lead_b, "each tenant must get its own lead for the same phone number");

    let acme_handle = state.registry.resolve("ACME").await.unwrap();
    let acme_store = TenantStore::new(acme_handle.pool.clone());
    assert!(acme_store.find_lead_by_phone("GLOBEX", phone).await.unwrap().is_none());
}
