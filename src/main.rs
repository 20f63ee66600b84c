//! Binary entrypoint: load config, establish the central store, start the
//! job worker and the trigger/events HTTP surface side by side, and drain
//! in-flight work on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use automation_core::automation::AutomationEngine;
use automation_core::callback::CallbackSender;
use automation_core::central::CentralStore;
use automation_core::config::CoreConfig;
use automation_core::crypto::CryptoKey;
use automation_core::events::{self, EventsState};
use automation_core::providers::{HttpCalendarProvider, HttpEmailProvider, HttpMessagingProvider};
use automation_core::queue::JobQueue;
use automation_core::tenant::TenantRegistry;
use automation_core::trigger::rate_limit::RateLimiter;
use automation_core::trigger::{self, TriggerState};
use automation_core::worker::{self, ProcessorDeps};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CoreConfig::load().context("failed to load configuration")?;
    let _logging_guard = automation_core::logging::init_production(std::path::Path::new("./logs"))
        .context("failed to initialize logging")?;

    info!("automation core starting");

    let crypto_key = CryptoKey::from_secret(
        config.crypto.key.as_deref().context("CORE_CRYPTO_KEY / [crypto].key is required")?,
    )
    .context("invalid crypto key")?;

    let central = CentralStore::connect(&config.central_store.database_url)
        .await
        .context("failed to connect to central store")?;
    let registry = Arc::new(TenantRegistry::new(central.clone(), crypto_key.clone(), config.tenant.clone()));
    let queue = JobQueue::new(central.clone());

    let messaging = Arc::new(HttpMessagingProvider::new(config.providers.whatsapp_base_url.clone()));
    let email = Arc::new(HttpEmailProvider::new(config.providers.email_base_url.clone()));
    let calendar = Arc::new(HttpCalendarProvider::new(config.providers.calendar_base_url.clone()));
    let callback = Arc::new(CallbackSender::new(central.clone()));

    let engine = Arc::new(AutomationEngine::new(
        queue.clone(),
        config.worker.queue_name.clone(),
        Arc::clone(&callback),
        messaging.clone(),
        email.clone(),
        calendar.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let processor_deps = Arc::new(ProcessorDeps {
        central: central.clone(),
        registry: Arc::clone(&registry),
        engine: Arc::clone(&engine),
        callback: Arc::clone(&callback),
        messaging,
        email,
        calendar: calendar.clone(),
        crypto_key: crypto_key.clone(),
    });

    let worker_handle = {
        let central = central.clone();
        let worker_config = config.worker.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            worker::run_worker(central, processor_deps, worker_config, shutdown_rx).await;
        })
    };

    let trigger_state = Arc::new(TriggerState {
        central: central.clone(),
        registry: Arc::clone(&registry),
        queue,
        queue_name: config.worker.queue_name.clone(),
        engine,
        callback,
        calendar,
        crypto_key,
        rate_limiter: RateLimiter::new(config.server.rate_limit_per_minute),
    });
    let events_state = Arc::new(EventsState { central });

    let app = trigger::router(Arc::clone(&trigger_state))
        .merge(events::router(events_state, trigger_state))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "trigger/events HTTP surface listening");

    let server_shutdown_rx = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let mut rx = server_shutdown_rx;
        let _ = rx.changed().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    worker_handle.await.context("worker task panicked")?;

    info!("automation core stopped");
    Ok(())
}
