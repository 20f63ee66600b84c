//! The trigger HTTP surface (§4.I): `POST /workflows/trigger`, the
//! universal entry point into the automation engine. Router/middleware
//! shape grounded on `openibank-api` (`routes.rs`, `middleware.rs`,
//! `state.rs`).

pub mod dto;
pub mod handler;
pub mod middleware;
pub mod rate_limit;
pub mod validation;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;

use crate::automation::AutomationEngine;
use crate::callback::CallbackSender;
use crate::central::CentralStore;
use crate::crypto::CryptoKey;
use crate::providers::CalendarProvider;
use crate::queue::JobQueue;
use crate::tenant::TenantRegistry;
use rate_limit::RateLimiter;

/// Tenant code attached to the request by [`middleware::tenant_auth`],
/// read back by the handler.
#[derive(Debug, Clone)]
pub struct TenantCode(pub String);

/// Shared state for the trigger surface.
pub struct TriggerState {
    /// Central store, for tenant lookup/auth and EventLog persistence.
    pub central: CentralStore,
    /// Tenant connection registry.
    pub registry: Arc<TenantRegistry>,
    /// Job queue, for delayed `crm.automation_event` jobs.
    pub queue: JobQueue,
    /// Name of the worker queue jobs are enqueued onto.
    pub queue_name: String,
    /// The automation engine, for inline rule execution.
    pub engine: Arc<AutomationEngine>,
    /// Outbound callback dispatcher, for the initial `queued` notification.
    pub callback: Arc<CallbackSender>,
    /// Calendar provider, for `requiresMeet`.
    pub calendar: Arc<dyn CalendarProvider>,
    /// Key used to decrypt tenant secrets (e.g. the webhook HMAC secret).
    pub crypto_key: CryptoKey,
    /// Per-tenant rate limiter (§4.I: 60 req/min/tenant).
    pub rate_limiter: RateLimiter,
}

/// Build the trigger router. `Router::layer` wraps outside-in with each
/// call, so the last `.layer()` added runs first on the way in: tenant auth
/// must resolve `tenantCode` before the rate limiter can key on it, so it
/// is layered last.
pub fn router(state: Arc<TriggerState>) -> Router {
    Router::new()
        .route("/workflows/trigger", post(handler::trigger))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::tenant_auth,
        ))
        .with_state(state)
}
