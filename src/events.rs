//! `GET /events/logs` (§6): read-only access to a tenant's EventLog trail.
//! Handler shape grounded on `openibank-api::handlers` read endpoints.

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::central::models::EventLog;
use crate::central::CentralStore;
use crate::error::CoreError;
use crate::trigger::{self, TenantCode, TriggerState};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// State needed to serve `GET /events/logs`.
#[derive(Clone)]
pub struct EventsState {
    /// Central store, source of EventLog rows.
    pub central: CentralStore,
}

/// Build the events router, layered with the trigger surface's tenant-auth
/// middleware (§6: "Auth: tenant"). `auth_state` is the same
/// [`TriggerState`] passed to [`trigger::router`], so both surfaces share
/// one tenant/API-key source of truth.
pub fn router(state: Arc<EventsState>, auth_state: Arc<TriggerState>) -> Router {
    Router::new()
        .route("/events/logs", get(list_logs))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(auth_state, trigger::middleware::tenant_auth))
}

#[derive(Debug, Deserialize)]
struct ListLogsQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListLogsResponse {
    logs: Vec<EventLog>,
}

async fn list_logs(
    State(state): State<Arc<EventsState>>,
    Extension(TenantCode(tenant_code)): Extension<TenantCode>,
    Query(query): Query<ListLogsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.central.list_event_logs(&tenant_code, limit).await.map_err(CoreError::from) {
        Ok(logs) => Json(ListLogsResponse { logs }).into_response(),
        Err(err) => err.into_response(),
    }
}
