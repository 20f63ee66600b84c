//! Tenant auth and rate-limit middleware for the trigger surface (§4.I,
//! §6: "Reads `x-api-key` and `x-client-code`, verifies against central
//! store, attaches `tenantCode` to the request. Missing/invalid → 401.").
//! Response-building shape grounded on `openibank-api::middleware`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{TenantCode, TriggerState};
use crate::error::ErrorBody;

/// Verify `x-api-key`/`x-client-code` against the central store and attach
/// the resolved `tenantCode` to the request's extensions.
pub async fn tenant_auth(
    State(state): State<Arc<TriggerState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let api_key = header_str(&req, "x-api-key");
    let client_code = header_str(&req, "x-client-code");

    let (Some(api_key), Some(client_code)) = (api_key, client_code) else {
        return Err(unauthorized("missing x-api-key or x-client-code"));
    };

    let tenant = state
        .central
        .get_tenant(&client_code)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "tenant lookup failed during auth");
            internal_error()
        })?;

    let Some(tenant) = tenant else {
        return Err(unauthorized("unknown client code"));
    };

    if tenant.api_key != api_key || tenant.status != "active" {
        return Err(unauthorized("invalid api key or inactive tenant"));
    }

    req.extensions_mut().insert(TenantCode(tenant.tenant_code));
    Ok(next.run(req).await)
}

/// Enforce the per-tenant sliding-window limit (§4.I: 60 req/min/tenant).
/// Runs after [`tenant_auth`], which must have already attached
/// [`TenantCode`] to the request.
pub async fn rate_limit(
    State(state): State<Arc<TriggerState>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(TenantCode(tenant_code)) = req.extensions().get::<TenantCode>().cloned() else {
        return Err(internal_error());
    };

    if let Err(retry_after) = state.rate_limiter.check(&tenant_code).await {
        return Err(too_many_requests(retry_after.as_secs()));
    }

    Ok(next.run(req).await)
}

fn header_str(req: &Request, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn unauthorized(message: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error")
}

fn too_many_requests(retry_after_secs: u64) -> Response {
    let mut response = error_response(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "rate limit exceeded");
    if let Ok(value) = retry_after_secs.to_string().parse() {
        response.headers_mut().insert("retry-after", value);
    }
    response
}

fn error_response(status: StatusCode, code: &'static str, message: &str) -> Response {
    let body = ErrorBody { code, message: message.to_string() };
    (status, Json(body)).into_response()
}
