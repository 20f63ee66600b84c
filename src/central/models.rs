//! Central-store data model (§3): entities owned by the control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crypto::{self, CryptoError, CryptoKey};

/// A tenant of the platform, identified by `tenantCode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique uppercase tenant identifier.
    pub tenant_code: String,
    /// Tenant API key, checked by the auth middleware.
    pub api_key: String,
    /// Tenant lifecycle status (e.g. "active", "suspended").
    pub status: String,
}

/// Source of truth for how to reach a tenant's data store (§4.B, §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConnectionSource {
    /// Tenant this record belongs to.
    pub tenant_code: String,
    /// Encrypted connection string (`hex(iv):hex(ciphertext)`).
    pub connection_string_encrypted: String,
    /// Whether this source is currently usable.
    pub active: bool,
}

impl TenantConnectionSource {
    /// Decrypt the connection string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if the ciphertext is malformed.
    pub fn decrypted_connection_string(&self, key: &CryptoKey) -> Result<String, CryptoError> {
        crypto::decrypt(Some(&self.connection_string_encrypted), key)
            .map(|s| s.unwrap_or_default())
    }
}

/// Per-integration credentials for a tenant, every field encrypted at rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantSecrets {
    /// Tenant this record belongs to.
    pub tenant_code: String,
    /// Messaging (WhatsApp) provider API token, encrypted.
    pub messaging_api_token: Option<String>,
    /// Messaging provider phone identifier, encrypted.
    pub messaging_phone_id: Option<String>,
    /// Messaging provider webhook verification token, encrypted.
    pub messaging_webhook_token: Option<String>,
    /// Calendar OAuth client id, encrypted.
    pub calendar_client_id: Option<String>,
    /// Calendar OAuth client secret, encrypted.
    pub calendar_client_secret: Option<String>,
    /// Calendar OAuth refresh token, encrypted.
    pub calendar_refresh_token: Option<String>,
    /// SMTP host, encrypted.
    pub smtp_host: Option<String>,
    /// SMTP user, encrypted.
    pub smtp_user: Option<String>,
    /// SMTP password, encrypted.
    pub smtp_password: Option<String>,
    /// HMAC webhook signing secret, encrypted.
    pub hmac_webhook_secret: Option<String>,
}

/// Decrypted view of [`TenantSecrets`], produced by
/// [`TenantSecrets::decrypted`]. Every field is `Option` because a tenant
/// may not have configured a given integration.
#[derive(Debug, Clone, Default)]
pub struct DecryptedTenantSecrets {
    /// Messaging (WhatsApp) provider API token.
    pub messaging_api_token: Option<String>,
    /// Messaging provider phone identifier.
    pub messaging_phone_id: Option<String>,
    /// Messaging provider webhook verification token.
    pub messaging_webhook_token: Option<String>,
    /// Calendar OAuth client id.
    pub calendar_client_id: Option<String>,
    /// Calendar OAuth client secret.
    pub calendar_client_secret: Option<String>,
    /// Calendar OAuth refresh token.
    pub calendar_refresh_token: Option<String>,
    /// SMTP host.
    pub smtp_host: Option<String>,
    /// SMTP user.
    pub smtp_user: Option<String>,
    /// SMTP password.
    pub smtp_password: Option<String>,
    /// HMAC webhook signing secret.
    pub hmac_webhook_secret: Option<String>,
}

impl TenantSecrets {
    /// Decrypt every field on read.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if any stored field is malformed ciphertext.
    pub fn decrypted(&self, key: &CryptoKey) -> Result<DecryptedTenantSecrets, CryptoError> {
        Ok(DecryptedTenantSecrets {
            messaging_api_token: crypto::decrypt(self.messaging_api_token.as_deref(), key)?,
            messaging_phone_id: crypto::decrypt(self.messaging_phone_id.as_deref(), key)?,
            messaging_webhook_token: crypto::decrypt(
                self.messaging_webhook_token.as_deref(),
                key,
            )?,
            calendar_client_id: crypto::decrypt(self.calendar_client_id.as_deref(), key)?,
            calendar_client_secret: crypto::decrypt(self.calendar_client_secret.as_deref(), key)?,
            calendar_refresh_token: crypto::decrypt(self.calendar_refresh_token.as_deref(), key)?,
            smtp_host: crypto::decrypt(self.smtp_host.as_deref(), key)?,
            smtp_user: crypto::decrypt(self.smtp_user.as_deref(), key)?,
            smtp_password: crypto::decrypt(self.smtp_password.as_deref(), key)?,
            hmac_webhook_secret: crypto::decrypt(self.hmac_webhook_secret.as_deref(), key)?,
        })
    }
}

/// Job lifecycle status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for `runAt` to elapse and a worker to claim it.
    Waiting,
    /// Claimed by a worker, currently executing.
    Active,
    /// Finished successfully.
    Completed,
    /// Exhausted `maxAttempts`.
    Failed,
}

impl JobStatus {
    /// The string stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse from the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobStatus::Waiting),
            "active" => Some(JobStatus::Active),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A durable unit of deferred work, shared across all tenants (§3, §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job row id.
    pub id: Uuid,
    /// Queue this job belongs to.
    pub queue_name: String,
    /// Opaque job data: `{tenantCode, type, payload}` (§6).
    pub data: Value,
    /// Claim precedence; lower runs first.
    pub priority: i32,
    /// Earliest instant this job may be claimed.
    pub run_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Number of execution attempts so far.
    pub attempts: u32,
    /// Attempts allowed before the job is marked failed.
    pub max_attempts: u32,
    /// Message from the most recent failed attempt, if any.
    pub last_error: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time, if completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure time, if failed.
    pub failed_at: Option<DateTime<Utc>>,
}

/// Per-trigger audit record (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLogStatus {
    /// Persisted on entry, before any side effect.
    Received,
    /// Lead resolved/created, rule count known.
    Processing,
    /// Request handled to completion.
    Completed,
    /// Request failed before completion.
    Failed,
}

impl EventLogStatus {
    /// The string stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            EventLogStatus::Received => "received",
            EventLogStatus::Processing => "processing",
            EventLogStatus::Completed => "completed",
            EventLogStatus::Failed => "failed",
        }
    }
}

/// The per-trigger audit trail record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// Row id, returned to the caller as `eventLogId`.
    pub id: Uuid,
    /// Tenant this event belongs to.
    pub tenant_code: String,
    /// Trigger name fired by the caller.
    pub trigger: String,
    /// Target phone number, if any.
    pub phone: Option<String>,
    /// Target email, if any.
    pub email: Option<String>,
    /// Current lifecycle status.
    pub status: EventLogStatus,
    /// Sanitized copy of the inbound payload.
    pub payload: Value,
    /// Number of automation rules matched.
    pub rules_matched: i32,
    /// Number of jobs created while handling this event.
    pub jobs_created: i32,
    /// Calendar meeting link, if one was created.
    pub meet_link: Option<String>,
    /// Outbound callback URL, if the caller supplied one.
    pub callback_url: Option<String>,
    /// Status of the outbound callback dispatch.
    pub callback_status: Option<String>,
    /// Error message, if the request failed.
    pub error: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// One outbound callback attempt (§4.G, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackLog {
    /// Row id.
    pub id: Uuid,
    /// EventLog this callback is associated with, if any.
    pub event_log_id: Option<Uuid>,
    /// Destination URL.
    pub callback_url: String,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// HTTP status returned, if the request completed.
    pub http_status: Option<u16>,
    /// First 500 bytes of the response body.
    pub response_snippet: Option<String>,
    /// The `x-ecodrix-signature` header value sent with this attempt.
    pub signature_header: String,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}
