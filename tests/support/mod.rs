//! Shared fixtures for the integration tests: an in-memory central store, a
//! tenant provisioned against a real tenant-data-dir (the registry always
//! opens a file, never `:memory:`), and trait-object mock providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use automation_core::central::{CentralStore, Tenant, TenantConnectionSource, TenantSecrets};
use automation_core::crypto::{self, CryptoKey};
use automation_core::providers::{
    CalendarProvider, EmailMessage, EmailProvider, EmailResult, MeetingRequest, MeetingResult,
    MessagingProvider, SendResult,
};
use sqlx::sqlite::SqlitePoolOptions;

pub const TEST_KEY_SECRET: &str = "0123456789abcdef0123456789abcdef-test-key";

pub fn test_key() -> CryptoKey {
    CryptoKey::from_secret(TEST_KEY_SECRET).unwrap()
}

/// Build an in-memory central store and provision `tenant_code` with an
/// active API key and a connection source pointing at `data_dir`.
pub async fn provision_tenant(central: &CentralStore, key: &CryptoKey, tenant_code: &str, api_key: &str) {
    central
        .upsert_tenant(&Tenant {
            tenant_code: tenant_code.to_string(),
            api_key: api_key.to_string(),
            status: "active".to_string(),
        })
        .await
        .unwrap();

    let encrypted = crypto::encrypt(Some("unused"), key).unwrap().unwrap();
    central
        .upsert_connection_source(&TenantConnectionSource {
            tenant_code: tenant_code.to_string(),
            connection_string_encrypted: encrypted,
            active: true,
        })
        .await
        .unwrap();

    central
        .upsert_secrets(&TenantSecrets { tenant_code: tenant_code.to_string(), ..TenantSecrets::default() })
        .await
        .unwrap();
}

pub async fn in_memory_central() -> CentralStore {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    CentralStore::from_pool(pool)
}

/// Calendar provider whose outcome is flipped at runtime via `succeed`.
pub struct SwitchableCalendar {
    pub succeed: Arc<AtomicBool>,
}

impl SwitchableCalendar {
    pub fn new(succeed: bool) -> Self {
        Self { succeed: Arc::new(AtomicBool::new(succeed)) }
    }
}

#[async_trait]
impl CalendarProvider for SwitchableCalendar {
    async fn create_meeting(&self, _tenant_code: &str, _request: MeetingRequest) -> MeetingResult {
        if self.succeed.load(Ordering::SeqCst) {
            MeetingResult {
                success: true,
                hangout_link: Some("https://meet.example/abc".to_string()),
                event_id: Some("evt-1".to_string()),
                error: None,
            }
        } else {
            MeetingResult { success: false, hangout_link: None, event_id: None, error: Some("quota".to_string()) }
        }
    }
}

/// Messaging provider that always accepts the send.
pub struct AlwaysSendMessaging;

#[async_trait]
impl MessagingProvider for AlwaysSendMessaging {
    async fn send_templated(
        &self,
        _tenant_code: &str,
        _to: &str,
        _template_name: &str,
        _language: &str,
        _variables: &[String],
    ) -> SendResult {
        SendResult { success: true, provider_message_id: Some("wamid-1".to_string()), error: None }
    }
}

/// Email provider whose outcome is flipped at runtime via `succeed`. Used by
/// the worker retry tests to force deterministic `crm.email` job failures.
pub struct SwitchableEmail {
    pub succeed: Arc<AtomicBool>,
}

impl SwitchableEmail {
    pub fn new(succeed: bool) -> Self {
        Self { succeed: Arc::new(AtomicBool::new(succeed)) }
    }
}

#[async_trait]
impl EmailProvider for SwitchableEmail {
    async fn send_email(&self, _tenant_code: &str, _message: EmailMessage) -> EmailResult {
        if self.succeed.load(Ordering::SeqCst) {
            EmailResult { success: true, message_id: Some("msg-1".to_string()), error: None }
        } else {
            EmailResult { success: false, message_id: None, error: Some("mailbox full".to_string()) }
        }
    }
}
