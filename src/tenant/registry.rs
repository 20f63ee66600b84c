//! Cached, lazily established tenant connections (§4.C).
//!
//! Grounded on the teacher's `providers::router::ModelRouter`: a
//! `Mutex<HashMap<key, handle>>` resolved by key, created on first miss.
//! The addition here is single-flight: two concurrent misses for the same
//! `tenantCode` must collapse onto one connect attempt, so each tenant gets
//! its own inner `tokio::sync::Mutex` slot that later callers block on
//! instead of racing a fresh connect.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::central::CentralStore;
use crate::config::TenantConfig;
use crate::crypto::CryptoKey;
use crate::error::CoreError;
use crate::tenant::schema;

/// A live connection to one tenant's data store, plus its schema cache.
pub struct TenantHandle {
    /// The tenant this handle belongs to.
    pub tenant_code: String,
    /// The pooled connection.
    pub pool: SqlitePool,
}

type Slot = Arc<Mutex<Option<Arc<TenantHandle>>>>;

/// In-process registry mapping `tenantCode` to a live [`TenantHandle`].
pub struct TenantRegistry {
    central: CentralStore,
    crypto_key: CryptoKey,
    config: TenantConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl TenantRegistry {
    /// Build a registry over the given central store and crypto key.
    pub fn new(central: CentralStore, crypto_key: CryptoKey, config: TenantConfig) -> Self {
        Self {
            central,
            crypto_key,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a live connection for `tenant_code`, creating one if absent
    /// or unhealthy. Concurrent misses for the same tenant collapse onto a
    /// single connect attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotProvisioned`] if the tenant has no active
    /// connection source, or [`CoreError::Transient`]/[`CoreError::Internal`]
    /// if the connection attempt fails.
    pub async fn resolve(&self, tenant_code: &str) -> Result<Arc<TenantHandle>, CoreError> {
        let slot = self.slot_for(tenant_code).await;
        let mut guard = slot.lock().await;

        if let Some(handle) = guard.as_ref() {
            if sqlx::query("SELECT 1").execute(&handle.pool).await.is_ok() {
                return Ok(Arc::clone(handle));
            }
            tracing::warn!(tenant_code, "cached tenant connection unhealthy, evicting");
            *guard = None;
        }

        let handle = Arc::new(self.connect(tenant_code).await?);
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn slot_for(&self, tenant_code: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(
            slots
                .entry(tenant_code.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    async fn connect(&self, tenant_code: &str) -> Result<TenantHandle, CoreError> {
        let source = self.central.get_connection_source(tenant_code).await?;
        let _connection_string = source
            .decrypted_connection_string(&self.crypto_key)
            .map_err(|e| CoreError::Internal(format!("failed to decrypt connection string: {e}")))?;

        let path = self.tenant_db_path(tenant_code);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Internal(format!("failed to create tenant data dir: {e}")))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.pool_size)
            .acquire_timeout(Duration::from_millis(self.config.server_selection_timeout_ms))
            .connect(&url)
            .await
            .map_err(|e| CoreError::Transient(format!("tenant connect failed: {e}")))?;

        schema::init(&pool)
            .await
            .map_err(|e| CoreError::Internal(format!("tenant schema init failed: {e}")))?;

        tracing::info!(tenant_code, "established tenant connection");
        Ok(TenantHandle {
            tenant_code: tenant_code.to_string(),
            pool,
        })
    }

    fn tenant_db_path(&self, tenant_code: &str) -> PathBuf {
        PathBuf::from(&self.config.data_dir).join(format!("{tenant_code}.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::models::TenantConnectionSource;
    use crate::crypto;

    async fn test_registry(data_dir: &std::path::Path) -> TenantRegistry {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let central = CentralStore::from_pool(pool);
        central.ensure_schema().await.unwrap();
        let key = CryptoKey::from_secret("0123456789abcdef0123456789abcdef-extra").unwrap();

        let encrypted = crypto::encrypt(Some("unused"), &key).unwrap().unwrap();
        central
            .upsert_connection_source(&TenantConnectionSource {
                tenant_code: "ACME".to_string(),
                connection_string_encrypted: encrypted,
                active: true,
            })
            .await
            .unwrap();

        TenantRegistry::new(
            central,
            key,
            TenantConfig {
                data_dir: data_dir.to_string_lossy().to_string(),
                pool_size: 5,
                server_selection_timeout_ms: 5_000,
                socket_timeout_ms: 5_000,
            },
        )
    }

    #[tokio::test]
    async fn resolve_creates_and_caches_connection() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path()).await;

        let first = registry.resolve("ACME").await.unwrap();
        let second = registry.resolve("ACME").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second), "second resolve must hit cache");
    }

    #[tokio::test]
    async fn resolve_fails_closed_when_not_provisioned() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path()).await;

        let err = registry.resolve("GHOST").await.unwrap_err();
        assert!(matches!(err, CoreError::NotProvisioned(_)));
    }

    #[tokio::test]
    async fn concurrent_resolves_single_flight_to_one_connection() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(test_registry(dir.path()).await);

        let a = {
            let r = Arc::clone(&registry);
            tokio::spawn(async move { r.resolve("ACME").await.unwrap() })
        };
        let b = {
            let r = Arc::clone(&registry);
            tokio::spawn(async move { r.resolve("ACME").await.unwrap() })
        };

        let (handle_a, handle_b) = (a.await.unwrap(), b.await.unwrap());
        assert!(Arc::ptr_eq(&handle_a, &handle_b));
    }
}
