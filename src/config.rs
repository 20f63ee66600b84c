//! Configuration loading and management.
//!
//! Loads configuration from `./config.toml` (or `$CORE_CONFIG_PATH`).
//! Environment variables override file values; file values override
//! defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// HTTP server settings (`[server]`).
    pub server: ServerConfig,
    /// Central store settings (`[central_store]`).
    pub central_store: CentralStoreConfig,
    /// Tenant connection registry settings (`[tenant]`).
    pub tenant: TenantConfig,
    /// Worker settings (`[worker]`).
    pub worker: WorkerConfig,
    /// Crypto key source (`[crypto]`).
    pub crypto: CryptoConfig,
    /// Outbound provider sidecar base URLs (`[providers]`).
    pub providers: ProvidersConfig,
}

impl CoreConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but fails to parse.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: CoreConfig =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(CoreConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    fn config_path() -> PathBuf {
        std::env::var("CORE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("CORE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env("CORE_RATE_LIMIT_PER_MINUTE") {
            match v.parse() {
                Ok(n) => self.server.rate_limit_per_minute = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CORE_RATE_LIMIT_PER_MINUTE"),
            }
        }
        if let Some(v) = env("CORE_CENTRAL_DATABASE_URL") {
            self.central_store.database_url = v;
        }
        if let Some(v) = env("CORE_TENANT_DATA_DIR") {
            self.tenant.data_dir = v;
        }
        if let Some(v) = env("CORE_WORKER_CONCURRENCY") {
            match v.parse() {
                Ok(n) => self.worker.concurrency = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid CORE_WORKER_CONCURRENCY"),
            }
        }
        if let Some(v) = env("CORE_WORKER_POLL_INTERVAL_MS") {
            match v.parse() {
                Ok(n) => self.worker.poll_interval_ms = n,
                Err(_) => {
                    tracing::warn!(value = %v, "ignoring invalid CORE_WORKER_POLL_INTERVAL_MS")
                }
            }
        }
        if let Some(v) = env("CORE_CRYPTO_KEY") {
            self.crypto.key = Some(v);
        }
        if let Some(v) = env("CORE_WHATSAPP_BASE_URL") {
            self.providers.whatsapp_base_url = v;
        }
        if let Some(v) = env("CORE_CALENDAR_BASE_URL") {
            self.providers.calendar_base_url = v;
        }
        if let Some(v) = env("CORE_EMAIL_BASE_URL") {
            self.providers.email_base_url = v;
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the axum server binds to.
    pub bind_addr: String,
    /// Trigger endpoint rate limit, requests per minute per tenant (§4.I).
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            rate_limit_per_minute: 60,
        }
    }
}

/// Central store settings (§4.B).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CentralStoreConfig {
    /// SQLite connection URL for the central store.
    pub database_url: String,
}

impl Default for CentralStoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://central.db?mode=rwc".to_string(),
        }
    }
}

/// Tenant connection registry settings (§4.C).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Directory holding one SQLite file per tenant code.
    pub data_dir: String,
    /// Max pooled connections per tenant.
    pub pool_size: u32,
    /// Server selection timeout in milliseconds.
    pub server_selection_timeout_ms: u64,
    /// Socket/statement timeout in milliseconds.
    pub socket_timeout_ms: u64,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            data_dir: "./tenants".to_string(),
            pool_size: 5,
            server_selection_timeout_ms: 30_000,
            socket_timeout_ms: 45_000,
        }
    }
}

/// Worker settings (§4.F).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Queue name this worker drains.
    pub queue_name: String,
    /// Max jobs in flight simultaneously.
    pub concurrency: usize,
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Base backoff in milliseconds, doubled per attempt.
    pub base_backoff_ms: u64,
    /// Default max attempts for jobs that don't specify one.
    pub default_max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "crm".to_string(),
            concurrency: 10,
            poll_interval_ms: 500,
            base_backoff_ms: 1_000,
            default_max_attempts: 3,
        }
    }
}

/// Crypto key source (§4.A).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// 32+ byte secret used to derive the AES-256 key. Required in
    /// production; absence is a hard failure at first use, not at load.
    pub key: Option<String>,
}

/// Outbound provider sidecar base URLs (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Base URL of the messaging (WhatsApp) sidecar.
    pub whatsapp_base_url: String,
    /// Base URL of the calendar provider.
    pub calendar_base_url: String,
    /// Base URL of the email-sending sidecar.
    pub email_base_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            whatsapp_base_url: "http://127.0.0.1:3001".to_string(),
            calendar_base_url: "https://www.googleapis.com".to_string(),
            email_base_url: "http://127.0.0.1:3002".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoreConfig::default();
        assert_eq!(config.server.rate_limit_per_minute, 60);
        assert_eq!(config.worker.concurrency, 10);
        assert_eq!(config.tenant.pool_size, 5);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = CoreConfig::from_toml(
            r#"
            [worker]
            concurrency = 25
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.worker.concurrency, 25);
        assert_eq!(config.worker.poll_interval_ms, 500);
    }

    #[test]
    fn env_overrides_win_over_file() {
        let mut config = CoreConfig::default();
        config.apply_overrides(|key| {
            if key == "CORE_WORKER_CONCURRENCY" {
                Some("3".to_string())
            } else {
                None
            }
        });
        assert_eq!(config.worker.concurrency, 3);
    }
}
