//! The central store (§4.B): tenant registry, job table, audit logs.
//! Shared across all tenants, unlike the per-tenant stores in
//! [`crate::tenant`].

pub mod models;
pub mod store;

pub use models::{
    CallbackLog, DecryptedTenantSecrets, EventLog, EventLogStatus, Job, JobStatus, Tenant,
    TenantConnectionSource, TenantSecrets,
};
pub use store::CentralStore;
