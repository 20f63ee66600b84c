//! The tenant connection registry (§4.C): a cached, lazily established
//! connection-per-tenant pool keyed by tenant code, backed by one SQLite
//! file per tenant under `[tenant].data_dir`.

pub mod registry;
pub mod schema;

pub use registry::{TenantHandle, TenantRegistry};
