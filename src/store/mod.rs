mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{TenantDatabase, TenantFilter};

/// Store defines the persistence interface for tenant records.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Inserts a new record. A duplicate name or user yields
    /// `Error::IdentifierCollision`.
    fn create_tenant(&self, tenant: &TenantDatabase) -> Result<()>;
    fn get_tenant(&self, id: &str) -> Result<Option<TenantDatabase>>;
    fn identifiers_in_use(&self, name: &str, user: &str) -> Result<bool>;
    fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantDatabase>>;
    /// Provisioned, non-deleted tenants; the set the capacity sweep walks.
    fn list_live_tenants(&self) -> Result<Vec<TenantDatabase>>;
    /// Intent records created before `older_than` that were never confirmed.
    fn list_pending_tenants(&self, older_than: DateTime<Utc>) -> Result<Vec<TenantDatabase>>;
    fn update_tenant(&self, tenant: &TenantDatabase) -> Result<()>;
    fn record_storage_usage(&self, id: &str, used_kb: i64) -> Result<()>;
    fn mark_provisioned(&self, id: &str) -> Result<()>;
    fn delete_tenant(&self, id: &str) -> Result<bool>;
}
