//! Admin drivers for the database engines tenants are provisioned on.
//!
//! Each flavor implements [`DatabaseAdminDriver`] against one admin endpoint.
//! Drivers never touch local state; the lifecycle layer decides what to call
//! and persists the outcome.

mod mysql;
mod postgres;
mod registry;
mod sql;

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use registry::{Flavor, FlavorDescriptor, FlavorRegistry};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("{0} requires the account password")]
    PasswordRequired(&'static str),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Storage used by a tenant database, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageUsage {
    Measured(i64),
    /// The engine could not report a size, e.g. the tenant cannot log in.
    Unmeasurable,
}

/// A live connection opened with a tenant's own credentials.
pub enum TenantConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

/// Engine-specific provisioning and administration.
///
/// Login toggling is asymmetric: Postgres flips a role attribute
/// and only needs the user, MySQL locks the account and re-asserts the stored
/// password on both paths. Callers pass `Some(password)` exactly when
/// [`login_toggle_needs_password`](Self::login_toggle_needs_password) is true.
#[async_trait]
pub trait DatabaseAdminDriver: Send + Sync {
    fn login_toggle_needs_password(&self) -> bool;

    async fn check_connection(&self) -> bool;

    /// Creates the database and its account. When a later step fails, what
    /// was already created is dropped again before the error is returned.
    async fn create_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()>;

    /// Drops the database and its account if they exist.
    async fn drop_database(&self, name: &str, user: &str) -> DriverResult<()>;

    /// Drops and recreates the database. All tenant data is lost.
    async fn reset_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()>;

    async fn create_connection(
        &self,
        user: &str,
        password: &str,
        dbname: &str,
    ) -> Option<TenantConnection>;

    async fn disable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()>;

    async fn enable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()>;

    async fn revoke_write_access(&self, dbname: &str, user: &str) -> DriverResult<()>;

    async fn grant_write_access(&self, dbname: &str, user: &str) -> DriverResult<()>;

    async fn reset_password(&self, user: &str, new_password: &str) -> DriverResult<()>;

    async fn measure_size(&self, user: &str, password: &str, dbname: &str)
    -> DriverResult<StorageUsage>;

    async fn database_exists(&self, name: &str) -> DriverResult<bool>;
}

/// Bounds a driver call. A stuck engine surfaces as [`DriverError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DriverError::Timeout(limit))?
}

fn bytes_to_kb(bytes: i64) -> i64 {
    bytes.max(0) / 1024
}
