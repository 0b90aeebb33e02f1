//! # tenantdb
//!
//! Provisioning, access lifecycle and storage quota enforcement for
//! per-tenant MySQL and Postgres databases on shared admin-controlled
//! engines. Usable as a library or through the `tenantdb` binary.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantdb::config::ServiceConfig;
//! use tenantdb::driver::FlavorRegistry;
//! use tenantdb::lifecycle::{CreateRequest, LifecycleService};
//! use tenantdb::notify::LogAuditSink;
//! use tenantdb::store::{SqliteStore, Store};
//! use tenantdb::types::Actor;
//!
//! let config = ServiceConfig::load("tenantdb.toml".as_ref())?;
//! let store = SqliteStore::new(config.db_path())?;
//! store.initialize()?;
//!
//! let lifecycle = LifecycleService::new(
//!     Arc::new(store),
//!     Arc::new(FlavorRegistry::from_config(&config)),
//!     Arc::new(LogAuditSink),
//!     config.driver_timeout(),
//! );
//! let tenant = lifecycle
//!     .create(&Actor::System, CreateRequest {
//!         flavor: "postgres".into(),
//!         owner_id: "owner-1".into(),
//!         owner_email: None,
//!         allocated_size_kb: None,
//!     })
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod capacity;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod store;
pub mod types;
