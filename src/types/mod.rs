mod access;
mod models;

pub use access::{AccessState, Actor, Rejection, StorageNotice};
pub use models::{DEFAULT_ALLOCATED_SIZE_KB, TenantDatabase, TenantFilter};

#[cfg(test)]
pub(crate) use models::sample_tenant;
