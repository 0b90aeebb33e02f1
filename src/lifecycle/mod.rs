//! Tenant database lifecycle.
//!
//! Every operation runs under the tenant's lock and follows the same order:
//! load, resolve the flavor, check the admin endpoint, validate the
//! transition, call the driver, persist, audit.

mod locks;
mod state;

pub use locks::TenantLocks;
pub use state::{Operation, transition};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capacity::{CapacityAction, decide};
use crate::credentials::CredentialGenerator;
use crate::driver::{DriverError, DriverResult, FlavorDescriptor, FlavorRegistry, with_timeout};
use crate::error::{Error, Result};
use crate::notify::{AuditEntry, AuditSink, AuditStatus};
use crate::store::Store;
use crate::types::{
    AccessState, Actor, DEFAULT_ALLOCATED_SIZE_KB, Rejection, StorageNotice, TenantDatabase,
    TenantFilter,
};

/// Generated identifiers are retried this many times on collision.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub flavor: String,
    pub owner_id: String,
    pub owner_email: Option<String>,
    pub allocated_size_kb: Option<i64>,
}

/// Outcome of applying one storage measurement.
#[derive(Debug, Clone)]
pub struct StorageVerdict {
    pub action: CapacityAction,
    pub tenant: TenantDatabase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    pub removed: usize,
    pub failed: usize,
}

/// A tenant loaded under its lock, with its driver resolved and the
/// requested transition validated.
struct Prepared {
    tenant: TenantDatabase,
    descriptor: FlavorDescriptor,
    next: AccessState,
    _guard: OwnedMutexGuard<()>,
}

impl Prepared {
    fn login_password(&self) -> Option<&str> {
        self.descriptor
            .driver
            .login_toggle_needs_password()
            .then_some(self.tenant.password.as_str())
    }
}

pub struct LifecycleService {
    store: Arc<dyn Store>,
    registry: Arc<FlavorRegistry>,
    audit: Arc<dyn AuditSink>,
    locks: TenantLocks,
    generator: CredentialGenerator,
    driver_timeout: Duration,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<FlavorRegistry>,
        audit: Arc<dyn AuditSink>,
        driver_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            audit,
            locks: TenantLocks::new(),
            generator: CredentialGenerator::new(),
            driver_timeout,
        }
    }

    pub fn registry(&self) -> &FlavorRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn driver_timeout(&self) -> Duration {
        self.driver_timeout
    }

    // Queries

    pub fn get(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        let tenant = self.store.get_tenant(id)?.ok_or(Error::NotFound)?;
        if !tenant.provisioned || !visible_to(&tenant, actor) {
            return Err(Error::NotFound);
        }
        Ok(tenant)
    }

    /// Owners only ever see their own live tenants, whatever the filter says.
    pub fn list(&self, actor: &Actor, filter: &TenantFilter) -> Result<Vec<TenantDatabase>> {
        match actor {
            Actor::Owner { id } => self.store.list_tenants(&TenantFilter {
                owner_id: Some(id.clone()),
                flavor: filter.flavor.clone(),
                include_deleted: false,
            }),
            _ => self.store.list_tenants(filter),
        }
    }

    pub fn password(&self, id: &str, actor: &Actor) -> Result<String> {
        Ok(self.get(id, actor)?.password)
    }

    // Creation

    pub async fn create(&self, actor: &Actor, request: CreateRequest) -> Result<TenantDatabase> {
        let result = self.create_inner(actor, &request).await;
        let subject = match &result {
            Ok(tenant) => format!("Database {} created", tenant.name),
            Err(e) => format!("Failed to create {} database: {e}", request.flavor),
        };
        self.record("create", actor, subject, &result);
        result
    }

    async fn create_inner(&self, actor: &Actor, request: &CreateRequest) -> Result<TenantDatabase> {
        if let Actor::Owner { id } = actor {
            if *id != request.owner_id {
                return Err(rejected(Rejection::OperatorOnly, None));
            }
        }
        if let Some(quota) = request.allocated_size_kb {
            if quota <= 0 {
                return Err(Error::InvalidInput(format!(
                    "allocated size must be positive, got {quota}"
                )));
            }
        }

        let descriptor = self
            .registry
            .resolve(&request.flavor)
            .ok_or_else(|| rejected(Rejection::UnknownFlavor, None))?
            .clone();
        self.ensure_available(&descriptor).await?;

        let mut tenant = self.insert_intent(request, &descriptor)?;
        let _guard = self.locks.lock(&tenant.id).await;

        let provisioned = self
            .call(descriptor.driver.create_database(
                &tenant.name,
                &tenant.user,
                &tenant.password,
            ))
            .await;
        match provisioned {
            Ok(()) => {}
            // The engine may still finish the work; reconciliation settles it.
            Err(Error::Unavailable(reason)) => {
                warn!(
                    "provisioning of {} did not complete ({reason}), left for reconciliation",
                    tenant.name
                );
                return Err(Error::Unavailable(reason));
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_tenant(&tenant.id) {
                    warn!(
                        "failed to remove intent record {} after provisioning error: {cleanup}",
                        tenant.id
                    );
                }
                return Err(e);
            }
        }

        if let Err(e) = self.store.mark_provisioned(&tenant.id) {
            warn!(
                "database {} provisioned but not confirmed locally, left for reconciliation: {e}",
                tenant.name
            );
            return Err(e);
        }
        tenant.provisioned = true;

        info!(
            "provisioned {} database {} for owner {}",
            descriptor.flavor, tenant.name, tenant.owner_id
        );
        Ok(tenant)
    }

    /// Writes the pending row, regenerating credentials whenever the name or
    /// user is already taken.
    fn insert_intent(
        &self,
        request: &CreateRequest,
        descriptor: &FlavorDescriptor,
    ) -> Result<TenantDatabase> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let credentials = self.generator.generate();
            if self
                .store
                .identifiers_in_use(&credentials.name, &credentials.user)?
            {
                debug!("generated identifiers already in use (attempt {attempt})");
                continue;
            }

            let tenant = TenantDatabase {
                id: Uuid::new_v4().to_string(),
                flavor: descriptor.flavor.as_str().to_string(),
                host: descriptor.host.clone(),
                port: descriptor.port,
                name: credentials.name,
                user: credentials.user,
                password: credentials.password,
                owner_id: request.owner_id.clone(),
                owner_email: request.owner_email.clone(),
                created_at: Utc::now(),
                allocated_size_kb: request
                    .allocated_size_kb
                    .unwrap_or(DEFAULT_ALLOCATED_SIZE_KB),
                default_storage_kb: None,
                disabled: false,
                admin_disabled: false,
                deleted: false,
                write_revoked: false,
                storage_notice: StorageNotice::None,
                provisioned: false,
            };

            match self.store.create_tenant(&tenant) {
                Ok(()) => return Ok(tenant),
                Err(Error::IdentifierCollision) => {
                    debug!("identifier collision on insert (attempt {attempt})");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::IdentifierCollision)
    }

    // Access state

    pub async fn user_disable(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_login(id, actor, Operation::UserDisable).await
    }

    pub async fn user_enable(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_login(id, actor, Operation::UserEnable).await
    }

    pub async fn admin_disable(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_login(id, actor, Operation::AdminDisable).await
    }

    pub async fn admin_enable(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_login(id, actor, Operation::AdminEnable).await
    }

    async fn set_login(&self, id: &str, actor: &Actor, op: Operation) -> Result<TenantDatabase> {
        let result: Result<TenantDatabase> = async {
            let mut prepared = self.begin(id, actor, op).await?;
            let driver = Arc::clone(&prepared.descriptor.driver);
            let user = prepared.tenant.user.clone();
            let password = prepared.login_password().map(str::to_string);

            if prepared.next.login_enabled() {
                self.call(driver.enable_login(&user, password.as_deref()))
                    .await?;
            } else {
                self.call(driver.disable_login(&user, password.as_deref()))
                    .await?;
            }

            prepared.tenant.set_state(prepared.next);
            self.store.update_tenant(&prepared.tenant)?;
            Ok(prepared.tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    // Write access

    pub async fn revoke_write(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_write_access(id, actor, Operation::RevokeWrite)
            .await
    }

    /// Write access is only ever restored through this call.
    pub async fn restore_write(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        self.set_write_access(id, actor, Operation::RestoreWrite)
            .await
    }

    async fn set_write_access(
        &self,
        id: &str,
        actor: &Actor,
        op: Operation,
    ) -> Result<TenantDatabase> {
        let result: Result<TenantDatabase> = async {
            let mut prepared = self.begin(id, actor, op).await?;
            let driver = Arc::clone(&prepared.descriptor.driver);
            let tenant = &mut prepared.tenant;

            // Always re-applied on the engine; the flag only mirrors it.
            if op == Operation::RevokeWrite {
                self.call(driver.revoke_write_access(&tenant.name, &tenant.user))
                    .await?;
                tenant.write_revoked = true;
            } else {
                self.call(driver.grant_write_access(&tenant.name, &tenant.user))
                    .await?;
                tenant.write_revoked = false;
            }

            self.store.update_tenant(tenant)?;
            Ok(prepared.tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    // Data and credentials

    /// Drops and recreates the database. All tenant data is lost; identity
    /// and credentials are kept.
    pub async fn reset(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        let op = Operation::Reset;
        let result: Result<TenantDatabase> = async {
            let mut prepared = self.begin(id, actor, op).await?;
            let driver = Arc::clone(&prepared.descriptor.driver);
            let tenant = &mut prepared.tenant;

            self.call(driver.reset_database(&tenant.name, &tenant.user, &tenant.password))
                .await?;

            // The recreated database comes back empty and fully granted.
            tenant.write_revoked = false;
            tenant.storage_notice = StorageNotice::None;
            tenant.default_storage_kb = None;
            self.store.update_tenant(tenant)?;
            Ok(prepared.tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    /// Sets a new password, generating one when `new_password` is `None`.
    ///
    /// If the engine accepted the change but the local commit fails, the
    /// engine is set back to the stored password before the error is returned.
    pub async fn reset_password(
        &self,
        id: &str,
        actor: &Actor,
        new_password: Option<String>,
    ) -> Result<TenantDatabase> {
        let op = Operation::ResetPassword;
        let result: Result<TenantDatabase> = async {
            let new_password = match new_password {
                Some(p) if p.is_empty() => {
                    return Err(Error::InvalidInput("password must not be empty".into()));
                }
                Some(p) => p,
                None => self.generator.generate_password(),
            };

            let mut prepared = self.begin(id, actor, op).await?;
            let driver = Arc::clone(&prepared.descriptor.driver);
            let tenant = &mut prepared.tenant;

            self.call(driver.reset_password(&tenant.user, &new_password))
                .await?;

            let old_password = std::mem::replace(&mut tenant.password, new_password);
            if let Err(e) = self.store.update_tenant(tenant) {
                warn!("password commit failed for {}, restoring engine password", tenant.name);
                if let Err(undo) = self
                    .call(driver.reset_password(&tenant.user, &old_password))
                    .await
                {
                    warn!("could not restore password for {}: {undo}", tenant.name);
                }
                return Err(e);
            }
            Ok(prepared.tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    /// Soft delete. Login is disabled on the engine; the database itself is
    /// kept.
    pub async fn delete(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        let op = Operation::Delete;
        let result: Result<TenantDatabase> = async {
            let mut prepared = self.begin(id, actor, op).await?;

            if prepared.tenant.state().login_enabled() {
                let driver = Arc::clone(&prepared.descriptor.driver);
                let password = prepared.login_password().map(str::to_string);
                self.call(driver.disable_login(&prepared.tenant.user, password.as_deref()))
                    .await?;
            }

            prepared.tenant.set_state(prepared.next);
            self.store.update_tenant(&prepared.tenant)?;
            Ok(prepared.tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    /// Raises the quota. No engine call is involved.
    pub async fn allocate_storage(
        &self,
        id: &str,
        actor: &Actor,
        additional_kb: i64,
    ) -> Result<TenantDatabase> {
        let op = Operation::AllocateStorage;
        let result: Result<TenantDatabase> = async {
            if additional_kb <= 0 {
                return Err(Error::InvalidInput(format!(
                    "additional storage must be positive, got {additional_kb}"
                )));
            }
            if !actor.is_operator() {
                return Err(rejected(Rejection::OperatorOnly, None));
            }

            let _guard = self.locks.lock(id).await;
            let mut tenant = self.load(id, actor)?;
            transition(tenant.state(), op).map_err(|r| rejected(r, Some(tenant.state())))?;

            tenant.allocated_size_kb = tenant.allocated_size_kb.saturating_add(additional_kb);
            self.store.update_tenant(&tenant)?;
            Ok(tenant)
        }
        .await;

        self.record(op.as_str(), actor, describe(id, op, &result), &result);
        result
    }

    // Capacity

    /// Applies a fresh measurement under the tenant lock. The tenant is
    /// re-read first so concurrent lifecycle changes are respected.
    pub async fn apply_storage_verdict(
        &self,
        id: &str,
        used_kb: i64,
        warning_ratio: f64,
    ) -> Result<StorageVerdict> {
        let _guard = self.locks.lock(id).await;
        let mut tenant = self.store.get_tenant(id)?.ok_or(Error::NotFound)?;

        if tenant.deleted || !tenant.provisioned {
            return Ok(StorageVerdict {
                action: CapacityAction::None,
                tenant,
            });
        }

        let action = decide(&tenant, used_kb, warning_ratio);
        tenant.default_storage_kb = Some(used_kb);

        if action == CapacityAction::None {
            self.store.record_storage_usage(id, used_kb)?;
            return Ok(StorageVerdict { action, tenant });
        }

        if action.revokes() {
            let result = self.revoke_for_capacity(&tenant).await;
            self.record(
                Operation::RevokeWrite.as_str(),
                &Actor::System,
                format!("Database {} reached its storage quota", tenant.name),
                &result,
            );
            result?;
            tenant.write_revoked = true;
        }

        tenant.storage_notice = action.notice_after(tenant.storage_notice);
        self.store.update_tenant(&tenant)?;
        Ok(StorageVerdict { action, tenant })
    }

    async fn revoke_for_capacity(&self, tenant: &TenantDatabase) -> Result<()> {
        let descriptor = self
            .registry
            .resolve(&tenant.flavor)
            .ok_or_else(|| rejected(Rejection::UnknownFlavor, Some(tenant.state())))?;
        self.ensure_available(descriptor).await?;
        self.call(
            descriptor
                .driver
                .revoke_write_access(&tenant.name, &tenant.user),
        )
        .await
    }

    /// Settles intent records older than `grace`: confirmed when the database
    /// exists on the engine, otherwise dropped on the engine and removed.
    pub async fn reconcile_pending(&self, grace: Duration) -> Result<ReconcileReport> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| Error::InvalidInput(format!("reconcile grace: {e}")))?;
        let pending = self.store.list_pending_tenants(Utc::now() - grace)?;
        let mut report = ReconcileReport::default();

        for tenant in pending {
            let _guard = self.locks.lock(&tenant.id).await;

            let Some(descriptor) = self.registry.resolve(&tenant.flavor) else {
                warn!("pending tenant {} has unknown flavor {}", tenant.id, tenant.flavor);
                report.failed += 1;
                continue;
            };

            match self.call(descriptor.driver.database_exists(&tenant.name)).await {
                Ok(true) => {
                    self.store.mark_provisioned(&tenant.id)?;
                    info!("confirmed pending database {}", tenant.name);
                    report.confirmed += 1;
                }
                Ok(false) => {
                    // Whatever a cancelled create left behind goes with the record.
                    let dropped = self
                        .call(descriptor.driver.drop_database(&tenant.name, &tenant.user))
                        .await;
                    if let Err(e) = dropped {
                        warn!("could not clean up pending database {}: {e}", tenant.name);
                        report.failed += 1;
                        continue;
                    }
                    self.store.delete_tenant(&tenant.id)?;
                    info!("removed unprovisioned intent record {}", tenant.id);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("could not reconcile pending database {}: {e}", tenant.name);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    // Helpers

    async fn begin(&self, id: &str, actor: &Actor, op: Operation) -> Result<Prepared> {
        if op.requires_operator() && !actor.is_operator() {
            return Err(rejected(Rejection::OperatorOnly, None));
        }

        let guard = self.locks.lock(id).await;
        let tenant = self.load(id, actor)?;
        let state = tenant.state();

        let descriptor = self
            .registry
            .resolve(&tenant.flavor)
            .ok_or_else(|| rejected(Rejection::UnknownFlavor, Some(state)))?
            .clone();
        self.ensure_available(&descriptor).await?;

        let next = transition(state, op).map_err(|r| rejected(r, Some(state)))?;

        Ok(Prepared {
            tenant,
            descriptor,
            next,
            _guard: guard,
        })
    }

    fn load(&self, id: &str, actor: &Actor) -> Result<TenantDatabase> {
        match self.store.get_tenant(id)? {
            Some(tenant) if tenant.provisioned && visible_to(&tenant, actor) => Ok(tenant),
            _ => Err(Error::NotFound),
        }
    }

    async fn ensure_available(&self, descriptor: &FlavorDescriptor) -> Result<()> {
        let reachable = with_timeout(self.driver_timeout, async {
            Ok(descriptor.driver.check_connection().await)
        })
        .await;

        match reachable {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(Error::Unavailable(format!(
                "{} admin endpoint at {}:{} is unreachable",
                descriptor.flavor, descriptor.host, descriptor.port
            ))),
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = DriverResult<T>>,
    {
        match with_timeout(self.driver_timeout, fut).await {
            Ok(value) => Ok(value),
            Err(DriverError::Timeout(limit)) => Err(Error::Unavailable(format!(
                "admin call timed out after {limit:?}"
            ))),
            Err(e) => Err(Error::Driver(e)),
        }
    }

    fn record<T>(&self, operation: &str, actor: &Actor, description: String, result: &Result<T>) {
        let status = if result.is_ok() {
            AuditStatus::Success
        } else {
            AuditStatus::Failed
        };
        self.audit
            .append(AuditEntry::new(operation, status, actor, description));
    }
}

fn rejected(reason: Rejection, state: Option<AccessState>) -> Error {
    Error::Rejected { reason, state }
}

fn visible_to(tenant: &TenantDatabase, actor: &Actor) -> bool {
    match actor {
        Actor::Owner { id } => tenant.owner_id == *id && !tenant.deleted,
        Actor::Operator { .. } | Actor::System => true,
    }
}

fn describe(id: &str, op: Operation, result: &Result<TenantDatabase>) -> String {
    match result {
        Ok(tenant) => format!("{op} succeeded for database {}", tenant.name),
        Err(e) => format!("{op} failed for database with ID {id}: {e}"),
    }
}
