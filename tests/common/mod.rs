#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use tenantdb::capacity::{CapacityEnforcer, EnforcerSettings};
use tenantdb::driver::{
    DatabaseAdminDriver, DriverError, DriverResult, Flavor, FlavorDescriptor, FlavorRegistry,
    StorageUsage, TenantConnection,
};
use tenantdb::error::{Error, Result};
use tenantdb::lifecycle::{CreateRequest, LifecycleService};
use tenantdb::notify::{AuditEntry, AuditSink, Notification, Notifier};
use tenantdb::store::{SqliteStore, Store};
use tenantdb::types::{
    Actor, DEFAULT_ALLOCATED_SIZE_KB, StorageNotice, TenantDatabase, TenantFilter,
};

pub const DRIVER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateDatabase {
        name: String,
        user: String,
        password: String,
    },
    DropDatabase {
        name: String,
        user: String,
    },
    ResetDatabase {
        name: String,
    },
    DisableLogin {
        user: String,
        password: Option<String>,
    },
    EnableLogin {
        user: String,
        password: Option<String>,
    },
    RevokeWrite {
        dbname: String,
    },
    GrantWrite {
        dbname: String,
    },
    ResetPassword {
        user: String,
        password: String,
    },
    MeasureSize {
        dbname: String,
    },
    DatabaseExists {
        name: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum FakeSize {
    Kb(i64),
    Unmeasurable,
    Error,
    Hang,
}

/// In-memory driver that records every call and can be told to fail or hang.
pub struct FakeDriver {
    flavor: Flavor,
    reachable: AtomicBool,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
    hanging: Mutex<HashSet<&'static str>>,
    sizes: Mutex<HashMap<String, FakeSize>>,
    existing: Mutex<HashSet<String>>,
}

impl FakeDriver {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            reachable: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            sizes: Mutex::new(HashMap::new()),
            existing: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn hang(&self, op: &'static str) {
        self.hanging.lock().unwrap().insert(op);
    }

    pub fn set_size(&self, dbname: &str, size: FakeSize) {
        self.sizes.lock().unwrap().insert(dbname.to_string(), size);
    }

    pub fn add_existing(&self, name: &str) {
        self.existing.lock().unwrap().insert(name.to_string());
    }

    async fn enter(&self, op: &'static str, call: Call) -> DriverResult<()> {
        self.calls.lock().unwrap().push(call);
        let hangs = self.hanging.lock().unwrap().contains(op);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(DriverError::Connection(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseAdminDriver for FakeDriver {
    fn login_toggle_needs_password(&self) -> bool {
        self.flavor == Flavor::MySql
    }

    async fn check_connection(&self) -> bool {
        let hangs = self.hanging.lock().unwrap().contains("check_connection");
        if hangs {
            std::future::pending::<()>().await;
        }
        self.reachable.load(Ordering::SeqCst)
    }

    async fn create_database(&self, name: &str, user: &str, password: &str) -> DriverResult<()> {
        self.enter(
            "create_database",
            Call::CreateDatabase {
                name: name.to_string(),
                user: user.to_string(),
                password: password.to_string(),
            },
        )
        .await?;
        self.add_existing(name);
        Ok(())
    }

    async fn drop_database(&self, name: &str, user: &str) -> DriverResult<()> {
        self.enter(
            "drop_database",
            Call::DropDatabase {
                name: name.to_string(),
                user: user.to_string(),
            },
        )
        .await?;
        self.existing.lock().unwrap().remove(name);
        Ok(())
    }

    async fn reset_database(&self, name: &str, _user: &str, _password: &str) -> DriverResult<()> {
        self.enter(
            "reset_database",
            Call::ResetDatabase {
                name: name.to_string(),
            },
        )
        .await
    }

    async fn create_connection(
        &self,
        _user: &str,
        _password: &str,
        _dbname: &str,
    ) -> Option<TenantConnection> {
        None
    }

    async fn disable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()> {
        if self.login_toggle_needs_password() && password.is_none() {
            return Err(DriverError::PasswordRequired("fake login toggle"));
        }
        self.enter(
            "disable_login",
            Call::DisableLogin {
                user: user.to_string(),
                password: password.map(str::to_string),
            },
        )
        .await
    }

    async fn enable_login(&self, user: &str, password: Option<&str>) -> DriverResult<()> {
        if self.login_toggle_needs_password() && password.is_none() {
            return Err(DriverError::PasswordRequired("fake login toggle"));
        }
        self.enter(
            "enable_login",
            Call::EnableLogin {
                user: user.to_string(),
                password: password.map(str::to_string),
            },
        )
        .await
    }

    async fn revoke_write_access(&self, dbname: &str, _user: &str) -> DriverResult<()> {
        self.enter(
            "revoke_write_access",
            Call::RevokeWrite {
                dbname: dbname.to_string(),
            },
        )
        .await
    }

    async fn grant_write_access(&self, dbname: &str, _user: &str) -> DriverResult<()> {
        self.enter(
            "grant_write_access",
            Call::GrantWrite {
                dbname: dbname.to_string(),
            },
        )
        .await
    }

    async fn reset_password(&self, user: &str, new_password: &str) -> DriverResult<()> {
        self.enter(
            "reset_password",
            Call::ResetPassword {
                user: user.to_string(),
                password: new_password.to_string(),
            },
        )
        .await
    }

    async fn measure_size(
        &self,
        _user: &str,
        _password: &str,
        dbname: &str,
    ) -> DriverResult<StorageUsage> {
        self.calls.lock().unwrap().push(Call::MeasureSize {
            dbname: dbname.to_string(),
        });
        let size = self
            .sizes
            .lock()
            .unwrap()
            .get(dbname)
            .copied()
            .unwrap_or(FakeSize::Kb(0));

        match size {
            FakeSize::Kb(kb) => Ok(StorageUsage::Measured(kb)),
            FakeSize::Unmeasurable => Ok(StorageUsage::Unmeasurable),
            FakeSize::Error => Err(DriverError::Connection("connection reset".to_string())),
            FakeSize::Hang => {
                std::future::pending::<()>().await;
                Ok(StorageUsage::Unmeasurable)
            }
        }
    }

    async fn database_exists(&self, name: &str) -> DriverResult<bool> {
        self.enter(
            "database_exists",
            Call::DatabaseExists {
                name: name.to_string(),
            },
        )
        .await?;
        Ok(self.existing.lock().unwrap().contains(name))
    }
}

/// Wraps the SQLite store to inject collisions and commit failures.
pub struct FlakyStore {
    inner: SqliteStore,
    collisions: AtomicUsize,
    fail_updates: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            collisions: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// The next `n` inserts report a name/user collision.
    pub fn collide_next(&self, n: usize) {
        self.collisions.store(n, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl Store for FlakyStore {
    fn initialize(&self) -> Result<()> {
        self.inner.initialize()
    }

    fn create_tenant(&self, tenant: &TenantDatabase) -> Result<()> {
        let remaining = self.collisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.collisions.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::IdentifierCollision);
        }
        self.inner.create_tenant(tenant)
    }

    fn get_tenant(&self, id: &str) -> Result<Option<TenantDatabase>> {
        self.inner.get_tenant(id)
    }

    fn identifiers_in_use(&self, name: &str, user: &str) -> Result<bool> {
        self.inner.identifiers_in_use(name, user)
    }

    fn list_tenants(&self, filter: &TenantFilter) -> Result<Vec<TenantDatabase>> {
        self.inner.list_tenants(filter)
    }

    fn list_live_tenants(&self) -> Result<Vec<TenantDatabase>> {
        self.inner.list_live_tenants()
    }

    fn list_pending_tenants(&self, older_than: DateTime<Utc>) -> Result<Vec<TenantDatabase>> {
        self.inner.list_pending_tenants(older_than)
    }

    fn update_tenant(&self, tenant: &TenantDatabase) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.update_tenant(tenant)
    }

    fn record_storage_usage(&self, id: &str, used_kb: i64) -> Result<()> {
        self.inner.record_storage_usage(id, used_kb)
    }

    fn mark_provisioned(&self, id: &str) -> Result<()> {
        self.inner.mark_provisioned(id)
    }

    fn delete_tenant(&self, id: &str) -> Result<bool> {
        self.inner.delete_tenant(id)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, subject: &str) -> usize {
        self.sent().iter().filter(|n| n.subject == subject).count()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn append(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

pub struct Harness {
    _temp: TempDir,
    pub store: Arc<FlakyStore>,
    pub mysql: Arc<FakeDriver>,
    pub postgres: Arc<FakeDriver>,
    pub audit: Arc<RecordingAudit>,
    pub notifier: Arc<RecordingNotifier>,
    pub lifecycle: Arc<LifecycleService>,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let sqlite = SqliteStore::new(temp.path().join("tenantdb.db")).expect("open store");
        sqlite.initialize().expect("initialize store");
        let store = Arc::new(FlakyStore::new(sqlite));

        let mysql = Arc::new(FakeDriver::new(Flavor::MySql));
        let postgres = Arc::new(FakeDriver::new(Flavor::Postgres));
        let registry = FlavorRegistry::new(vec![
            FlavorDescriptor {
                flavor: Flavor::MySql,
                host: "mysql.test".to_string(),
                port: 3306,
                driver: mysql.clone(),
            },
            FlavorDescriptor {
                flavor: Flavor::Postgres,
                host: "postgres.test".to_string(),
                port: 5432,
                driver: postgres.clone(),
            },
        ]);

        let audit = Arc::new(RecordingAudit::default());
        let lifecycle = Arc::new(LifecycleService::new(
            store.clone(),
            Arc::new(registry),
            audit.clone(),
            DRIVER_TIMEOUT,
        ));

        Self {
            _temp: temp,
            store,
            mysql,
            postgres,
            audit,
            notifier: Arc::new(RecordingNotifier::default()),
            lifecycle,
        }
    }

    pub fn driver(&self, flavor: &str) -> &FakeDriver {
        match flavor {
            "mysql" => &self.mysql,
            _ => &self.postgres,
        }
    }

    pub fn enforcer(&self) -> CapacityEnforcer {
        CapacityEnforcer::new(
            self.lifecycle.clone(),
            self.notifier.clone(),
            EnforcerSettings {
                warning_ratio: 0.7,
                max_concurrency: 2,
                reconcile_grace: Duration::from_secs(600),
                recipients: vec!["ops@example.com".to_string()],
            },
        )
    }

    pub async fn create(&self, flavor: &str) -> TenantDatabase {
        self.create_with_quota(flavor, None).await
    }

    pub async fn create_with_quota(&self, flavor: &str, quota_kb: Option<i64>) -> TenantDatabase {
        self.lifecycle
            .create(
                &operator(),
                CreateRequest {
                    flavor: flavor.to_string(),
                    owner_id: "owner-1".to_string(),
                    owner_email: Some("owner@example.com".to_string()),
                    allocated_size_kb: quota_kb,
                },
            )
            .await
            .expect("create tenant")
    }

    pub fn reload(&self, id: &str) -> TenantDatabase {
        self.store
            .get_tenant(id)
            .expect("read tenant")
            .expect("tenant exists")
    }
}

pub fn operator() -> Actor {
    Actor::Operator {
        id: "op-1".to_string(),
    }
}

pub fn owner() -> Actor {
    Actor::Owner {
        id: "owner-1".to_string(),
    }
}

/// A raw record, written straight to the store.
pub fn tenant_record(flavor: &str, provisioned: bool, created_at: DateTime<Utc>) -> TenantDatabase {
    let suffix = Uuid::new_v4().simple().to_string();
    TenantDatabase {
        id: Uuid::new_v4().to_string(),
        flavor: flavor.to_string(),
        host: "127.0.0.1".to_string(),
        port: 5432,
        name: format!("db{}", &suffix[..12]),
        user: format!("u{}", &suffix[..12]),
        password: "secret".to_string(),
        owner_id: "owner-1".to_string(),
        owner_email: None,
        created_at,
        allocated_size_kb: DEFAULT_ALLOCATED_SIZE_KB,
        default_storage_kb: None,
        disabled: false,
        admin_disabled: false,
        deleted: false,
        write_revoked: false,
        storage_notice: StorageNotice::None,
        provisioned,
    }
}
