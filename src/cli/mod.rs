mod commands;
mod service;
mod tenant;

pub use commands::{AdminCommands, Commands};
pub use service::{run_init, run_serve, run_sweep};
pub use tenant::{
    run_admin, run_create, run_delete, run_disable, run_enable, run_list, run_password, run_reset,
    run_reset_password, run_show,
};

use std::path::Path;
use std::sync::Arc;

use crate::capacity::{CapacityEnforcer, EnforcerSettings};
use crate::config::ServiceConfig;
use crate::driver::FlavorRegistry;
use crate::lifecycle::LifecycleService;
use crate::notify::{
    AuditSink, DELIVERY_TIMEOUT, HttpAuditSink, LogAuditSink, LogNotifier, Notifier,
    WebhookNotifier,
};
use crate::store::SqliteStore;
use crate::types::Actor;

/// Everything a command needs, built from the config file.
pub struct Context {
    pub config: ServiceConfig,
    pub lifecycle: Arc<LifecycleService>,
    pub actor: Actor,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl Context {
    /// Loads the config and opens the existing registry database.
    pub fn open(config_path: &Path, as_owner: Option<String>) -> anyhow::Result<Self> {
        let config = ServiceConfig::load(config_path)?;
        let db_path = config.db_path();

        if !db_path.exists() {
            anyhow::bail!(
                "Database not found at {}. Run 'tenantdb init' first.",
                db_path.display()
            );
        }

        let store = SqliteStore::new(&db_path)?;
        let registry = FlavorRegistry::from_config(&config);
        let audit: Arc<dyn AuditSink> = match &config.audit.url {
            Some(url) => Arc::new(HttpAuditSink::new(url.clone())),
            None => Arc::new(LogAuditSink),
        };

        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LogNotifier),
        };

        let lifecycle = LifecycleService::new(
            Arc::new(store),
            Arc::new(registry),
            Arc::clone(&audit),
            config.driver_timeout(),
        );

        let actor = match as_owner {
            Some(id) => Actor::Owner { id },
            None => Actor::Operator {
                id: std::env::var("USER").unwrap_or_else(|_| "operator".to_string()),
            },
        };

        Ok(Self {
            config,
            lifecycle: Arc::new(lifecycle),
            actor,
            notifier,
            audit,
        })
    }

    pub fn enforcer(&self) -> CapacityEnforcer {
        CapacityEnforcer::new(
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.notifier),
            EnforcerSettings::from_config(&self.config),
        )
    }

    /// Waits for notifications and audit entries still being delivered.
    pub async fn flush(&self) {
        tokio::join!(
            self.notifier.flush(DELIVERY_TIMEOUT),
            self.audit.flush(DELIVERY_TIMEOUT)
        );
    }
}
