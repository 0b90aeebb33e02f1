//! Periodic storage quota enforcement.
//!
//! A sweep measures every live tenant through its driver, then hands the
//! measurement to the lifecycle service, which decides and applies the
//! outcome under the tenant lock. Tenants are independent: one that cannot
//! be measured or fails to apply never stops the rest.

mod decision;
mod schedule;

pub use decision::{CapacityAction, decide};
pub use schedule::DailySchedule;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::driver::{StorageUsage, with_timeout};
use crate::error::Result;
use crate::lifecycle::{LifecycleService, StorageVerdict};
use crate::notify::{Notification, Notifier, SUBJECT_REVOKED, SUBJECT_WARNING};
use crate::types::TenantDatabase;

#[derive(Debug, Clone)]
pub struct EnforcerSettings {
    pub warning_ratio: f64,
    pub max_concurrency: usize,
    pub reconcile_grace: Duration,
    /// Operators copied on every notice, in addition to the owner.
    pub recipients: Vec<String>,
}

impl EnforcerSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            warning_ratio: config.capacity.warning_ratio,
            max_concurrency: config.capacity.max_concurrency.max(1),
            reconcile_grace: config.capacity.reconcile_grace(),
            recipients: config.notifications.recipients.clone(),
        }
    }
}

impl Default for EnforcerSettings {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub measured: usize,
    pub skipped: usize,
    pub warned: usize,
    pub breached: usize,
    pub cleared: usize,
    pub failed: usize,
}

impl SweepReport {
    fn count(&mut self, outcome: TenantOutcome) {
        match outcome {
            TenantOutcome::Skipped => self.skipped += 1,
            TenantOutcome::Failed => self.failed += 1,
            TenantOutcome::Applied(action) => {
                self.measured += 1;
                match action {
                    CapacityAction::RevokeAndNotify => self.breached += 1,
                    CapacityAction::Warn => self.warned += 1,
                    CapacityAction::ClearNotice => self.cleared += 1,
                    CapacityAction::None => {}
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TenantOutcome {
    Skipped,
    Failed,
    Applied(CapacityAction),
}

#[derive(Clone)]
pub struct CapacityEnforcer {
    lifecycle: Arc<LifecycleService>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<EnforcerSettings>,
}

impl CapacityEnforcer {
    pub fn new(
        lifecycle: Arc<LifecycleService>,
        notifier: Arc<dyn Notifier>,
        settings: EnforcerSettings,
    ) -> Self {
        Self {
            lifecycle,
            notifier,
            settings: Arc::new(settings),
        }
    }

    /// Sweeps on `schedule` until `shutdown` resolves. A failed sweep is
    /// logged and the loop waits for the next slot.
    pub async fn run<S>(&self, schedule: DailySchedule, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = chrono::Utc::now();
            info!("next capacity sweep at {}", schedule.next_run_after(now));

            tokio::select! {
                () = tokio::time::sleep(schedule.until_next(now)) => {
                    if let Err(e) = self.sweep().await {
                        error!("capacity sweep failed: {e}");
                    }
                }
                () = &mut shutdown => {
                    info!("capacity enforcer stopping");
                    break;
                }
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        match self
            .lifecycle
            .reconcile_pending(self.settings.reconcile_grace)
            .await
        {
            Ok(r) if r.confirmed + r.removed + r.failed > 0 => info!(
                "reconciled pending tenants: {} confirmed, {} removed, {} failed",
                r.confirmed, r.removed, r.failed
            ),
            Ok(_) => {}
            Err(e) => warn!("reconciliation of pending tenants failed: {e}"),
        }

        let tenants = self.lifecycle.store().list_live_tenants()?;
        info!("capacity sweep over {} tenants", tenants.len());

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));
        let mut tasks = JoinSet::new();

        for tenant in tenants {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let enforcer = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                enforcer.process(tenant).await
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.count(outcome),
                Err(e) => {
                    error!("capacity task aborted: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            measured = report.measured,
            skipped = report.skipped,
            warned = report.warned,
            breached = report.breached,
            cleared = report.cleared,
            failed = report.failed,
            "capacity sweep finished"
        );
        Ok(report)
    }

    async fn process(&self, tenant: TenantDatabase) -> TenantOutcome {
        let Some(descriptor) = self.lifecycle.registry().resolve(&tenant.flavor) else {
            warn!("skipping {}: unknown flavor {}", tenant.name, tenant.flavor);
            return TenantOutcome::Skipped;
        };
        let driver = Arc::clone(&descriptor.driver);

        let measured = with_timeout(
            self.lifecycle.driver_timeout(),
            driver.measure_size(&tenant.user, &tenant.password, &tenant.name),
        )
        .await;

        let used_kb = match measured {
            Ok(StorageUsage::Measured(kb)) => kb,
            Ok(StorageUsage::Unmeasurable) => {
                debug!("skipping {}: size cannot be measured", tenant.name);
                return TenantOutcome::Skipped;
            }
            Err(e) => {
                warn!("skipping {}: {e}", tenant.name);
                return TenantOutcome::Skipped;
            }
        };

        match self
            .lifecycle
            .apply_storage_verdict(&tenant.id, used_kb, self.settings.warning_ratio)
            .await
        {
            Ok(verdict) => {
                self.notify(&verdict);
                TenantOutcome::Applied(verdict.action)
            }
            Err(e) => {
                warn!("could not apply capacity verdict for {}: {e}", tenant.name);
                TenantOutcome::Failed
            }
        }
    }

    fn notify(&self, verdict: &StorageVerdict) {
        let subject = match verdict.action {
            CapacityAction::RevokeAndNotify => SUBJECT_REVOKED,
            CapacityAction::Warn => SUBJECT_WARNING,
            _ => return,
        };

        let tenant = &verdict.tenant;
        let recipients = tenant
            .owner_email
            .iter()
            .chain(self.settings.recipients.iter())
            .cloned()
            .collect();

        info!("sending {subject:?} for {}", tenant.name);
        self.notifier.send(Notification {
            subject: subject.to_string(),
            recipients,
            payload: serde_json::to_value(tenant).unwrap_or_default(),
        });
    }
}
