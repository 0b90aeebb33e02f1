//! Capacity sweep tests.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{Call, DRIVER_TIMEOUT, FakeSize, Harness, operator, owner, tenant_record};
use tenantdb::capacity::{CapacityEnforcer, EnforcerSettings};
use tenantdb::error::Error;
use tenantdb::notify::{SUBJECT_REVOKED, SUBJECT_WARNING};
use tenantdb::store::Store;
use tenantdb::types::StorageNotice;

#[tokio::test]
async fn test_warning_sent_once_per_episode() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    h.postgres.set_size(&tenant.name, FakeSize::Kb(800));
    let enforcer = h.enforcer();

    let report = enforcer.sweep().await.unwrap();
    assert_eq!(report.measured, 1);
    assert_eq!(report.warned, 1);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, SUBJECT_WARNING);
    assert_eq!(
        sent[0].recipients,
        vec!["owner@example.com".to_string(), "ops@example.com".to_string()]
    );

    let stored = h.reload(&tenant.id);
    assert_eq!(stored.storage_notice, StorageNotice::Warning);
    assert_eq!(stored.default_storage_kb, Some(800));
    assert!(!stored.write_revoked);

    enforcer.sweep().await.unwrap();
    assert_eq!(h.notifier.count(SUBJECT_WARNING), 1);
}

#[tokio::test]
async fn test_breach_revokes_and_notifies_every_sweep() {
    let h = Harness::new();
    let tenant = h.create_with_quota("mysql", Some(1000)).await;
    h.mysql.set_size(&tenant.name, FakeSize::Kb(1000));
    let enforcer = h.enforcer();

    let report = enforcer.sweep().await.unwrap();
    assert_eq!(report.breached, 1);

    let stored = h.reload(&tenant.id);
    assert!(stored.write_revoked);
    assert_eq!(stored.storage_notice, StorageNotice::Breach);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, SUBJECT_REVOKED);
    assert_eq!(sent[0].payload["name"], tenant.name.as_str());
    assert!(sent[0].payload.get("password").is_none());

    // Still over quota: revoked and reported again.
    let report = enforcer.sweep().await.unwrap();
    assert_eq!(report.breached, 1);
    assert_eq!(h.notifier.count(SUBJECT_REVOKED), 2);
    assert_eq!(
        h.mysql.count(|c| matches!(c, Call::RevokeWrite { .. })),
        2
    );

    // Coming down never restores writes on its own.
    h.mysql.set_size(&tenant.name, FakeSize::Kb(100));
    let report = enforcer.sweep().await.unwrap();
    assert_eq!(report.cleared, 1);

    let stored = h.reload(&tenant.id);
    assert!(stored.write_revoked);
    assert_eq!(stored.storage_notice, StorageNotice::None);
    assert_eq!(
        h.mysql.count(|c| matches!(c, Call::GrantWrite { .. })),
        0
    );
}

#[tokio::test]
async fn test_new_episode_warns_again() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    let enforcer = h.enforcer();

    h.postgres.set_size(&tenant.name, FakeSize::Kb(750));
    enforcer.sweep().await.unwrap();
    h.postgres.set_size(&tenant.name, FakeSize::Kb(100));
    enforcer.sweep().await.unwrap();
    h.postgres.set_size(&tenant.name, FakeSize::Kb(900));
    enforcer.sweep().await.unwrap();

    assert_eq!(h.notifier.count(SUBJECT_WARNING), 2);
}

#[tokio::test]
async fn test_below_ratio_changes_nothing_but_usage() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    h.postgres.set_size(&tenant.name, FakeSize::Kb(10));

    let report = h.enforcer().sweep().await.unwrap();
    assert_eq!(report.measured, 1);
    assert_eq!(report.warned + report.breached + report.cleared, 0);
    assert!(h.notifier.sent().is_empty());

    let stored = h.reload(&tenant.id);
    assert_eq!(stored.default_storage_kb, Some(10));
    assert_eq!(stored.storage_notice, StorageNotice::None);
}

#[tokio::test]
async fn test_restore_after_breach_is_manual() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    h.postgres.set_size(&tenant.name, FakeSize::Kb(1200));
    h.enforcer().sweep().await.unwrap();

    let err = h
        .lifecycle
        .restore_write(&tenant.id, &owner())
        .await
        .unwrap_err();
    assert!(err.rejection().is_some());

    let restored = h
        .lifecycle
        .restore_write(&tenant.id, &operator())
        .await
        .unwrap();
    assert!(!restored.write_revoked);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_continues_past_failing_tenants() {
    let h = Harness::new();
    let unmeasurable = h.create("mysql").await;
    let broken = h.create("postgres").await;
    let stuck = h.create("postgres").await;
    let healthy = h.create_with_quota("postgres", Some(1000)).await;

    h.mysql.set_size(&unmeasurable.name, FakeSize::Unmeasurable);
    h.postgres.set_size(&broken.name, FakeSize::Error);
    h.postgres.set_size(&stuck.name, FakeSize::Hang);
    h.postgres.set_size(&healthy.name, FakeSize::Kb(1000));

    let report = h.enforcer().sweep().await.unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.measured, 1);
    assert_eq!(report.breached, 1);
    assert!(h.reload(&healthy.id).write_revoked);
    assert_eq!(h.reload(&stuck.id).default_storage_kb, None);
}

#[tokio::test]
async fn test_deleted_tenants_are_not_measured() {
    let h = Harness::new();
    let tenant = h.create("postgres").await;
    h.lifecycle.delete(&tenant.id, &owner()).await.unwrap();

    let report = h.enforcer().sweep().await.unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(
        h.postgres.count(|c| matches!(c, Call::MeasureSize { .. })),
        0
    );
}

#[tokio::test]
async fn test_sweep_reconciles_pending_records() {
    let h = Harness::new();
    let stale = tenant_record("postgres", false, Utc::now() - chrono::Duration::minutes(5));
    h.store.create_tenant(&stale).unwrap();

    let enforcer = CapacityEnforcer::new(
        h.lifecycle.clone(),
        h.notifier.clone(),
        EnforcerSettings {
            reconcile_grace: Duration::ZERO,
            ..EnforcerSettings::default()
        },
    );
    let report = enforcer.sweep().await.unwrap();

    assert_eq!(report.measured, 0);
    assert!(h.store.get_tenant(&stale.id).unwrap().is_none());
    assert!(h.postgres.calls().contains(&Call::DatabaseExists {
        name: stale.name.clone(),
    }));
}

#[tokio::test]
async fn test_breach_on_unreachable_endpoint_changes_nothing() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    h.postgres.set_size(&tenant.name, FakeSize::Kb(1500));
    h.postgres.set_reachable(false);

    let report = h.enforcer().sweep().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.breached, 0);
    assert_eq!(
        h.postgres.count(|c| matches!(c, Call::RevokeWrite { .. })),
        0
    );
    assert!(h.notifier.sent().is_empty());

    let stored = h.reload(&tenant.id);
    assert!(!stored.write_revoked);
    assert_eq!(stored.storage_notice, StorageNotice::None);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_waits_for_running_lifecycle_operation() {
    let h = Harness::new();
    let tenant = h.create_with_quota("postgres", Some(1000)).await;
    h.postgres.set_size(&tenant.name, FakeSize::Kb(1000));
    h.postgres.hang("disable_login");

    let lifecycle = h.lifecycle.clone();
    let id = tenant.id.clone();
    let disabling = tokio::spawn(async move { lifecycle.user_disable(&id, &owner()).await });
    while h.postgres.count(|c| matches!(c, Call::DisableLogin { .. })) == 0 {
        tokio::task::yield_now().await;
    }

    // The disable holds the tenant until its driver call times out.
    let started = tokio::time::Instant::now();
    let report = h.enforcer().sweep().await.unwrap();
    assert!(started.elapsed() >= DRIVER_TIMEOUT);
    assert_eq!(report.breached, 1);

    let err = disabling.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    let stored = h.reload(&tenant.id);
    assert!(stored.write_revoked);
    assert!(stored.state().login_enabled());
}
