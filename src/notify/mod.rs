//! Outbound collaborators: owner/operator notifications and the audit trail.
//!
//! Both are fire-and-forget. Implementations never block the caller and never
//! surface delivery failures; they log them instead. Deliveries still in
//! flight can be awaited with `flush` before the runtime shuts down.

mod http;
mod log;

pub use http::{HttpAuditSink, WebhookNotifier};
pub use log::{LogAuditSink, LogNotifier};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Actor;

/// Subject of the notification sent when write access is revoked.
pub const SUBJECT_REVOKED: &str = "Database Revoked";
/// Subject of the notification sent when usage crosses the warning ratio.
pub const SUBJECT_WARNING: &str = "Warning: Database Storage Almost Full";

/// Upper bound for a single outbound delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub recipients: Vec<String>,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification);

    /// Waits up to `limit` for deliveries that are still in flight.
    async fn flush(&self, _limit: Duration) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub operation: String,
    pub status: AuditStatus,
    pub actor_id: String,
    pub model: &'static str,
    pub description: String,
    pub creation_date: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        operation: &str,
        status: AuditStatus,
        actor: &Actor,
        description: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.to_string(),
            status,
            actor_id: actor.id().to_string(),
            model: "Database",
            description: description.into(),
            creation_date: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry);

    /// Waits up to `limit` for entries that are still being shipped.
    async fn flush(&self, _limit: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_serializes_flat() {
        let entry = AuditEntry::new(
            "admin_disable",
            AuditStatus::Success,
            &Actor::Operator {
                id: "op-1".to_string(),
            },
            "Database db1 disabled by an administrator",
        );
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["operation"], "admin_disable");
        assert_eq!(json["status"], "Success");
        assert_eq!(json["actor_id"], "op-1");
        assert_eq!(json["model"], "Database");
        assert!(json["creation_date"].is_string());
    }

    #[test]
    fn test_system_actor_id() {
        let entry = AuditEntry::new("capacity", AuditStatus::Failed, &Actor::System, "x");
        assert_eq!(entry.actor_id, "system");
    }
}
