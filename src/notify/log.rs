use tracing::info;

use super::{AuditEntry, AuditSink, Notification, Notifier};

/// Writes notifications to the tracing log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: Notification) {
        info!(
            subject = %notification.subject,
            recipients = ?notification.recipients,
            "notification: {}",
            notification.payload
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn append(&self, entry: AuditEntry) {
        info!(
            target: "tenantdb::audit",
            operation = %entry.operation,
            status = ?entry.status,
            actor = %entry.actor_id,
            "{}",
            entry.description
        );
    }
}
