mod service;

pub use service::{AdminEndpoint, AuditConfig, CapacityConfig, NotificationConfig, ServiceConfig};
