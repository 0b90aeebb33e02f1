use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::{AuditEntry, AuditSink, DELIVERY_TIMEOUT, Notification, Notifier};

/// JSON POSTs running on the current runtime, tracked so they can be drained.
#[derive(Clone)]
struct Deliveries {
    client: Client,
    url: String,
    tracker: TaskTracker,
}

impl Deliveries {
    fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("falling back to default http client: {e}");
                Client::new()
            });
        Self {
            client,
            url,
            tracker: TaskTracker::new(),
        }
    }

    fn post<B>(&self, body: B, what: &'static str)
    where
        B: Serialize + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            warn!("no async runtime, dropping {what} for {}", self.url);
            return;
        };

        let request = self.client.post(&self.url).json(&body);
        let url = self.url.clone();
        self.tracker.spawn_on(
            async move {
                match request.send().await.and_then(|r| r.error_for_status()) {
                    Ok(_) => debug!("delivered {what} to {url}"),
                    Err(e) => warn!("failed to deliver {what} to {url}: {e}"),
                }
            },
            &handle,
        );
    }

    async fn wait(&self, limit: Duration) {
        self.tracker.close();
        if tokio::time::timeout(limit, self.tracker.wait()).await.is_err() {
            warn!(
                "{} deliveries to {} still pending after {limit:?}",
                self.tracker.len(),
                self.url
            );
        }
        self.tracker.reopen();
    }
}

/// Delivers notifications to a mail relay or chat webhook as JSON.
#[derive(Clone)]
pub struct WebhookNotifier {
    deliveries: Deliveries,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            deliveries: Deliveries::new(url.into()),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn send(&self, notification: Notification) {
        self.deliveries.post(notification, "notification");
    }

    async fn flush(&self, limit: Duration) {
        self.deliveries.wait(limit).await;
    }
}

/// Ships audit entries to an external log collector.
#[derive(Clone)]
pub struct HttpAuditSink {
    deliveries: Deliveries,
}

impl HttpAuditSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            deliveries: Deliveries::new(url.into()),
        }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    fn append(&self, entry: AuditEntry) {
        self.deliveries.post(entry, "audit entry");
    }

    async fn flush(&self, limit: Duration) {
        self.deliveries.wait(limit).await;
    }
}
