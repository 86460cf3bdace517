//! Retry actions surfaced through error views
//!
//! The default recovery for a failed component is to reload the whole
//! application. Hosts observe reload requests through a [`ReloadSignal`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

/// How an error view's retry control recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Restart the application, discarding in-memory state
    #[default]
    ReloadApplication,
    /// Re-invoke only the loader that failed
    RetryLoad,
}

/// Process-wide "reload requested" flag that the host loop waits on
#[derive(Clone, Default)]
pub struct ReloadSignal {
    inner: Arc<ReloadInner>,
}

#[derive(Default)]
struct ReloadInner {
    requests: AtomicU64,
    notify: Notify,
}

impl ReloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the host to reload the application
    pub fn request(&self) {
        let count = self.inner.requests.fetch_add(1, Ordering::SeqCst) + 1;
        info!(requests = count, "Application reload requested");
        self.inner.notify.notify_one();
    }

    /// Number of reloads requested so far
    pub fn requested_count(&self) -> u64 {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Wait until a reload is requested
    pub async fn wait(&self) {
        self.inner.notify.notified().await;
    }
}

impl fmt::Debug for ReloadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadSignal")
            .field("requests", &self.requested_count())
            .finish()
    }
}

/// Action bound to the retry control of an error view
#[derive(Clone)]
pub struct RetryAction {
    label: &'static str,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl RetryAction {
    pub fn new<F>(label: &'static str, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            label,
            action: Arc::new(action),
        }
    }

    /// Retry by reloading the application
    pub fn reload(signal: ReloadSignal) -> Self {
        Self::new("Reload", move || signal.request())
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn invoke(&self) {
        (self.action)();
    }
}

impl fmt::Debug for RetryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
