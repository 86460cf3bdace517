//! Deferred component wrapper
//!
//! Wraps a module loader so that:
//! - the loader runs at most once per instance, however often it is rendered
//! - a pending load renders the selected fallback placeholder
//! - a failed load renders an error view instead of propagating

use futures::future::{FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::loading::error::{LoadError, LoadResult};
use crate::loading::fallback::{ErrorView, FallbackCatalog, FallbackKind};
use crate::loading::loader::{LoadFuture, ModuleLoader, SharedLoader};
use crate::loading::render::Rendered;
use crate::loading::retry::{ReloadSignal, RetryAction, RetryPolicy};

/// Observable load status of a deferred component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotStarted,
    Pending,
    Ready,
    Failed,
}

enum Slot<T> {
    NotStarted,
    Started {
        load: Shared<LoadFuture<T>>,
        driver: Option<JoinHandle<()>>,
    },
}

struct DeferredInner<T> {
    id: Uuid,
    loader: SharedLoader<T>,
    fallback: FallbackKind,
    catalog: Arc<FallbackCatalog>,
    policy: RetryPolicy,
    reload: ReloadSignal,
    slot: Mutex<Slot<T>>,
    disposed: AtomicBool,
}

impl<T> DeferredInner<T> {
    fn slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the memoized load so the next render invokes the loader again
    fn reset(&self) {
        let mut slot = self.slot();
        if let Slot::Started {
            driver: Some(driver),
            ..
        } = &*slot
        {
            driver.abort();
        }
        *slot = Slot::NotStarted;
        debug!(component = %self.id, "Deferred component reset for retry");
    }
}

impl<T> DeferredInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn start(&self) -> Shared<LoadFuture<T>> {
        let mut slot = self.slot();
        if let Slot::Started { load, .. } = &*slot {
            return load.clone();
        }

        let loader = Arc::clone(&self.loader);
        let id = self.id;
        let fallback = self.fallback;
        let load: LoadFuture<T> = Box::pin(async move {
            let result = loader.load().await;
            if let Err(err) = &result {
                error!(component = %id, fallback = %fallback, error = %err, "Component failed to load");
            }
            result
        });
        let load = load.shared();

        *slot = Slot::Started {
            load: load.clone(),
            driver: None,
        };
        load
    }
}

/// Renderable wrapper around a lazily invoked module loader
pub struct DeferredComponent<T> {
    inner: Arc<DeferredInner<T>>,
}

impl<T> DeferredComponent<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        loader: SharedLoader<T>,
        fallback: FallbackKind,
        catalog: Arc<FallbackCatalog>,
        policy: RetryPolicy,
        reload: ReloadSignal,
    ) -> Self {
        Self {
            inner: Arc::new(DeferredInner {
                id: Uuid::new_v4(),
                loader,
                fallback,
                catalog,
                policy,
                reload,
                slot: Mutex::new(Slot::NotStarted),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Wrap a loader with the default catalog and the reload retry policy.
    /// Unknown fallback keys use the default placeholder.
    pub fn wrap<L>(loader: L, fallback_key: &str, reload: ReloadSignal) -> Self
    where
        L: ModuleLoader<T> + 'static,
    {
        Self::new(
            Arc::new(loader),
            FallbackKind::from_key(fallback_key),
            Arc::new(FallbackCatalog::default()),
            RetryPolicy::ReloadApplication,
            reload,
        )
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn fallback(&self) -> FallbackKind {
        self.inner.fallback
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Start the load if needed and return the shared in-flight future
    pub(crate) fn start(&self) -> Shared<LoadFuture<T>> {
        self.inner.start()
    }

    /// Handle that drops the memoized load and starts a fresh one.
    /// Returns `None` once the component is gone or disposed.
    pub(crate) fn restarter(&self) -> impl Fn() -> Option<Shared<LoadFuture<T>>> + Send + Sync + 'static {
        let inner: Weak<DeferredInner<T>> = Arc::downgrade(&self.inner);
        move || {
            let inner = inner.upgrade()?;
            if inner.disposed.load(Ordering::SeqCst) {
                return None;
            }
            inner.reset();
            Some(inner.start())
        }
    }

    /// Make sure someone polls the load even if nobody awaits it
    fn drive(&self) -> Shared<LoadFuture<T>> {
        let load = self.start();
        let mut slot = self.inner.slot();
        if let Slot::Started { driver, .. } = &mut *slot {
            if driver.is_none() {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let pending = load.clone();
                    *driver = Some(runtime.spawn(async move {
                        let _ = pending.await;
                    }));
                }
            }
        }
        load
    }

    /// Current view: placeholder while pending, content or error view once settled
    pub fn render(&self) -> Rendered<T> {
        if self.is_disposed() {
            return Rendered::Nothing;
        }

        match self.drive().peek() {
            None => Rendered::Placeholder(self.inner.catalog.placeholder(self.inner.fallback)),
            Some(Ok(content)) => Rendered::Content(content.clone()),
            Some(Err(err)) => Rendered::Error(self.error_view(err)),
        }
    }

    /// Wait for the load and return its raw result
    pub async fn outcome(&self) -> LoadResult<T> {
        if self.is_disposed() {
            return Err(LoadError::Disposed);
        }
        self.start().await
    }

    /// Wait for the load and return the settled view
    pub async fn resolve(&self) -> Rendered<T> {
        match self.outcome().await {
            Ok(content) => Rendered::Content(content),
            Err(err) => Rendered::Error(self.error_view(&err)),
        }
    }

    pub fn status(&self) -> LoadStatus {
        match &*self.inner.slot() {
            Slot::NotStarted => LoadStatus::NotStarted,
            Slot::Started { load, .. } => match load.peek() {
                None => LoadStatus::Pending,
                Some(Ok(_)) => LoadStatus::Ready,
                Some(Err(_)) => LoadStatus::Failed,
            },
        }
    }

    /// Error view for a failure, carrying this component's retry action
    pub fn error_view(&self, err: &LoadError) -> ErrorView {
        self.inner.catalog.error_view(err, self.retry_action())
    }

    pub fn retry_action(&self) -> RetryAction {
        match self.inner.policy {
            RetryPolicy::ReloadApplication => RetryAction::reload(self.inner.reload.clone()),
            RetryPolicy::RetryLoad => {
                let inner: Weak<DeferredInner<T>> = Arc::downgrade(&self.inner);
                RetryAction::new("Try again", move || {
                    if let Some(inner) = inner.upgrade() {
                        inner.reset();
                    }
                })
            }
        }
    }

    /// Release the instance; an in-flight load is abandoned and its result discarded
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Slot::Started {
            driver: Some(driver),
            ..
        } = &*self.inner.slot()
        {
            driver.abort();
        }
        debug!(component = %self.inner.id, "Deferred component disposed");
    }
}

impl<T> Drop for DeferredComponent<T> {
    fn drop(&mut self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        if let Slot::Started {
            driver: Some(driver),
            ..
        } = &*self.inner.slot()
        {
            driver.abort();
        }
    }
}
