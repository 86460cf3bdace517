//! Progressive loader: grace delay before the fallback, hard timeout after it
//!
//! Each instance runs a small state machine driven by two timers started at
//! mount:
//!
//! ```text
//! Hidden --(delay)--> VisibleFallback --(timeout)--> Failed(Timeout)
//!    \                      \
//!     `--(load settles)------`--> Succeeded | Failed(error)
//! ```
//!
//! A load that settles before the delay never shows the fallback.

use futures::future::Shared;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::loading::deferred::DeferredComponent;
use crate::loading::error::LoadError;
use crate::loading::fallback::{FallbackCatalog, FallbackKind};
use crate::loading::loader::LoadFuture;
use crate::loading::render::{RenderKind, Rendered};
use crate::loading::retry::{ReloadSignal, RetryAction, RetryPolicy};

pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Timing and placeholder configuration for a progressive loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressiveOptions {
    /// How long to show nothing before the fallback appears
    pub delay: Duration,
    /// How long a load may stay pending before it is failed
    pub timeout: Duration,
    pub fallback: FallbackKind,
}

impl Default for ProgressiveOptions {
    fn default() -> Self {
        Self {
            delay: DEFAULT_GRACE_DELAY,
            timeout: DEFAULT_TIMEOUT,
            fallback: FallbackKind::Default,
        }
    }
}

impl ProgressiveOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackKind) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Visible state of a progressive loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    /// Pending, inside the grace delay
    Hidden,
    /// Pending, fallback shown
    VisibleFallback,
    Succeeded,
    Failed(LoadError),
}

impl LoadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadPhase::Succeeded | LoadPhase::Failed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, LoadPhase::Failed(err) if err.is_timeout())
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadPhase::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// The view shape a host displays in this phase
    pub fn render_kind(&self) -> RenderKind {
        match self {
            LoadPhase::Hidden => RenderKind::Nothing,
            LoadPhase::VisibleFallback => RenderKind::Fallback,
            LoadPhase::Succeeded => RenderKind::Content,
            LoadPhase::Failed(_) => RenderKind::Error,
        }
    }
}

/// Inputs to the phase state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    GraceElapsed,
    TimeoutElapsed(Duration),
    Completed(Result<(), LoadError>),
}

/// Pure transition function. `None` means the event is ignored.
pub fn transition(phase: &LoadPhase, event: &PhaseEvent) -> Option<LoadPhase> {
    if phase.is_terminal() {
        return None;
    }

    match event {
        PhaseEvent::GraceElapsed => match phase {
            LoadPhase::Hidden => Some(LoadPhase::VisibleFallback),
            _ => None,
        },
        PhaseEvent::TimeoutElapsed(timeout) => Some(LoadPhase::Failed(LoadError::timeout(*timeout))),
        PhaseEvent::Completed(Ok(())) => Some(LoadPhase::Succeeded),
        PhaseEvent::Completed(Err(err)) => Some(LoadPhase::Failed(err.clone())),
    }
}

struct ProgressState {
    phase: LoadPhase,
    trace: Vec<RenderKind>,
    tasks: Vec<JoinHandle<()>>,
    mounted: bool,
    disposed: bool,
}

impl ProgressState {
    fn cancel_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct ProgressInner {
    id: Uuid,
    state: Mutex<ProgressState>,
    phase_tx: watch::Sender<LoadPhase>,
}

impl ProgressInner {
    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: PhaseEvent) -> bool {
        let mut state = self.state();
        if state.disposed {
            return false;
        }
        let Some(next) = transition(&state.phase, &event) else {
            return false;
        };

        debug!(loader = %self.id, from = ?state.phase, to = ?next, "Progressive loader transition");
        if next.is_timed_out() {
            warn!(loader = %self.id, "Component load timed out, showing error view");
        }

        state.phase = next.clone();
        state.trace.push(next.render_kind());
        if next.is_terminal() {
            state.cancel_tasks();
        }
        drop(state);

        self.phase_tx.send_replace(next);
        true
    }
}

/// Wraps a deferred component with grace-delay and timeout handling
pub struct ProgressiveLoader<T> {
    component: DeferredComponent<T>,
    options: ProgressiveOptions,
    catalog: Arc<FallbackCatalog>,
    reload: ReloadSignal,
    inner: Arc<ProgressInner>,
}

impl<T> ProgressiveLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        component: DeferredComponent<T>,
        options: ProgressiveOptions,
        catalog: Arc<FallbackCatalog>,
        reload: ReloadSignal,
    ) -> Self {
        let (phase_tx, _) = watch::channel(LoadPhase::Hidden);
        Self {
            component,
            options,
            catalog,
            reload,
            inner: Arc::new(ProgressInner {
                id: Uuid::new_v4(),
                state: Mutex::new(ProgressState {
                    phase: LoadPhase::Hidden,
                    trace: Vec::new(),
                    tasks: Vec::new(),
                    mounted: false,
                    disposed: false,
                }),
                phase_tx,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn options(&self) -> &ProgressiveOptions {
        &self.options
    }

    pub fn component(&self) -> &DeferredComponent<T> {
        &self.component
    }

    /// Start the load and both timers. Mounting twice is a no-op.
    ///
    /// The timers are tokio tasks: mounting outside a tokio runtime logs a
    /// warning and leaves the loader unmounted.
    pub fn mount(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(loader = %self.inner.id, "Cannot mount progressive loader outside a tokio runtime");
            return;
        };

        let mut state = self.inner.state();
        if state.mounted || state.disposed {
            return;
        }
        state.mounted = true;
        state.trace.push(RenderKind::Nothing);

        let load = self.component.start();
        let tasks = spawn_tasks(&runtime, &self.inner, load, &self.options);
        state.tasks.extend(tasks);
        debug!(
            loader = %self.inner.id,
            delay_ms = self.options.delay.as_millis() as u64,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "Progressive loader mounted"
        );
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.state().mounted
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.state().phase.clone()
    }

    /// Every distinct view this instance has exposed, in order
    pub fn trace(&self) -> Vec<RenderKind> {
        self.inner.state().trace.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Wait until the loader succeeds, fails, times out or is disposed.
    /// A loader that was never mounted returns its current phase at once.
    pub async fn settled(&self) -> LoadPhase {
        if !self.is_mounted() {
            return self.phase();
        }
        let mut phases = self.subscribe();
        let settled = match phases.wait_for(LoadPhase::is_terminal).await {
            Ok(phase) => Some((*phase).clone()),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| self.phase())
    }

    pub fn render(&self) -> Rendered<T> {
        let (phase, disposed) = {
            let state = self.inner.state();
            (state.phase.clone(), state.disposed)
        };
        if disposed {
            return Rendered::Nothing;
        }

        match phase {
            LoadPhase::Hidden => Rendered::Nothing,
            LoadPhase::VisibleFallback => {
                Rendered::Placeholder(self.catalog.placeholder(self.options.fallback))
            }
            LoadPhase::Succeeded => self.component.render(),
            LoadPhase::Failed(err) if err.is_timeout() => Rendered::Error(
                self.catalog
                    .error_view(&err, RetryAction::reload(self.reload.clone())),
            ),
            LoadPhase::Failed(err) => Rendered::Error(self.catalog.error_view(&err, self.retry_action())),
        }
    }

    /// Retry control for a failed load. Under [`RetryPolicy::RetryLoad`] it
    /// restarts the load and both timers on this same instance.
    pub fn retry_action(&self) -> RetryAction {
        match self.component.policy() {
            RetryPolicy::ReloadApplication => RetryAction::reload(self.reload.clone()),
            RetryPolicy::RetryLoad => {
                let inner: Weak<ProgressInner> = Arc::downgrade(&self.inner);
                let restart = self.component.restarter();
                let options = self.options;
                RetryAction::new("Try again", move || {
                    if let Some(inner) = inner.upgrade() {
                        remount(&inner, &restart, &options);
                    }
                })
            }
        }
    }

    /// Cancel both timers and abandon the load. Later events are ignored.
    pub fn dispose(&self) {
        let mut state = self.inner.state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.cancel_tasks();
        let settled = state.phase.is_terminal();
        if !settled {
            state.phase = LoadPhase::Failed(LoadError::Disposed);
        }
        drop(state);

        if !settled {
            self.inner
                .phase_tx
                .send_replace(LoadPhase::Failed(LoadError::Disposed));
        }
        self.component.dispose();
        debug!(loader = %self.inner.id, "Progressive loader disposed");
    }
}

fn spawn_tasks<T>(
    runtime: &Handle,
    inner: &Arc<ProgressInner>,
    load: Shared<LoadFuture<T>>,
    options: &ProgressiveOptions,
) -> [JoinHandle<()>; 3]
where
    T: Clone + Send + Sync + 'static,
{
    let delay = options.delay;
    let timeout = options.timeout;

    let grace_inner = Arc::clone(inner);
    let grace = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        grace_inner.apply(PhaseEvent::GraceElapsed);
    });

    let deadline_inner = Arc::clone(inner);
    let deadline = runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        deadline_inner.apply(PhaseEvent::TimeoutElapsed(timeout));
    });

    let watcher_inner = Arc::clone(inner);
    let watcher = runtime.spawn(async move {
        let result = load.await;
        watcher_inner.apply(PhaseEvent::Completed(result.map(|_| ())));
    });

    [grace, deadline, watcher]
}

/// Put a failed loader back to `Hidden` with a fresh load and fresh timers
fn remount<T, R>(inner: &Arc<ProgressInner>, restart: &R, options: &ProgressiveOptions)
where
    T: Clone + Send + Sync + 'static,
    R: Fn() -> Option<Shared<LoadFuture<T>>>,
{
    let Ok(runtime) = Handle::try_current() else {
        warn!(loader = %inner.id, "Cannot retry progressive loader outside a tokio runtime");
        return;
    };

    let mut state = inner.state();
    if state.disposed || !matches!(state.phase, LoadPhase::Failed(_)) {
        return;
    }
    let Some(load) = restart() else {
        return;
    };

    state.phase = LoadPhase::Hidden;
    state.trace.push(RenderKind::Nothing);
    state.cancel_tasks();
    let tasks = spawn_tasks(&runtime, inner, load, options);
    state.tasks.extend(tasks);
    drop(state);

    inner.phase_tx.send_replace(LoadPhase::Hidden);
    debug!(loader = %inner.id, "Progressive loader restarted after failure");
}

impl<T> Drop for ProgressiveLoader<T> {
    fn drop(&mut self) {
        let mut state = self.inner.state();
        state.disposed = true;
        state.cancel_tasks();
    }
}
