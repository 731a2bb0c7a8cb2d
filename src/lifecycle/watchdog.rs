//! Startup safety watchdog.
//!
//! An instance without an administrator account can be taken over by
//! whoever reaches the setup endpoint first. The watchdog bounds that window:
//! once armed, it waits for its deadline, asks the user store whether an
//! administrator exists, and terminates the process if not.
//!
//! # State Transitions
//! ```text
//! Disarmed → Armed: start()
//! Armed → Armed: start() (no-op)
//! Armed → Disarmed: stop(), shutdown scope triggered
//! Armed → Disarmed: deadline elapsed, administrator present
//! Armed → Terminal: deadline elapsed, administrator absent → terminate hook
//! ```
//!
//! # Design Decisions
//! - One check at the deadline, no polling before it
//! - A store that errors, hangs past the deadline, or is missing counts as
//!   "not initialized": the fatal outcome must not depend on store health
//! - The decision to fire is taken under the same lock `stop()` uses, so a
//!   returned `stop()` can never be followed by the hook for that activation
//! - The termination hook is injected per instance, not held in global state

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{StoreError, UserStore};

/// Called with a diagnostic message when the deadline passes uninitialized.
///
/// Runs after the armed period has been cleared and the lock released, so
/// it may call back into the watchdog and a panicking hook leaves it usable.
pub type TerminateHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The default hook: log the message and exit with status 1.
pub fn exit_process() -> TerminateHook {
    Arc::new(|message: &str| {
        tracing::error!(reason = %message, "Fatal startup condition, exiting");
        std::process::exit(1);
    })
}

/// Why the deadline check could not confirm an administrator.
#[derive(Debug, Error)]
enum CheckError {
    #[error("no user store configured")]
    NoStore,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("user store query panicked")]
    Panicked,

    #[error("user store query did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Cancellation handle for one armed period.
struct Activation {
    id: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct WatchdogState {
    next_id: u64,
    active: Option<Activation>,
}

/// Terminates the process if no administrator account exists by a deadline.
pub struct AdminWatchdog {
    deadline: Duration,
    users: Option<Arc<dyn UserStore>>,
    scope: Option<Shutdown>,
    terminate: TerminateHook,
    state: Arc<Mutex<WatchdogState>>,
}

impl AdminWatchdog {
    /// Create a disarmed watchdog.
    ///
    /// `scope` is the outer lifecycle: triggering it stops every armed
    /// period without firing. Without `users`, an expiry is always fatal.
    pub fn new(
        deadline: Duration,
        users: Option<Arc<dyn UserStore>>,
        scope: Option<Shutdown>,
    ) -> Self {
        Self {
            deadline,
            users,
            scope,
            terminate: exit_process(),
            state: Arc::new(Mutex::new(WatchdogState::default())),
        }
    }

    /// Replace the termination hook.
    pub fn with_terminate(mut self, hook: TerminateHook) -> Self {
        self.terminate = hook;
        self
    }

    /// How long an armed period waits before checking the store.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Whether a timer is currently counting down.
    pub fn is_armed(&self) -> bool {
        self.state
            .lock()
            .expect("admin watchdog mutex poisoned")
            .active
            .is_some()
    }

    /// Arm the watchdog. Does nothing if already armed.
    ///
    /// Must be called from within a Tokio runtime; otherwise the failure is
    /// logged and the watchdog stays disarmed.
    pub fn start(&self) {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Admin watchdog cannot start outside a Tokio runtime");
                return;
            }
        };

        let mut state = self.state.lock().expect("admin watchdog mutex poisoned");
        if state.active.is_some() {
            tracing::debug!("Admin watchdog already armed");
            return;
        }

        let id = state.next_id;
        state.next_id += 1;

        let (cancel, cancelled) = oneshot::channel();
        state.active = Some(Activation { id, cancel });

        let period = ArmedPeriod {
            id,
            deadline: self.deadline,
            users: self.users.clone(),
            scope: self.scope.clone(),
            terminate: self.terminate.clone(),
            state: self.state.clone(),
        };
        runtime.spawn(period.run(cancelled));

        metrics::record_watchdog_armed(true);
        tracing::info!(deadline = ?self.deadline, activation = id, "Admin watchdog armed");
    }

    /// Disarm the watchdog. Does nothing if not armed.
    ///
    /// Does not wait for the background task; once this returns the hook
    /// will not fire for the cancelled period.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("admin watchdog mutex poisoned");
        if let Some(activation) = state.active.take() {
            // The task may already be past its select; it re-checks under the lock.
            let _ = activation.cancel.send(());
            metrics::record_watchdog_armed(false);
            tracing::info!(activation = activation.id, "Admin watchdog disarmed");
        }
    }
}

impl fmt::Debug for AdminWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminWatchdog")
            .field("deadline", &self.deadline)
            .field("has_store", &self.users.is_some())
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Everything the background task of one armed period owns.
struct ArmedPeriod {
    id: u64,
    deadline: Duration,
    users: Option<Arc<dyn UserStore>>,
    scope: Option<Shutdown>,
    terminate: TerminateHook,
    state: Arc<Mutex<WatchdogState>>,
}

impl ArmedPeriod {
    async fn run(self, mut cancelled: oneshot::Receiver<()>) {
        let outer = async {
            match &self.scope {
                Some(scope) => scope.wait().await,
                None => std::future::pending::<()>().await,
            }
        };

        // Cancellation wins over a deadline that elapses in the same poll.
        tokio::select! {
            biased;
            _ = &mut cancelled => {
                tracing::debug!(activation = self.id, "Admin watchdog stopped before deadline");
                return;
            }
            _ = outer => {
                tracing::info!(activation = self.id, "Admin watchdog cancelled by shutdown");
                self.release();
                return;
            }
            _ = tokio::time::sleep(self.deadline) => {}
        }

        let checked = self.check_initialized().await;

        let mut state = self.state.lock().expect("admin watchdog mutex poisoned");
        if !state.active.as_ref().is_some_and(|a| a.id == self.id) {
            tracing::debug!(activation = self.id, "Admin watchdog stopped during deadline check");
            return;
        }
        state.active = None;
        // The period is settled; a stop() from here on is a no-op.
        drop(state);
        metrics::record_watchdog_armed(false);

        match checked {
            Ok(true) => {
                metrics::record_watchdog_expiration("initialized");
                tracing::info!(activation = self.id, "Administrator account present, admin watchdog satisfied");
            }
            Ok(false) => {
                metrics::record_watchdog_expiration("uninitialized");
                (self.terminate)(&self.fatal_message());
            }
            Err(e) => {
                metrics::record_watchdog_expiration("store_error");
                tracing::warn!(
                    activation = self.id,
                    error = %e,
                    "Could not confirm an administrator account exists, treating instance as uninitialized"
                );
                (self.terminate)(&self.fatal_message());
            }
        }
    }

    /// Ask the store once, bounded by the deadline budget.
    async fn check_initialized(&self) -> Result<bool, CheckError> {
        let users = self.users.clone().ok_or(CheckError::NoStore)?;
        let query = tokio::task::spawn_blocking(move || users.has_administrator());

        match tokio::time::timeout(self.deadline, query).await {
            Ok(Ok(answer)) => Ok(answer?),
            Ok(Err(_)) => Err(CheckError::Panicked),
            Err(_) => Err(CheckError::TimedOut(self.deadline)),
        }
    }

    /// Clear the handle if it still belongs to this period.
    fn release(&self) {
        let mut state = self.state.lock().expect("admin watchdog mutex poisoned");
        if state.active.as_ref().is_some_and(|a| a.id == self.id) {
            state.active = None;
            metrics::record_watchdog_armed(false);
        }
    }

    fn fatal_message(&self) -> String {
        format!(
            "no administrator account was created within {:?}, shutting down for security reasons",
            self.deadline
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// A store with a fixed answer that counts its queries.
    struct FixedStore {
        answer: Option<bool>,
        queries: AtomicUsize,
    }

    impl FixedStore {
        fn new(answer: Option<bool>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                queries: AtomicUsize::new(0),
            })
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    impl UserStore for FixedStore {
        fn has_administrator(&self) -> Result<bool, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.answer
                .ok_or_else(|| StoreError::Unavailable("database offline".into()))
        }
    }

    struct Recorder {
        calls: Arc<AtomicUsize>,
        fired: Arc<Notify>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                fired: Arc::new(Notify::new()),
            }
        }

        fn hook(&self) -> TerminateHook {
            let calls = self.calls.clone();
            let fired = self.fired.clone();
            Arc::new(move |_message: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                fired.notify_one();
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn wait_fired(&self) {
            tokio::time::timeout(Duration::from_secs(2), self.fired.notified())
                .await
                .expect("termination hook should have fired");
        }
    }

    fn with_store(deadline: Duration, store: &Arc<FixedStore>, recorder: &Recorder) -> AdminWatchdog {
        let users: Arc<dyn UserStore> = store.clone();
        AdminWatchdog::new(deadline, Some(users), Some(Shutdown::new()))
            .with_terminate(recorder.hook())
    }

    async fn wait_disarmed(watchdog: &AdminWatchdog) {
        for _ in 0..200 {
            if !watchdog.is_armed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("watchdog still armed");
    }

    #[test]
    fn test_stop_without_starting() {
        let watchdog = AdminWatchdog::new(Duration::from_secs(60), None, None);
        watchdog.stop();
        assert!(!watchdog.is_armed());
    }

    #[test]
    fn test_stop_can_be_called_multiple_times() {
        let watchdog = AdminWatchdog::new(Duration::from_secs(60), None, None);
        watchdog.stop();
        watchdog.stop();
        assert!(!watchdog.is_armed());
    }

    #[test]
    fn test_start_outside_runtime_stays_disarmed() {
        let watchdog = AdminWatchdog::new(Duration::from_secs(60), None, None);
        watchdog.start();
        assert!(!watchdog.is_armed());
    }

    #[tokio::test]
    async fn test_can_stop_started_watchdog() {
        let watchdog = AdminWatchdog::new(Duration::from_secs(60), None, Some(Shutdown::new()));

        watchdog.start();
        assert!(watchdog.is_armed(), "started watchdog should hold a cancellation handle");

        watchdog.stop();
        assert!(!watchdog.is_armed(), "stopped watchdog should not hold a cancellation handle");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_and_stop_concurrently() {
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let watchdog = Arc::new(with_store(Duration::from_secs(60), &store, &recorder));

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let watchdog = watchdog.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    if (worker + i) % 2 == 0 {
                        watchdog.start();
                    } else {
                        watchdog.stop();
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        watchdog.start();
        assert!(watchdog.is_armed());
        watchdog.stop();
        assert!(!watchdog.is_armed());

        assert_eq!(recorder.calls(), 0);
        assert_eq!(store.queries(), 0);
    }

    #[tokio::test]
    async fn test_terminates_after_deadline_when_uninitialized() {
        let deadline = Duration::from_millis(10);
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        tokio::time::sleep(deadline * 2).await;
        recorder.wait_fired().await;

        assert_eq!(recorder.calls(), 1);
        assert_eq!(store.queries(), 1);
        assert!(!watchdog.is_armed());
    }

    #[tokio::test]
    async fn test_satisfied_when_administrator_exists() {
        let deadline = Duration::from_millis(10);
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(true));
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        tokio::time::sleep(deadline * 2).await;
        wait_disarmed(&watchdog).await;

        assert_eq!(recorder.calls(), 0);
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let deadline = Duration::from_millis(10);
        let recorder = Recorder::new();
        let store = FixedStore::new(None);
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        recorder.wait_fired().await;

        assert_eq!(recorder.calls(), 1);
        assert!(!watchdog.is_armed());
    }

    #[tokio::test]
    async fn test_panicking_hook_leaves_watchdog_usable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook: TerminateHook = {
            let calls = calls.clone();
            Arc::new(move |_message: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                panic!("termination hook failed");
            })
        };
        let watchdog = AdminWatchdog::new(Duration::from_millis(5), None, None).with_terminate(hook);

        watchdog.start();
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stopped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| watchdog.stop()));
        assert!(stopped.is_ok(), "stop() must not panic after a failed hook");
        assert!(!watchdog.is_armed());
        assert!(format!("{watchdog:?}").contains("armed: false"));

        watchdog.start();
        assert!(watchdog.is_armed());
        watchdog.stop();
    }

    #[tokio::test]
    async fn test_deadline_accessor() {
        let watchdog = AdminWatchdog::new(Duration::from_secs(90), None, None);
        assert_eq!(watchdog.deadline(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_at_deadline_skips_store_query() {
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let deadline = Duration::from_secs(10);
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        tokio::task::yield_now().await;
        // Both the cancellation and the elapsed timer are ready at the next poll.
        watchdog.stop();
        tokio::time::advance(deadline).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.queries(), 0);
        assert_eq!(recorder.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_store_is_fatal() {
        let recorder = Recorder::new();
        let watchdog = AdminWatchdog::new(Duration::from_millis(10), None, None)
            .with_terminate(recorder.hook());

        watchdog.start();
        recorder.wait_fired().await;
        assert_eq!(recorder.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_deadline_never_fires() {
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let watchdog = with_store(Duration::from_secs(3600), &store, &recorder);

        watchdog.start();
        tokio::time::sleep(Duration::from_millis(1)).await;
        watchdog.stop();

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(recorder.calls(), 0);
        assert_eq!(store.queries(), 0);
        assert!(!watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_scope_cancels_without_firing() {
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let shutdown = Shutdown::new();
        let users: Arc<dyn UserStore> = store.clone();
        let watchdog = AdminWatchdog::new(Duration::from_secs(3600), Some(users), Some(shutdown.clone()))
            .with_terminate(recorder.hook());

        watchdog.start();
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(recorder.calls(), 0);
        assert_eq!(store.queries(), 0);
    }

    #[tokio::test]
    async fn test_restart_while_armed_fires_once() {
        let deadline = Duration::from_millis(10);
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(false));
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        watchdog.start();
        recorder.wait_fired().await;
        tokio::time::sleep(deadline * 5).await;

        assert_eq!(recorder.calls(), 1);
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test]
    async fn test_can_rearm_after_satisfied_expiry() {
        let deadline = Duration::from_millis(10);
        let recorder = Recorder::new();
        let store = FixedStore::new(Some(true));
        let watchdog = with_store(deadline, &store, &recorder);

        watchdog.start();
        wait_disarmed(&watchdog).await;

        watchdog.start();
        assert!(watchdog.is_armed());
        wait_disarmed(&watchdog).await;

        assert_eq!(store.queries(), 2);
        assert_eq!(recorder.calls(), 0);
    }
}
