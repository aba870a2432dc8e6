//! Shared lifecycle, bounded execution, and resource ownership.
//!
//! [`BoundedContext`] is the leaf capability every runtime component owns by
//! composition: a lifecycle state machine with an explicit transition table,
//! deduplicated initialization, dispose-wins semantics, tracked resource
//! teardown, and a bounded executor layering timeout, retry, and
//! cancellation over an operation.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tywrap_core::error::{classify_error, BridgeError, BridgeResult};

/// Lifecycle states. `Disposed` is terminal; there is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Initializing,
    Ready,
    Disposing,
    Disposed,
}

impl LifecycleState {
    /// The transition table: the single source of operational truth.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::{Disposed, Disposing, Idle, Initializing, Ready};
        matches!(
            (self, to),
            (Idle, Initializing)
                | (Initializing, Ready)
                // Failed init resets so a later attempt can retry.
                | (Initializing, Idle)
                | (Idle | Initializing | Ready, Disposing)
                | (Disposing, Disposed)
        )
    }

    pub fn is_disposed_like(self) -> bool {
        matches!(self, LifecycleState::Disposing | LifecycleState::Disposed)
    }
}

/// A disposable owned by a context, torn down in reverse insertion order.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    fn resource_name(&self) -> &str {
        "resource"
    }

    async fn dispose(&self) -> anyhow::Result<()>;
}

/// Options for [`BoundedContext::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// `None` or zero disables the timer; cancellation still works.
    pub timeout: Option<Duration>,
    /// Extra attempts after the first, spent only on timeout or
    /// transient-looking failures.
    pub retries: u32,
    /// Initial backoff; doubles each retry.
    pub retry_delay: Duration,
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    fn armed_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

pub struct BoundedContext {
    name: String,
    state: Mutex<LifecycleState>,
    changed: Notify,
    dispose_requested: AtomicBool,
    resources: Mutex<Vec<Arc<dyn ManagedResource>>>,
}

enum InitClaim {
    AlreadyReady,
    Claimed,
    InFlight,
    Dead,
}

impl BoundedContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LifecycleState::Idle),
            changed: Notify::new(),
            dispose_requested: AtomicBool::new(false),
            resources: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    pub fn is_disposed_like(&self) -> bool {
        self.state().is_disposed_like()
    }

    fn set_state(&self, to: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(state.can_transition(to), "{:?} -> {to:?}", *state);
        *state = to;
        drop(state);
        self.changed.notify_waiters();
    }

    pub fn track_resource(&self, resource: Arc<dyn ManagedResource>) {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(resource);
    }

    pub fn untrack_resource(&self, resource: &Arc<dyn ManagedResource>) {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tracked| !Arc::ptr_eq(tracked, resource));
    }

    fn disposed_error(&self) -> BridgeError {
        BridgeError::disposed(format!("{} has been disposed", self.name))
    }

    /// Brings the context to `Ready`, running `do_init` at most once across
    /// concurrent callers. Idempotent when already ready; a failed attempt
    /// resets to `Idle` so a later call can retry; rejects when disposal has
    /// started.
    pub async fn init<F, Fut>(&self, do_init: F) -> BridgeResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut do_init = Some(do_init);
        loop {
            let waiter = self.changed.notified();
            let claim = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match *state {
                    LifecycleState::Ready => InitClaim::AlreadyReady,
                    LifecycleState::Disposing | LifecycleState::Disposed => InitClaim::Dead,
                    LifecycleState::Initializing => InitClaim::InFlight,
                    LifecycleState::Idle => {
                        *state = LifecycleState::Initializing;
                        InitClaim::Claimed
                    }
                }
            };
            match claim {
                InitClaim::AlreadyReady => return Ok(()),
                InitClaim::Dead => return Err(self.disposed_error()),
                InitClaim::InFlight => {
                    // Another caller owns the attempt; wait for any state
                    // change and re-evaluate.
                    waiter.await;
                }
                InitClaim::Claimed => {
                    let Some(do_init) = do_init.take() else {
                        return Err(self.disposed_error());
                    };
                    let result = do_init().await;
                    // Disposal observed mid-init wins regardless of the
                    // init outcome.
                    if self.dispose_requested.load(Ordering::SeqCst) {
                        self.changed.notify_waiters();
                        return Err(self.disposed_error());
                    }
                    return match result {
                        Ok(()) => {
                            self.set_state(LifecycleState::Ready);
                            debug!(context = %self.name, "initialized");
                            Ok(())
                        }
                        Err(err) => {
                            self.set_state(LifecycleState::Idle);
                            Err(classify_error(err, false))
                        }
                    };
                }
            }
        }
    }

    /// Disposes the context: tracked resources first (reverse insertion
    /// order), then `do_dispose`. Idempotent; a dispose racing an init wins.
    pub async fn dispose<F, Fut>(&self, do_dispose: F) -> BridgeResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        loop {
            let waiter = self.changed.notified();
            let claimed = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match *state {
                    LifecycleState::Disposed => return Ok(()),
                    LifecycleState::Disposing => false,
                    _ => {
                        self.dispose_requested.store(true, Ordering::SeqCst);
                        *state = LifecycleState::Disposing;
                        true
                    }
                }
            };
            if !claimed {
                // Another dispose is in flight; wait until it lands.
                waiter.await;
                continue;
            }
            self.changed.notify_waiters();

            let mut failures: Vec<anyhow::Error> = Vec::new();
            let resources: Vec<Arc<dyn ManagedResource>> = {
                let mut tracked = self.resources.lock().unwrap_or_else(|e| e.into_inner());
                tracked.drain(..).rev().collect()
            };
            for resource in resources {
                if let Err(err) = resource.dispose().await {
                    warn!(context = %self.name, resource = resource.resource_name(), error = %err, "resource disposal failed");
                    failures.push(err.context(resource.resource_name().to_string()));
                }
            }
            if let Err(err) = do_dispose().await {
                failures.push(err);
            }

            self.set_state(LifecycleState::Disposed);
            debug!(context = %self.name, "disposed");

            return if failures.is_empty() {
                Ok(())
            } else if failures.len() == 1 {
                Err(classify_error(failures.remove(0), false))
            } else {
                let summary = failures
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(classify_error(
                    anyhow::anyhow!(
                        "{} resources failed to dispose: {summary}",
                        failures.len()
                    ),
                    false,
                ))
            };
        }
    }

    /// Runs an operation bounded by timeout, cancellation, and a retry
    /// budget. Retries are spent only on timeout/transient classifications,
    /// with doubling backoff. A pre-armed cancellation token rejects
    /// immediately; `timeout = 0`/`None` disables the timer but
    /// cancellation still applies. Disposal observed during the operation
    /// surfaces as a disposed-kind error.
    pub async fn execute<T, F, Fut>(&self, op: F, options: &ExecOptions) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.execute_validated(op, options, |_| Ok(())).await
    }

    /// [`Self::execute`] with a post-hoc validation hook; a validation
    /// failure surfaces as the operation's classified rejection.
    pub async fn execute_validated<T, F, Fut, V>(
        &self,
        mut op: F,
        options: &ExecOptions,
        validate: V,
    ) -> BridgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
        V: Fn(&T) -> anyhow::Result<()>,
    {
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(BridgeError::timeout(format!(
                    "{}: aborted before the operation started",
                    self.name
                )));
            }
        }

        let mut delay = options.retry_delay;
        let mut attempt = 0u32;
        loop {
            if self.is_disposed_like() {
                return Err(self.disposed_error());
            }

            let outcome = self.run_bounded(op(), options).await;
            let err = match outcome {
                Ok(value) => {
                    if self.is_disposed_like() {
                        return Err(self.disposed_error());
                    }
                    match validate(&value) {
                        Ok(()) => return Ok(value),
                        Err(err) => classify_error(err, false),
                    }
                }
                Err(err) => err,
            };

            if err.is_retryable() && attempt < options.retries {
                attempt += 1;
                debug!(context = %self.name, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying bounded operation");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                continue;
            }
            return Err(err);
        }
    }

    async fn run_bounded<T, Fut>(&self, fut: Fut, options: &ExecOptions) -> BridgeResult<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let timeout = options.armed_timeout();
        let cancel = options.cancel.clone();
        tokio::pin!(fut);
        tokio::select! {
            biased;
            () = async { cancel.as_ref().expect("guarded").cancelled().await }, if cancel.is_some() => {
                Err(BridgeError::timeout(format!("{}: operation aborted", self.name)))
            }
            () = async { tokio::time::sleep(timeout.expect("guarded")).await }, if timeout.is_some() => {
                Err(BridgeError::timeout(format!(
                    "{}: operation timed out after {} ms",
                    self.name,
                    timeout.map(|t| t.as_millis()).unwrap_or_default()
                )))
            }
            result = &mut fut => result.map_err(|err| classify_error(err, self.is_disposed_like())),
        }
    }
}

/// Option validators. Failures are protocol-kind and name the offender.
pub fn validate_numeric(name: &str, value: f64) -> BridgeResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BridgeError::protocol(format!(
            "option \"{name}\" must be a finite number, got {value}"
        )))
    }
}

pub fn validate_positive(name: &str, value: f64) -> BridgeResult<()> {
    validate_numeric(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(BridgeError::protocol(format!(
            "option \"{name}\" must be positive, got {value}"
        )))
    }
}

pub fn validate_string(name: &str, value: &str) -> BridgeResult<()> {
    if value.contains('\0') {
        Err(BridgeError::protocol(format!(
            "option \"{name}\" must not contain NUL bytes"
        )))
    } else {
        Ok(())
    }
}

pub fn validate_non_empty_string(name: &str, value: &str) -> BridgeResult<()> {
    validate_string(name, value)?;
    if value.is_empty() {
        Err(BridgeError::protocol(format!(
            "option \"{name}\" must not be empty"
        )))
    } else {
        Ok(())
    }
}
