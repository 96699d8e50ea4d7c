//! Lifecycle state and stop requests for a service instance.
//!
//! Uses `ArcSwap` for lock-free state transitions and an atomic counter
//! with RAII guards for in-flight request tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Lifecycle state of a service instance.
///
/// State machine: Created -> Listening -> `ShuttingDown` -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Configuration resolved, no socket bound yet.
    Created,
    /// Listener bound and serving requests.
    Listening,
    /// No new connections accepted; in-flight requests are draining.
    ShuttingDown,
    /// Terminal: drained or abandoned after the grace period.
    Stopped,
}

impl LifecycleState {
    /// Returns the snake-case name used in health responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Listening => "listening",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks lifecycle state and in-flight requests, and carries explicit
/// stop requests to the lifecycle task.
///
/// 1. Health probes read `state()` to report readiness
/// 2. Request middleware holds an `InFlightGuard` per request
/// 3. `trigger_shutdown()` asks the running instance to stop
#[derive(Debug)]
pub struct ShutdownController {
    stop_requested: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    state: Arc<ArcSwap<LifecycleState>>,
}

impl ShutdownController {
    /// Creates a new controller in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stop_requested: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            state: Arc::new(ArcSwap::from_pointee(LifecycleState::Created)),
        }
    }

    pub(crate) fn set_listening(&self) {
        self.state.store(Arc::new(LifecycleState::Listening));
    }

    pub(crate) fn begin_shutdown(&self) {
        self.state.store(Arc::new(LifecycleState::ShuttingDown));
    }

    pub(crate) fn mark_stopped(&self) {
        self.state.store(Arc::new(LifecycleState::Stopped));
    }

    /// Returns a receiver that flips to `true` once a stop is requested.
    #[must_use]
    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_requested.subscribe()
    }

    /// Requests a graceful stop, as if a termination signal had arrived.
    ///
    /// The request is kept even if nothing is waiting for it yet.
    pub fn trigger_shutdown(&self) {
        self.stop_requested.send_replace(true);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        *self.stop_requested.borrow()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Creates an RAII guard that tracks an in-flight request.
    ///
    /// The in-flight counter is incremented on creation and decremented
    /// when the guard is dropped, even if the handler panics.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Returns the current number of in-flight requests.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
