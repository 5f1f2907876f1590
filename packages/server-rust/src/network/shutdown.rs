//! Readiness and drain coordination for the HTTP edge.
//!
//! Health transitions go through `ArcSwap`. Orchestration handlers hold an
//! [`InFlightGuard`] for their whole run; the last guard to drop wakes any
//! task waiting in [`ShutdownController::wait_for_drain`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Gateway health: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    /// No new orchestrations; in-flight ones run to completion.
    Draining,
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Owns the gateway's health state and in-flight count.
#[derive(Debug)]
pub struct ShutdownController {
    state: ArcSwap<HealthState>,
    stopping: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (stopping, _) = watch::channel(false);
        Self {
            state: ArcSwap::from_pointee(HealthState::Starting),
            stopping,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining` and wakes every [`shutdown_receiver`](Self::shutdown_receiver).
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        self.stopping.send_replace(true);
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.stopping.subscribe()
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    /// True while new orchestrations may start.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.health_state() == HealthState::Ready
    }

    /// Counts one orchestration until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits up to `timeout` for every guard to drop.
    ///
    /// Returns `true` and moves to `Stopped` once idle. On timeout the state
    /// is left as it was.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                // Register before checking so a drop in between is not missed.
                let wake = self.in_flight.idle.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                wake.await;
            }
        };
        let drained = tokio::time::timeout(timeout, idle).await.is_ok();
        if drained {
            self.state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_states() {
        let gate = ShutdownController::new();
        assert_eq!(gate.health_state(), HealthState::Starting);
        assert!(!gate.is_accepting());

        gate.set_ready();
        assert!(gate.is_accepting());
        assert_eq!(gate.health_state().as_str(), "ready");

        gate.trigger_shutdown();
        assert!(!gate.is_accepting());
        assert_eq!(gate.health_state().as_str(), "draining");
    }

    #[test]
    fn guards_track_in_flight_orchestrations() {
        let gate = ShutdownController::new();
        let login = gate.in_flight_guard();
        let crud = gate.in_flight_guard();
        assert_eq!(gate.in_flight_count(), 2);
        drop(login);
        assert_eq!(gate.in_flight_count(), 1);
        drop(crud);
        assert_eq!(gate.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn receivers_see_shutdown() {
        let gate = ShutdownController::new();
        let mut stopping = gate.shutdown_receiver();
        assert!(!*stopping.borrow());

        gate.trigger_shutdown();
        stopping.changed().await.unwrap();
        assert!(*stopping.borrow());
    }

    #[tokio::test]
    async fn idle_gateway_stops_immediately() {
        let gate = ShutdownController::new();
        gate.trigger_shutdown();
        assert!(gate.wait_for_drain(Duration::from_millis(10)).await);
        assert_eq!(gate.health_state(), HealthState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_last_guard() {
        let gate = Arc::new(ShutdownController::new());
        let guard = gate.in_flight_guard();
        gate.trigger_shutdown();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(guard);
        });

        assert!(gate.wait_for_drain(Duration::from_secs(30)).await);
        assert_eq!(gate.health_state(), HealthState::Stopped);
        releaser.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_timeout() {
        let gate = ShutdownController::new();
        let _stuck = gate.in_flight_guard();
        gate.trigger_shutdown();

        assert!(!gate.wait_for_drain(Duration::from_secs(30)).await);
        assert_eq!(gate.health_state(), HealthState::Draining);
    }
}
