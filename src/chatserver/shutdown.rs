// Server lifecycle and the deferred shutdown timer

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Server lifecycle
///
/// Transitions only move forward:
/// `Running → ShutdownScheduled → Draining → Stopped`. A server may also go
/// straight from `Running` to `Draining` when it is cancelled locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    Running,
    ShutdownScheduled,
    Draining,
    Stopped,
}

/// Owns the cancellation domain shared by both listeners and every
/// in-flight connection
pub struct ShutdownController {
    token: CancellationToken,
    state: watch::Sender<Lifecycle>,
}

impl ShutdownController {
    /// Create a controller in the `Running` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(Lifecycle::Running);

        Self {
            token: CancellationToken::new(),
            state,
        }
    }

    /// Token observed by listeners and connection tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.state.subscribe()
    }

    /// Move from `Running` to `ShutdownScheduled`
    ///
    /// Returns false if a shutdown is already pending or under way.
    pub fn try_schedule(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == Lifecycle::Running {
                *state = Lifecycle::ShutdownScheduled;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Draining` and cancel everything in the domain
    pub fn begin_drain(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state < Lifecycle::Draining {
                *state = Lifecycle::Draining;
                true
            } else {
                false
            }
        });

        if changed {
            tracing::info!("Draining: cancelling listeners and connections");
        }
        self.token.cancel();
    }

    /// Enter `Stopped` once all work has observed cancellation
    pub fn mark_stopped(&self) {
        self.state.send_replace(Lifecycle::Stopped);
    }

    /// Resolves once the domain has been cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// A pending one-shot shutdown
///
/// Fires at most once. If the domain is cancelled by other means first the
/// timer task exits without firing.
pub struct ShutdownTimer {
    deadline: Instant,
    task: JoinHandle<()>,
}

impl ShutdownTimer {
    /// Spawn a timer that drains `controller` after `delay`
    pub fn arm(controller: Arc<ShutdownController>, delay: Duration) -> Self {
        let deadline = Instant::now() + delay;
        let token = controller.token();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!("Shutdown timer fired");
                    controller.begin_drain();
                }
                _ = token.cancelled() => {
                    tracing::debug!("Shutdown timer dropped, server already cancelled");
                }
            }
        });

        Self { deadline, task }
    }

    /// Time left before the timer fires
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
