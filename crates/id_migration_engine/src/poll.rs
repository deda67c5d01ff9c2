use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Converged,
    TimedOut,
    Cancelled,
}

type CancelSlot = Arc<Mutex<Option<watch::Sender<bool>>>>;

/// Cancels the watcher's current session. Cancelling between sessions is
/// a no-op; a later session is unaffected by an earlier cancel.
#[derive(Clone)]
pub struct PollCancelHandle {
    cancel: CancelSlot,
}

impl PollCancelHandle {
    pub fn cancel(&self) {
        if let Some(sender) = self.cancel.lock().expect("lock cancel slot").take() {
            let _ = sender.send(true);
        }
    }
}

/// Bounded-time polling for a derived effect of a migration to become
/// observable outside this engine (for example, updated membership).
///
/// Each call to [`wait`](Self::wait) is one session: the check runs at
/// interval cadence until it first returns `true`, the timeout elapses,
/// or the session is cancelled. Exactly one outcome is produced per
/// session.
pub struct ConvergencePollWatcher {
    config: PollConfig,
    cancel: CancelSlot,
}

impl ConvergencePollWatcher {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub fn cancel_handle(&self) -> PollCancelHandle {
        PollCancelHandle {
            cancel: self.cancel.clone(),
        }
    }

    pub async fn wait<F, Fut>(&mut self, mut check: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let (sender, mut cancel_rx) = watch::channel(false);
        *self.cancel.lock().expect("lock cancel slot") = Some(sender);

        let start = Instant::now();
        let mut ticker = interval_at(start + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep(self.config.timeout);
        tokio::pin!(deadline);
        let mut cancel_open = true;

        let outcome = loop {
            tokio::select! {
                _ = &mut deadline => break PollOutcome::TimedOut,
                changed = cancel_rx.changed(), if cancel_open => {
                    if changed.is_ok() {
                        break PollOutcome::Cancelled;
                    }
                    cancel_open = false;
                }
                _ = ticker.tick() => {
                    if check().await {
                        break PollOutcome::Converged;
                    }
                }
            }
        };

        *self.cancel.lock().expect("lock cancel slot") = None;
        outcome
    }

    /// Callback-shaped session: invokes exactly one of the two callbacks,
    /// or neither when the session is cancelled.
    pub async fn watch_with_callbacks<F, Fut, C, T>(
        &mut self,
        check: F,
        on_complete: C,
        on_timeout: T,
    ) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
        C: FnOnce(),
        T: FnOnce(),
    {
        let outcome = self.wait(check).await;
        match outcome {
            PollOutcome::Converged => on_complete(),
            PollOutcome::TimedOut => on_timeout(),
            PollOutcome::Cancelled => {}
        }
        outcome
    }
}
