//! Resettable liveness timer
//!
//! The timer is armed on creation. If no [`Watchdog::kick`] arrives within
//! the interval the callback fires once and the timer disarms; the next kick
//! arms it again.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct Watchdog {
    kicks: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl Watchdog {
    pub fn spawn<F>(interval: Duration, on_timeout: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (kicks, mut rx) = mpsc::unbounded_channel::<()>();
        let task = tokio::spawn(async move {
            let mut deadline = Some(Instant::now() + interval);
            loop {
                tokio::select! {
                    kick = rx.recv() => match kick {
                        Some(()) => deadline = Some(Instant::now() + interval),
                        None => break,
                    },
                    _ = expired(deadline) => {
                        deadline = None;
                        on_timeout();
                    }
                }
            }
        });
        Self { kicks, task }
    }

    /// Pushes the deadline one interval into the future.
    pub fn kick(&self) {
        let _ = self.kicks.send(());
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
