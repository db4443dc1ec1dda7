//! Escalation path for conditions the agent must not survive

use std::sync::OnceLock;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::error;

/// Ends the agent process. Called from the receive loop on transport or
/// persistence failure and from the watchdog on heartbeat loss.
pub trait FatalHandler: Send + Sync {
    fn terminate(&self, reason: &str);
}

/// Interrupts the current process with SIGINT, so the daemon's signal
/// handler runs the regular stop sequence before exiting.
///
/// The first reason is kept; the daemon checks [`Self::fatal_reason`] after
/// stopping and exits with a failure status so a supervisor restarts it.
#[derive(Debug, Default)]
pub struct SignalTerminator {
    reason: OnceLock<String>,
}

impl SignalTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal_reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}

impl FatalHandler for SignalTerminator {
    fn terminate(&self, reason: &str) {
        error!(reason, "Fatal condition, interrupting agent");
        let _ = self.reason.set(reason.to_string());
        if let Err(e) = kill(Pid::this(), Signal::SIGINT) {
            error!(error = %e, "Failed to signal agent process");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::signal::unix::{signal, SignalKind};

    use super::*;

    #[tokio::test]
    async fn test_terminate_interrupts_and_keeps_first_reason() {
        // Handler installed first so SIGINT is caught instead of ending the test run.
        let mut interrupt = signal(SignalKind::interrupt()).unwrap();
        let terminator = SignalTerminator::new();
        assert_eq!(terminator.fatal_reason(), None);

        terminator.terminate("osinfo::report timeout");
        tokio::time::timeout(Duration::from_secs(5), interrupt.recv())
            .await
            .expect("SIGINT not delivered")
            .unwrap();

        terminator.terminate("kernel channel failed");
        assert_eq!(terminator.fatal_reason(), Some("osinfo::report timeout"));
    }
}
