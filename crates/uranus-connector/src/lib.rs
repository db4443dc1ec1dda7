//! Uranus Connector - ordered message channel to hackernel
//!
//! A connector moves whole text frames in both directions. `receive` parks
//! until a frame arrives; `shutdown` is the only way to release a parked
//! receiver from another task, so stopping the agent always pairs it with
//! clearing the running flag.

pub mod inproc;
pub mod unix;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

pub use inproc::{in_proc_pair, InProcConnector, KernelEndpoint};
pub use unix::UnixConnector;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(), ConnectorError>;

    async fn send(&self, message: &str) -> Result<(), ConnectorError>;

    /// Blocks until the next frame, the peer hangs up, or the shutdown
    /// deadline passes. A frame that is not UTF-8 yields
    /// [`ConnectorError::InvalidFrame`] and leaves the channel open.
    async fn receive(&self) -> Result<String, ConnectorError>;

    /// Releases any pending `receive` once `deadline` is reached.
    async fn shutdown(&self, deadline: Instant) -> Result<(), ConnectorError>;

    async fn close(&self) -> Result<(), ConnectorError>;
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Connector is not connected")]
    NotConnected,
    #[error("Channel closed by peer")]
    Closed,
    #[error("Connector shut down")]
    Shutdown,
    #[error("Frame is not valid UTF-8: {0}")]
    InvalidFrame(#[from] std::string::FromUtf8Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// The channel itself is still usable; only the frame was bad.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, ConnectorError::InvalidFrame(_))
    }
}

/// Resolves once a shutdown deadline has been published and reached.
pub(crate) async fn shutdown_reached(rx: &mut watch::Receiver<Option<Instant>>) {
    let deadline = loop {
        if let Some(deadline) = *rx.borrow_and_update() {
            break deadline;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::time::sleep_until(deadline).await;
}
