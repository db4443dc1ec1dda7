//! In-process connector (tests and embedding)
//!
//! [`in_proc_pair`] returns the agent side and a [`KernelEndpoint`] that
//! plays hackernel: it injects reports and observes outbound frames.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;

use crate::{shutdown_reached, Connector, ConnectorError};

pub struct InProcConnector {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    connected: AtomicBool,
    shutdown: watch::Sender<Option<Instant>>,
}

pub struct KernelEndpoint {
    to_agent: Option<mpsc::UnboundedSender<String>>,
    from_agent: mpsc::UnboundedReceiver<String>,
}

pub fn in_proc_pair() -> (InProcConnector, KernelEndpoint) {
    let (to_agent, inbound) = mpsc::unbounded_channel();
    let (outbound, from_agent) = mpsc::unbounded_channel();
    let (shutdown, _) = watch::channel(None);
    let connector = InProcConnector {
        outbound,
        inbound: Mutex::new(inbound),
        connected: AtomicBool::new(false),
        shutdown,
    };
    let endpoint = KernelEndpoint {
        to_agent: Some(to_agent),
        from_agent,
    };
    (connector, endpoint)
}

impl InProcConnector {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn require_connected(&self) -> Result<(), ConnectorError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectorError::NotConnected)
        }
    }
}

#[async_trait]
impl Connector for InProcConnector {
    async fn connect(&self) -> Result<(), ConnectorError> {
        self.shutdown.send_replace(None);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn send(&self, message: &str) -> Result<(), ConnectorError> {
        self.require_connected()?;
        self.outbound
            .send(message.to_string())
            .map_err(|_| ConnectorError::Closed)
    }

    async fn receive(&self) -> Result<String, ConnectorError> {
        self.require_connected()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => frame.ok_or(ConnectorError::Closed),
            _ = shutdown_reached(&mut shutdown_rx) => Err(ConnectorError::Shutdown),
        }
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ConnectorError> {
        self.shutdown.send_replace(Some(deadline));
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

impl KernelEndpoint {
    /// Delivers a frame to the agent. Returns false once the endpoint hung up
    /// or the agent side was dropped.
    pub fn report(&self, frame: impl Into<String>) -> bool {
        match &self.to_agent {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Closes the kernel-to-agent direction; the agent's next receive fails.
    pub fn hang_up(&mut self) {
        self.to_agent = None;
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_agent.recv().await
    }

    /// Frames sent by the agent so far, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_agent.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
