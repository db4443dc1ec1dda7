//! Unix socket connector with newline-delimited JSON frames

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::{shutdown_reached, Connector, ConnectorError};

pub struct UnixConnector {
    path: PathBuf,
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    shutdown: watch::Sender<Option<Instant>>,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (shutdown, _) = watch::channel(None);
        Self {
            path: path.into(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            shutdown,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for UnixConnector {
    async fn connect(&self) -> Result<(), ConnectorError> {
        let stream = UnixStream::connect(&self.path).await?;
        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(BufReader::new(read_half));
        *self.writer.lock().await = Some(write_half);
        self.shutdown.send_replace(None);
        debug!(path = %self.path.display(), "connector opened");
        Ok(())
    }

    async fn send(&self, message: &str) -> Result<(), ConnectorError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectorError::NotConnected)?;
        let mut frame = Vec::with_capacity(message.len() + 1);
        frame.extend_from_slice(message.as_bytes());
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<String, ConnectorError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ConnectorError::NotConnected)?;

        // Raw bytes: paths and arguments reported by the kernel need not be UTF-8.
        let mut frame = Vec::new();
        tokio::select! {
            read = reader.read_until(b'\n', &mut frame) => {
                if read? == 0 {
                    return Err(ConnectorError::Closed);
                }
            }
            _ = shutdown_reached(&mut shutdown_rx) => return Err(ConnectorError::Shutdown),
        }

        if frame.last() == Some(&b'\n') {
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
        }
        Ok(String::from_utf8(frame)?)
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ConnectorError> {
        self.shutdown.send_replace(Some(deadline));
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.reader.lock().await.take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Peer may already be gone.
            let _ = writer.shutdown().await;
        }
        debug!(path = %self.path.display(), "connector closed");
        Ok(())
    }
}
