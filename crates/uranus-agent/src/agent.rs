//! Policy agent lifecycle and receive loop

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uranus_connector::{Connector, ConnectorError};
use uranus_protocol::{InboundMessage, OutboundMessage, ProtocolError, Section};
use uranus_store::{
    ConfigRepo, ProcessCoreStatus, Store, StoreError, StoreResult, PROC_CORE_STATUS,
};

use crate::fatal::{FatalHandler, SignalTerminator};
use crate::promotion::{PromotionMode, PromotionStrategy, DEFAULT_PROMOTION_THRESHOLD};
use crate::trust::TrustEngine;
use crate::watchdog::{Watchdog, DEFAULT_HEARTBEAT_INTERVAL};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Read access to persisted settings.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn get_integer(&self, key: &str) -> StoreResult<Option<i64>>;
}

#[async_trait]
impl ConfigSource for ConfigRepo {
    async fn get_integer(&self, key: &str) -> StoreResult<Option<i64>> {
        ConfigRepo::get_integer(self, key).await
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `None` skips the heartbeat subscription and the watchdog.
    pub heartbeat_interval: Option<Duration>,
    pub grace_period: Duration,
    pub promotion_mode: PromotionMode,
    pub promotion_threshold: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            grace_period: DEFAULT_GRACE_PERIOD,
            promotion_mode: PromotionMode::default(),
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
        }
    }
}

pub struct PolicyAgent {
    connector: Arc<dyn Connector>,
    store: Store,
    settings: Arc<dyn ConfigSource>,
    strategy: Arc<dyn PromotionStrategy>,
    fatal: Arc<dyn FatalHandler>,
    config: AgentConfig,
    running: watch::Sender<bool>,
    subscribed: Vec<Section>,
    worker: Option<JoinHandle<()>>,
}

impl PolicyAgent {
    pub fn new(connector: Arc<dyn Connector>, store: Store, config: AgentConfig) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            connector,
            settings: Arc::new(store.config_repo()),
            strategy: config.promotion_mode.strategy(config.promotion_threshold),
            store,
            fatal: Arc::new(SignalTerminator::new()),
            config,
            running,
            subscribed: Vec::new(),
            worker: None,
        }
    }

    pub fn with_fatal_handler(mut self, fatal: Arc<dyn FatalHandler>) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_config_source(mut self, settings: Arc<dyn ConfigSource>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_promotion(mut self, strategy: Arc<dyn PromotionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Brings the kernel in line with persisted policy and starts the
    /// receive loop. Fails fast; the caller still owes a [`Self::stop`].
    pub async fn start(&mut self) -> Result<(), AgentError> {
        if self.worker.is_some() {
            return Err(AgentError::AlreadyRunning);
        }
        self.running.send_replace(true);

        self.connector.connect().await?;
        self.store.init_schema().await?;

        if self.protection_enabled().await {
            self.send(&OutboundMessage::ProcEnable).await?;
            info!("Kernel process protection enabled");
        }

        for section in self.sections() {
            self.send(&OutboundMessage::Subscribe { section }).await?;
            self.subscribed.push(section);
            debug!(%section, "Subscribed");
        }

        let engine = self.engine();
        engine.replay().await?;

        let receive_loop = ReceiveLoop {
            connector: self.connector.clone(),
            engine,
            fatal: self.fatal.clone(),
            running: self.running.subscribe(),
            heartbeat_interval: self.config.heartbeat_interval,
        };
        self.worker = Some(tokio::spawn(receive_loop.run()));
        info!("Policy agent started");
        Ok(())
    }

    /// Runs every shutdown step even when an earlier one fails, so the
    /// receive loop is always joined. Returns the first error seen.
    pub async fn stop(&mut self) -> Result<(), AgentError> {
        let mut first_error: Option<AgentError> = None;

        for section in std::mem::take(&mut self.subscribed) {
            if let Err(e) = self.send(&OutboundMessage::Unsubscribe { section }).await {
                warn!(%section, error = %e, "Unsubscribe failed");
                first_error.get_or_insert(e);
            }
        }

        if self.protection_enabled().await {
            match self.send(&OutboundMessage::ProcDisable).await {
                Ok(()) => info!("Kernel process protection disabled"),
                Err(e) => {
                    warn!(error = %e, "Disabling kernel protection failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        tokio::time::sleep(self.config.grace_period).await;
        self.running.send_replace(false);

        if let Err(e) = self.connector.shutdown(Instant::now()).await {
            warn!(error = %e, "Connector shutdown failed");
            first_error.get_or_insert(e.into());
        }

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "Receive loop terminated abnormally");
            }
        }

        if let Err(e) = self.connector.close().await {
            warn!(error = %e, "Connector close failed");
        }

        info!("Policy agent stopped");
        first_error.map_or(Ok(()), Err)
    }

    fn sections(&self) -> Vec<Section> {
        let mut sections = vec![Section::ProcAudit];
        if self.config.heartbeat_interval.is_some() {
            sections.push(Section::OsInfo);
        }
        sections
    }

    fn engine(&self) -> TrustEngine {
        TrustEngine::new(
            self.store.audit_repo(),
            self.strategy.clone(),
            self.connector.clone(),
        )
    }

    /// Missing or unreadable setting leaves the kernel default alone.
    async fn protection_enabled(&self) -> bool {
        match self.settings.get_integer(PROC_CORE_STATUS).await {
            Ok(Some(code)) => ProcessCoreStatus::is_enabled_code(code),
            Ok(None) => false,
            Err(e) => {
                warn!(key = PROC_CORE_STATUS, error = %e, "Config read failed");
                false
            }
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AgentError> {
        let frame = message.encode()?;
        self.connector.send(&frame).await?;
        Ok(())
    }
}

struct ReceiveLoop {
    connector: Arc<dyn Connector>,
    engine: TrustEngine,
    fatal: Arc<dyn FatalHandler>,
    running: watch::Receiver<bool>,
    heartbeat_interval: Option<Duration>,
}

impl ReceiveLoop {
    async fn run(mut self) {
        let watchdog = self.heartbeat_interval.map(|interval| {
            let fatal = self.fatal.clone();
            Watchdog::spawn(interval, move || {
                error!("osinfo::report timeout");
                fatal.terminate("osinfo::report timeout");
            })
        });

        while self.is_running() {
            let received = self.connector.receive().await;
            if !self.is_running() {
                break;
            }

            let frame = match received {
                Ok(frame) => frame,
                Err(e) if e.is_frame_error() => {
                    warn!(error = %e, "Dropping malformed kernel message");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Kernel channel failed");
                    self.fatal.terminate("kernel channel failed");
                    self.wait_stopped().await;
                    continue;
                }
            };

            let message = match InboundMessage::decode(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed kernel message");
                    continue;
                }
            };

            match message {
                InboundMessage::ProcAuditReport { cmd, judge } => {
                    if let Err(e) = self.engine.apply(&cmd, judge).await {
                        error!(error = %e, "Trust update failed");
                        self.fatal.terminate("trust update failed");
                        if matches!(e, AgentError::Connector(_)) {
                            self.wait_stopped().await;
                        }
                    }
                }
                InboundMessage::OsInfoReport => {
                    if let Some(watchdog) = &watchdog {
                        watchdog.kick();
                    }
                }
                InboundMessage::Unknown => {}
            }
        }
        debug!("Receive loop exited");
    }

    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Parks until the control side clears the running flag.
    async fn wait_stopped(&mut self) {
        let _ = self.running.wait_for(|running| !running).await;
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent already running")]
    AlreadyRunning,
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
