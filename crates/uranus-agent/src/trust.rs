//! Trust-update operation and restart replay

use std::sync::Arc;

use tracing::{debug, info};
use uranus_connector::Connector;
use uranus_protocol::OutboundMessage;
use uranus_store::{AuditRecord, AuditRepo};

use crate::promotion::PromotionStrategy;
use crate::AgentError;

/// Result of applying one audit report.
#[derive(Debug, Clone)]
pub struct TrustOutcome {
    pub record: AuditRecord,
    pub promoted: bool,
}

#[derive(Clone)]
pub struct TrustEngine {
    audit: AuditRepo,
    strategy: Arc<dyn PromotionStrategy>,
    connector: Arc<dyn Connector>,
}

impl TrustEngine {
    pub fn new(
        audit: AuditRepo,
        strategy: Arc<dyn PromotionStrategy>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            audit,
            strategy,
            connector,
        }
    }

    /// Counts the report and announces the command to the kernel when it
    /// crosses the promotion threshold.
    pub async fn apply(&self, cmd: &str, judge: i64) -> Result<TrustOutcome, AgentError> {
        let (record, promoted) = self.strategy.record_report(&self.audit, cmd, judge).await?;
        debug!(
            workdir = %record.workdir,
            binary = %record.binary,
            argv = %record.argv,
            count = record.count,
            judge,
            "Process audit recorded"
        );

        if !promoted {
            return Ok(TrustOutcome {
                record,
                promoted: false,
            });
        }

        self.announce(&record.command).await?;
        info!(
            binary = %record.binary,
            argv = %record.argv,
            count = record.count,
            "Command promoted to trusted"
        );
        Ok(TrustOutcome {
            record,
            promoted: true,
        })
    }

    /// Re-announces every command the strategy considers trusted.
    pub async fn replay(&self) -> Result<usize, AgentError> {
        let commands = self.strategy.replay_set(&self.audit).await?;
        for cmd in &commands {
            self.announce(cmd).await?;
        }
        info!(count = commands.len(), "Trusted commands replayed to kernel");
        Ok(commands.len())
    }

    async fn announce(&self, cmd: &str) -> Result<(), AgentError> {
        let frame = OutboundMessage::trusted_insert(cmd).encode()?;
        self.connector.send(&frame).await?;
        Ok(())
    }
}
