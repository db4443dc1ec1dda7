//! How trust promotion state is derived
//!
//! A command becomes trusted once the same raw command has been reported
//! `threshold` times. Strategies differ in where that decision is kept:
//! [`StatusTracked`] persists it in the status column, [`CountThreshold`]
//! derives it from the occurrence count alone.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uranus_store::{AuditRecord, AuditRepo, PromotionStatus, StoreResult};

pub const DEFAULT_PROMOTION_THRESHOLD: i64 = 3;

#[async_trait]
pub trait PromotionStrategy: Send + Sync {
    fn threshold(&self) -> i64;

    /// True exactly when this post-update record crosses into trust.
    fn crosses(&self, record: &AuditRecord) -> bool;

    /// Counts one report. Whatever the strategy persists for a promotion
    /// commits together with the new count, so a failed write leaves the
    /// crossing to happen again on the next report.
    async fn record_report(
        &self,
        audit: &AuditRepo,
        cmd: &str,
        judge: i64,
    ) -> StoreResult<(AuditRecord, bool)>;

    /// Commands to announce as trusted when the agent starts.
    async fn replay_set(&self, audit: &AuditRepo) -> StoreResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionMode {
    #[default]
    Status,
    Message,
}

impl PromotionMode {
    pub fn strategy(self, threshold: i64) -> Arc<dyn PromotionStrategy> {
        match self {
            PromotionMode::Status => Arc::new(StatusTracked::new(threshold)),
            PromotionMode::Message => Arc::new(CountThreshold::new(threshold)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusTracked {
    threshold: i64,
}

impl StatusTracked {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }
}

impl Default for StatusTracked {
    fn default() -> Self {
        Self::new(DEFAULT_PROMOTION_THRESHOLD)
    }
}

#[async_trait]
impl PromotionStrategy for StatusTracked {
    fn threshold(&self) -> i64 {
        self.threshold
    }

    fn crosses(&self, record: &AuditRecord) -> bool {
        // Already-trusted commands were announced at startup.
        record.count == self.threshold && record.status != PromotionStatus::Trusted
    }

    async fn record_report(
        &self,
        audit: &AuditRepo,
        cmd: &str,
        judge: i64,
    ) -> StoreResult<(AuditRecord, bool)> {
        audit
            .record_report_with(cmd, judge, |record| self.crosses(record))
            .await
    }

    async fn replay_set(&self, audit: &AuditRepo) -> StoreResult<Vec<String>> {
        audit.commands_with_status(PromotionStatus::Trusted).await
    }
}

#[derive(Debug, Clone)]
pub struct CountThreshold {
    threshold: i64,
}

impl CountThreshold {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }
}

impl Default for CountThreshold {
    fn default() -> Self {
        Self::new(DEFAULT_PROMOTION_THRESHOLD)
    }
}

#[async_trait]
impl PromotionStrategy for CountThreshold {
    fn threshold(&self) -> i64 {
        self.threshold
    }

    fn crosses(&self, record: &AuditRecord) -> bool {
        record.count == self.threshold
    }

    async fn record_report(
        &self,
        audit: &AuditRepo,
        cmd: &str,
        judge: i64,
    ) -> StoreResult<(AuditRecord, bool)> {
        let record = audit.record_report(cmd, judge).await?;
        let promoted = self.crosses(&record);
        Ok((record, promoted))
    }

    async fn replay_set(&self, audit: &AuditRepo) -> StoreResult<Vec<String>> {
        audit.commands_with_count_at_least(self.threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count: i64, status: PromotionStatus) -> AuditRecord {
        AuditRecord {
            id: 1,
            command: "/\u{1f}/bin/ls".to_string(),
            workdir: "/".to_string(),
            binary: "/bin/ls".to_string(),
            argv: String::new(),
            count,
            judge: 1,
            status,
        }
    }

    #[test]
    fn test_crossing_is_exact() {
        let strategy = CountThreshold::default();
        assert!(!strategy.crosses(&record(2, PromotionStatus::Unclassified)));
        assert!(strategy.crosses(&record(3, PromotionStatus::Unclassified)));
        assert!(!strategy.crosses(&record(4, PromotionStatus::Unclassified)));
    }

    #[test]
    fn test_status_tracked_skips_trusted() {
        let strategy = StatusTracked::default();
        assert!(strategy.crosses(&record(3, PromotionStatus::Unclassified)));
        assert!(strategy.crosses(&record(3, PromotionStatus::Pending)));
        assert!(!strategy.crosses(&record(3, PromotionStatus::Trusted)));
    }

    #[test]
    fn test_mode_selects_strategy() {
        assert_eq!(PromotionMode::default(), PromotionMode::Status);
        assert_eq!(PromotionMode::Message.strategy(5).threshold(), 5);
        assert_eq!(PromotionMode::Status.strategy(DEFAULT_PROMOTION_THRESHOLD).threshold(), 3);
    }
}
