//! Audit/trust repository

use sqlx::SqlitePool;
use uranus_protocol::split_command;

use crate::{AuditRecord, PromotionStatus, StoreResult};

const SELECT_RECORD: &str =
    "SELECT id, cmd, workdir, binary, argv, count, judge, status FROM process";

#[derive(Clone)]
pub struct AuditRepo {
    pool: SqlitePool,
}

impl AuditRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Counts one more report of `cmd` and stores the kernel's judgment,
    /// inserting the record on first sight. Returns the post-update row.
    pub async fn record_report(&self, cmd: &str, judge: i64) -> StoreResult<AuditRecord> {
        let (record, _) = self.record_report_with(cmd, judge, |_| false).await?;
        Ok(record)
    }

    /// Same as [`Self::record_report`], and marks the command trusted when
    /// `promote` accepts the post-update row. The new count and the trusted
    /// status commit together or not at all.
    pub async fn record_report_with<F>(
        &self,
        cmd: &str,
        judge: i64,
        promote: F,
    ) -> StoreResult<(AuditRecord, bool)>
    where
        F: FnOnce(&AuditRecord) -> bool + Send,
    {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE process SET count = count + 1, judge = ? WHERE cmd = ?")
            .bind(judge)
            .bind(cmd)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            let parts = split_command(cmd);
            sqlx::query(
                r#"
                INSERT INTO process (cmd, workdir, binary, argv, count, judge, status)
                VALUES (?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(cmd)
            .bind(&parts.workdir)
            .bind(&parts.binary)
            .bind(&parts.argv)
            .bind(judge)
            .bind(PromotionStatus::Unclassified.code())
            .execute(&mut *tx)
            .await?;
        }

        let mut record =
            sqlx::query_as::<_, AuditRecord>(&format!("{SELECT_RECORD} WHERE cmd = ?"))
                .bind(cmd)
                .fetch_one(&mut *tx)
                .await?;

        let promoted = promote(&record);
        if promoted {
            sqlx::query("UPDATE process SET status = ? WHERE cmd = ?")
                .bind(PromotionStatus::Trusted.code())
                .bind(cmd)
                .execute(&mut *tx)
                .await?;
            record.status = PromotionStatus::Trusted;
        }

        tx.commit().await?;
        Ok((record, promoted))
    }

    pub async fn find(&self, cmd: &str) -> StoreResult<Option<AuditRecord>> {
        let record = sqlx::query_as::<_, AuditRecord>(&format!("{SELECT_RECORD} WHERE cmd = ?"))
            .bind(cmd)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Most frequently executed first.
    pub async fn list(&self, limit: i64, offset: i64) -> StoreResult<Vec<AuditRecord>> {
        let records = sqlx::query_as::<_, AuditRecord>(&format!(
            "{SELECT_RECORD} ORDER BY count DESC, id ASC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn commands_with_status(&self, status: PromotionStatus) -> StoreResult<Vec<String>> {
        let commands = sqlx::query_scalar::<_, String>(
            "SELECT cmd FROM process WHERE status = ? ORDER BY id ASC",
        )
        .bind(status.code())
        .fetch_all(&self.pool)
        .await?;
        Ok(commands)
    }

    pub async fn commands_with_count_at_least(&self, count: i64) -> StoreResult<Vec<String>> {
        let commands = sqlx::query_scalar::<_, String>(
            "SELECT cmd FROM process WHERE count >= ? ORDER BY id ASC",
        )
        .bind(count)
        .fetch_all(&self.pool)
        .await?;
        Ok(commands)
    }

    /// Returns false when no record exists for `cmd`.
    pub async fn set_status(&self, cmd: &str, status: PromotionStatus) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE process SET status = ? WHERE cmd = ?")
            .bind(status.code())
            .bind(cmd)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
