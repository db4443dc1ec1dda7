//! Store models - mapped from SQLite tables

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// Settings key toggling kernel-side process protection.
pub const PROC_CORE_STATUS: &str = "proc::core::status";

/// Values stored under [`PROC_CORE_STATUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessCoreStatus {
    Disable,
    Enable,
}

impl ProcessCoreStatus {
    pub fn code(self) -> i64 {
        match self {
            ProcessCoreStatus::Disable => 0,
            ProcessCoreStatus::Enable => 1,
        }
    }

    pub fn is_enabled_code(code: i64) -> bool {
        code == ProcessCoreStatus::Enable.code()
    }
}

/// Promotion state persisted in the `status` column.
///
/// Only `Trusted` is replayed to the kernel on startup. `Pending` and any
/// other code are kept as-is and carry no behaviour yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromotionStatus {
    Unclassified,
    Pending,
    Trusted,
    Reserved(i64),
}

impl PromotionStatus {
    pub fn code(self) -> i64 {
        match self {
            PromotionStatus::Unclassified => 0,
            PromotionStatus::Pending => 1,
            PromotionStatus::Trusted => 2,
            PromotionStatus::Reserved(code) => code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => PromotionStatus::Unclassified,
            1 => PromotionStatus::Pending,
            2 => PromotionStatus::Trusted,
            other => PromotionStatus::Reserved(other),
        }
    }
}

impl std::fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromotionStatus::Unclassified => f.pad("unclassified"),
            PromotionStatus::Pending => f.pad("pending"),
            PromotionStatus::Trusted => f.pad("trusted"),
            PromotionStatus::Reserved(code) => f.pad(&format!("reserved({code})")),
        }
    }
}

/// One row per distinct raw command ever audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub command: String,
    pub workdir: String,
    pub binary: String,
    pub argv: String,
    pub count: i64,
    pub judge: i64,
    pub status: PromotionStatus,
}

impl<'r> FromRow<'r, SqliteRow> for AuditRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            command: row.try_get("cmd")?,
            workdir: row.try_get("workdir")?,
            binary: row.try_get("binary")?,
            argv: row.try_get("argv")?,
            count: row.try_get("count")?,
            judge: row.try_get("judge")?,
            status: PromotionStatus::from_code(row.try_get("status")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [
            PromotionStatus::Unclassified,
            PromotionStatus::Pending,
            PromotionStatus::Trusted,
            PromotionStatus::Reserved(7),
        ] {
            assert_eq!(PromotionStatus::from_code(status.code()), status);
        }
        assert_eq!(PromotionStatus::Trusted.code(), 2);
    }

    #[test]
    fn test_core_status_sentinel() {
        assert!(ProcessCoreStatus::is_enabled_code(1));
        assert!(!ProcessCoreStatus::is_enabled_code(0));
        assert!(!ProcessCoreStatus::is_enabled_code(2));
    }
}
