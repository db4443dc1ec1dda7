//! Persisted key/integer settings

use sqlx::SqlitePool;

use crate::StoreResult;

#[derive(Clone)]
pub struct ConfigRepo {
    pool: SqlitePool,
}

impl ConfigRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_integer(&self, key: &str) -> StoreResult<Option<i64>> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_integer(&self, key: &str, value: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>("SELECT key, value FROM config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
