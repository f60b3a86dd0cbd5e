use async_trait::async_trait;
use sqlx::Row;
use xqueue_core::error::StorageError;
use xqueue_store::UserStore;

use crate::store::PostgresSubmissionStore;

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

#[async_trait]
impl UserStore for PostgresSubmissionStore {
    async fn upsert_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO queue_user (username, password_hash) VALUES ($1, $2)
             ON CONFLICT (username) DO UPDATE SET password_hash = excluded.password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT password_hash FROM queue_user WHERE username = $1")
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get::<String, _>("password_hash")))
    }
}
