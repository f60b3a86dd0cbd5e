use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use xqueue_core::error::StorageError;
use xqueue_core::hashkey::make_hashkey;
use xqueue_core::{NewSubmission, Submission};
use xqueue_store::SubmissionStore;

use crate::migrations::run_migrations;
use crate::row::SubmissionRow;

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// `SubmissionStore` backed by a single Postgres table, using
/// `SELECT ... FOR UPDATE SKIP LOCKED` plus an atomic stamping `UPDATE` as the
/// serialization point for `next_pullable`/`next_pushable`.
pub struct PostgresSubmissionStore {
    pool: PgPool,
}

impl PostgresSubmissionStore {
    /// Connects, runs migrations, and returns a ready store.
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn claim(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
        time_column: &str,
    ) -> Result<Option<Submission>, StorageError> {
        let now = Utc::now();
        let eligible_before = now - processing_delay;
        let sql = format!(
            "WITH claimable AS (
                SELECT id FROM queue_submission
                WHERE queue_name = $1 AND retired = false
                  AND ({time_column} IS NULL OR {time_column} <= $2)
                ORDER BY arrival_time ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue_submission
            SET {time_column} = $3, pullkey = CASE WHEN $4 THEN $5 ELSE pullkey END,
                grader_id = $6
            FROM claimable
            WHERE queue_submission.id = claimable.id
            RETURNING queue_submission.*"
        );
        let is_pull = time_column == "pull_time";
        let pullkey = if is_pull {
            make_hashkey(&format!("{now}:{queue}"))
        } else {
            String::new()
        };
        let row: Option<SubmissionRow> = sqlx::query_as(&sql)
            .bind(queue)
            .bind(eligible_before)
            .bind(now)
            .bind(is_pull)
            .bind(pullkey)
            .bind(grader_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(Submission::from))
    }
}

#[async_trait]
impl SubmissionStore for PostgresSubmissionStore {
    async fn create(&self, submission: NewSubmission) -> Result<i64, StorageError> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO queue_submission
                (requester_id, lms_callback_url, queue_name, xqueue_header, xqueue_body,
                 urls, keys, arrival_time, grader_id, pullkey, grader_reply,
                 num_failures, lms_ack, retired)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '', '', '', 0, false, false)
             RETURNING id",
        )
        .bind(&submission.requester_id)
        .bind(&submission.lms_callback_url)
        .bind(&submission.queue_name)
        .bind(&submission.xqueue_header)
        .bind(&submission.xqueue_body)
        .bind(&submission.urls)
        .bind(&submission.keys)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get::<i64, _>("id"))
    }

    async fn get(&self, id: i64) -> Result<Submission, StorageError> {
        let row: Option<SubmissionRow> =
            sqlx::query_as("SELECT * FROM queue_submission WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(Submission::from).ok_or(StorageError::NotFound(id))
    }

    async fn invalidate_prior(&self, lms_callback_url: &str) -> Result<u64, StorageError> {
        let result =
            sqlx::query("UPDATE queue_submission SET retired = true WHERE lms_callback_url = $1 AND retired = false")
                .bind(lms_callback_url)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn next_pullable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
    ) -> Result<Option<Submission>, StorageError> {
        self.claim(queue, grader_id, processing_delay, "pull_time").await
    }

    async fn next_pushable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
    ) -> Result<Option<Submission>, StorageError> {
        self.claim(queue, grader_id, processing_delay, "push_time").await
    }

    async fn queue_length(&self, queue: &str, processing_delay: Duration) -> Result<i64, StorageError> {
        let eligible_before = Utc::now() - processing_delay;
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM queue_submission
             WHERE queue_name = $1 AND retired = false
               AND (pull_time IS NULL OR pull_time <= $2)",
        )
        .bind(queue)
        .bind(eligible_before)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get::<i64, _>("n"))
    }

    async fn update(&self, submission: &Submission) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE queue_submission SET
                pull_time = $2, push_time = $3, return_time = $4,
                grader_id = $5, pullkey = $6, grader_reply = $7,
                num_failures = $8, lms_ack = $9, retired = $10,
                urls = $11, keys = $12
             WHERE id = $1 AND retired = false",
        )
        .bind(submission.id)
        .bind(submission.pull_time)
        .bind(submission.push_time)
        .bind(submission.return_time)
        .bind(&submission.grader_id)
        .bind(&submission.pullkey)
        .bind(&submission.grader_reply)
        .bind(submission.num_failures)
        .bind(submission.lms_ack)
        .bind(submission.retired)
        .bind(&submission.urls)
        .bind(&submission.keys)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>, chunk_size: u32) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "WITH victims AS (
                SELECT id FROM queue_submission WHERE arrival_time <= $1 LIMIT $2
             )
             DELETE FROM queue_submission WHERE id IN (SELECT id FROM victims)",
        )
        .bind(cutoff)
        .bind(i64::from(chunk_size))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    /// Increments `num_failures` and conditionally clears `pull_time`/`pullkey` in
    /// the same statement that selects the stale rows, so there is no gap between
    /// a row lock and a later blind write for `put_result` (racing via `get`/
    /// `update`) to land in — the requeue decision and the write are one atomic
    /// `UPDATE ... RETURNING`, the same shape `claim` uses for `next_pullable`/
    /// `next_pushable`.
    async fn requeue_stale_pulls(
        &self,
        queue: Option<&str>,
        pull_timeout: Duration,
        max_failures: i32,
    ) -> Result<Vec<Submission>, StorageError> {
        let cutoff = Utc::now() - pull_timeout;
        let rows: Vec<SubmissionRow> = if let Some(queue) = queue {
            sqlx::query_as(
                "UPDATE queue_submission
                 SET num_failures = num_failures + 1,
                     pull_time = CASE WHEN num_failures + 1 < $3 THEN NULL ELSE pull_time END,
                     pullkey = CASE WHEN num_failures + 1 < $3 THEN '' ELSE pullkey END
                 WHERE queue_name = $1 AND retired = false
                   AND pull_time IS NOT NULL AND pull_time <= $2
                 RETURNING *",
            )
            .bind(queue)
            .bind(cutoff)
            .bind(max_failures)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        } else {
            sqlx::query_as(
                "UPDATE queue_submission
                 SET num_failures = num_failures + 1,
                     pull_time = CASE WHEN num_failures + 1 < $2 THEN NULL ELSE pull_time END,
                     pullkey = CASE WHEN num_failures + 1 < $2 THEN '' ELSE pullkey END
                 WHERE retired = false
                   AND pull_time IS NOT NULL AND pull_time <= $1
                 RETURNING *",
            )
            .bind(cutoff)
            .bind(max_failures)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        };

        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn scan_failed(&self, queue: Option<&str>, threshold: i32) -> Result<Vec<Submission>, StorageError> {
        let rows: Vec<SubmissionRow> = if let Some(queue) = queue {
            sqlx::query_as(
                "SELECT * FROM queue_submission
                 WHERE queue_name = $1 AND retired = false AND num_failures >= $2
                 ORDER BY arrival_time ASC",
            )
            .bind(queue)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        } else {
            sqlx::query_as(
                "SELECT * FROM queue_submission
                 WHERE retired = false AND num_failures >= $1
                 ORDER BY arrival_time ASC",
            )
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        };
        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn scan_unretired_for_queue(
        &self,
        queue: &str,
        arrival_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Submission>, StorageError> {
        let rows: Vec<SubmissionRow> = if let Some(before) = arrival_before {
            sqlx::query_as(
                "SELECT * FROM queue_submission
                 WHERE queue_name = $1 AND retired = false AND arrival_time <= $2
                 ORDER BY arrival_time ASC",
            )
            .bind(queue)
            .bind(before)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        } else {
            sqlx::query_as(
                "SELECT * FROM queue_submission
                 WHERE queue_name = $1 AND retired = false
                 ORDER BY arrival_time ASC",
            )
            .bind(queue)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
        };
        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn scan_orphans(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<Vec<Submission>, StorageError> {
        let rows: Vec<SubmissionRow> = sqlx::query_as(
            "SELECT * FROM queue_submission
             WHERE queue_name = $1 AND retired = false
               AND push_time IS NULL AND return_time IS NULL
               AND arrival_time <= $2
             ORDER BY arrival_time ASC",
        )
        .bind(queue)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn count_unretired_by_queue(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query(
            "SELECT queue_name, COUNT(*) AS n FROM queue_submission
             WHERE retired = false
             GROUP BY queue_name
             ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("queue_name"), r.get::<i64, _>("n")))
            .collect())
    }
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use super::*;
    use xqueue_core::NewSubmission;

    async fn test_store() -> PostgresSubmissionStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
        PostgresSubmissionStore::connect(&url, 5).await.unwrap()
    }

    fn sample(queue: &str) -> NewSubmission {
        NewSubmission {
            requester_id: "127.0.0.1".into(),
            lms_callback_url: format!("http://lms/cb/{}", uuid::Uuid::new_v4()),
            queue_name: queue.into(),
            xqueue_header: "{}".into(),
            xqueue_body: "print(1)".into(),
            urls: "{}".into(),
            keys: "{}".into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = test_store().await;
        let id = store.create(sample("test-pull")).await.unwrap();
        let got = store.get(id).await.unwrap();
        assert_eq!(got.queue_name, "test-pull");
        assert!(!got.retired);
    }

    #[tokio::test]
    async fn next_pullable_is_not_handed_out_twice() {
        let store = test_store().await;
        let id = store.create(sample("test-pull")).await.unwrap();
        let a = store
            .next_pullable("test-pull", "grader-a", Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(a.unwrap().id, id);
        let b = store
            .next_pullable("test-pull", "grader-b", Duration::seconds(60))
            .await
            .unwrap();
        // the row is now within its grace period, so it must not reappear
        assert!(b.is_none() || b.unwrap().id != id);
    }

    #[tokio::test]
    async fn invalidate_prior_retires_matching_rows() {
        let store = test_store().await;
        let mut s = sample("test-pull");
        s.lms_callback_url = "http://lms/cb/dedup".into();
        store.create(s.clone()).await.unwrap();
        let affected = store.invalidate_prior(&s.lms_callback_url).await.unwrap();
        assert_eq!(affected, 1);
    }
}
