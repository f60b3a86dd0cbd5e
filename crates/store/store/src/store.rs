use async_trait::async_trait;
use chrono::{DateTime, Utc};
use xqueue_core::error::StorageError;
use xqueue_core::{NewSubmission, Submission};

/// The durable table of submissions, and the only point of serialization
/// between the HTTP surface, the push worker pool, and the maintenance jobs.
///
/// Every selection method that hands a row to a caller (`next_pullable`,
/// `next_pushable`) must do so under a row-level lock so that two concurrent
/// callers never receive the same row — see the Postgres implementation for
/// the `FOR UPDATE SKIP LOCKED` pattern that provides this.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persists a new submission. `arrival_time`, `retired = false`,
    /// `num_failures = 0`, and `lms_ack = false` are set server-side.
    async fn create(&self, submission: NewSubmission) -> Result<i64, StorageError>;

    async fn get(&self, id: i64) -> Result<Submission, StorageError>;

    /// Marks every unretired row with the given `lms_callback_url` as retired.
    /// Returns the number of rows affected.
    async fn invalidate_prior(&self, lms_callback_url: &str) -> Result<u64, StorageError>;

    /// Atomically selects and stamps the oldest unretired, pull-eligible row for
    /// `queue`, setting `pull_time = now` and `pullkey`. Returns `None` if no
    /// row is eligible.
    async fn next_pullable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: chrono::Duration,
    ) -> Result<Option<Submission>, StorageError>;

    /// Symmetric to [`next_pullable`](Self::next_pullable), stamping `push_time` instead.
    async fn next_pushable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: chrono::Duration,
    ) -> Result<Option<Submission>, StorageError>;

    /// Count of unretired rows for `queue` eligible under the pullable predicate (§4.7).
    async fn queue_length(&self, queue: &str, processing_delay: chrono::Duration) -> Result<i64, StorageError>;

    /// Writes mutable fields back. Refuses silently (no-op, `Ok(false)`) if the
    /// row was already retired by another actor, since `retired` is monotonic.
    async fn update(&self, submission: &Submission) -> Result<bool, StorageError>;

    /// Deletes up to `chunk_size` unretired-or-retired rows with
    /// `arrival_time <= cutoff`, in one transaction. Returns the number deleted.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>, chunk_size: u32) -> Result<u64, StorageError>;

    /// Finds unretired rows with a stale `pull_time` (older than `pull_timeout`),
    /// increments `num_failures` on each, and either clears `pull_time`/`pullkey`
    /// (if still under `max_failures`) or leaves the row for the retire job.
    /// Returns the updated rows.
    async fn requeue_stale_pulls(
        &self,
        queue: Option<&str>,
        pull_timeout: chrono::Duration,
        max_failures: i32,
    ) -> Result<Vec<Submission>, StorageError>;

    /// Unretired rows for `queue` (or all queues, if `None`) with `num_failures >= threshold`.
    async fn scan_failed(&self, queue: Option<&str>, threshold: i32) -> Result<Vec<Submission>, StorageError>;

    /// Unretired rows for `queue`, optionally bounded by `arrival_time <= before`.
    async fn scan_unretired_for_queue(
        &self,
        queue: &str,
        arrival_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Submission>, StorageError>;

    /// Unretired rows for `queue` with `push_time IS NULL AND return_time IS NULL`
    /// and `arrival_time <= cutoff` — the orphan-rescue predicate (§4.6).
    async fn scan_orphans(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<Vec<Submission>, StorageError>;

    /// Grouped unretired counts per queue, ordered descending by count.
    async fn count_unretired_by_queue(&self) -> Result<Vec<(String, i64)>, StorageError>;
}
