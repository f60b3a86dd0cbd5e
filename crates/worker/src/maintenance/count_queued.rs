use std::sync::Arc;

use xqueue_store::SubmissionStore;

use super::TelemetrySink;

/// Counts unretired submissions grouped by queue, ordered by descending
/// count, and emits them to `sink` in addition to always logging the table.
pub async fn count_queued_submissions(
    store: &Arc<dyn SubmissionStore>,
    sink: &dyn TelemetrySink,
) -> Result<Vec<(String, i64)>, xqueue_core::error::StorageError> {
    let counts = store.count_unretired_by_queue().await?;
    sink.emit(&counts).await;
    Ok(counts)
}
