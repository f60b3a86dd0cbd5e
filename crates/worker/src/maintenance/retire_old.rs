use std::sync::Arc;

use chrono::{DateTime, Utc};
use xqueue_client::LmsClient;
use xqueue_store::SubmissionStore;

/// Retires every unretired submission in `queue` that arrived before
/// `retire_before` (or every unretired submission in the queue, if
/// `retire_before` is `None`). Notifies the LMS but retires regardless of
/// whether the callback succeeds.
pub async fn retire_old_submissions(
    store: &Arc<dyn SubmissionStore>,
    lms: &LmsClient,
    queue: &str,
    retire_before: Option<DateTime<Utc>>,
) -> Result<(), xqueue_core::error::StorageError> {
    let submissions = store.scan_unretired_for_queue(queue, retire_before).await?;

    for mut submission in submissions {
        tracing::info!(id = submission.id, queue = %submission.queue_name, "retiring old submission");

        submission.retired = true;
        submission.lms_ack = lms
            .post_failure(&submission.xqueue_header, "this submission has expired, please resubmit")
            .await;
        if !submission.lms_ack {
            tracing::error!(id = submission.id, "could not contact LMS to retire submission, retired anyway");
        }

        store.update(&submission).await?;
    }

    Ok(())
}
