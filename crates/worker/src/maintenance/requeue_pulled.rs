use std::sync::Arc;

use chrono::Duration;
use xqueue_core::Thresholds;
use xqueue_store::SubmissionStore;

/// Requeues submissions that were pulled but never returned within
/// `pulled_submission_timeout_seconds`, or retires them once they've
/// accrued too many failures. `queue` restricts the scan to one queue;
/// `None` scans every queue.
pub async fn requeue_pulled_submissions(
    store: &Arc<dyn SubmissionStore>,
    queue: Option<&str>,
    thresholds: &Thresholds,
) -> Result<(), xqueue_core::error::StorageError> {
    tracing::info!("scanning for stale pulled submissions");

    let updated = store
        .requeue_stale_pulls(
            queue,
            Duration::seconds(thresholds.pulled_submission_timeout_seconds),
            thresholds.max_number_of_failures,
        )
        .await?;

    for submission in &updated {
        if submission.pull_time.is_none() {
            tracing::info!(
                id = submission.id,
                queue = %submission.queue_name,
                "requeued submission outstanding past pull timeout"
            );
        } else {
            tracing::warn!(
                id = submission.id,
                queue = %submission.queue_name,
                num_failures = submission.num_failures,
                max = thresholds.max_number_of_failures,
                "not requeueing submission, failure count exceeds maximum"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xqueue_core::NewSubmission;

    #[tokio::test]
    async fn requeues_outstanding_pull_and_caps_after_max_failures() {
        let store: Arc<dyn SubmissionStore> = Arc::new(crate::testing::InMemoryStore::default());
        let id = store
            .create(NewSubmission {
                requester_id: "127.0.0.1".into(),
                lms_callback_url: "http://lms/cb".into(),
                queue_name: "q".into(),
                xqueue_header: "{}".into(),
                xqueue_body: "body".into(),
                urls: "{}".into(),
                keys: "{}".into(),
            })
            .await
            .unwrap();

        let mut submission = store.get(id).await.unwrap();
        submission.pull_time = Some(chrono::Utc::now() - Duration::seconds(120));
        submission.pullkey = "k".into();
        store.update(&submission).await.unwrap();

        let thresholds = Thresholds {
            pulled_submission_timeout_seconds: 10,
            max_number_of_failures: 3,
            ..Thresholds::default()
        };

        requeue_pulled_submissions(&store, None, &thresholds).await.unwrap();

        let after = store.get(id).await.unwrap();
        assert_eq!(after.num_failures, 1);
        assert!(after.pull_time.is_none());
        assert!(after.pullkey.is_empty());
    }
}
