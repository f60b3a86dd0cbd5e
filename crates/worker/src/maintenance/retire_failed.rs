use std::sync::Arc;

use xqueue_client::LmsClient;
use xqueue_core::Thresholds;
use xqueue_store::SubmissionStore;

/// Retires submissions that have accrued `max_number_of_failures` or more
/// failures, notifying the LMS unless `force` is set. `queue` restricts the
/// scan to one queue; `None` scans every queue.
pub async fn retire_failed_submissions(
    store: &Arc<dyn SubmissionStore>,
    lms: &LmsClient,
    queue: Option<&str>,
    thresholds: &Thresholds,
    force: bool,
) -> Result<(), xqueue_core::error::StorageError> {
    tracing::info!(force, "scanning for failed submissions to retire");

    let failed = store
        .scan_failed(queue, thresholds.max_number_of_failures)
        .await?;

    for mut submission in failed {
        tracing::info!(
            id = submission.id,
            queue = %submission.queue_name,
            num_failures = submission.num_failures,
            "retiring failed submission"
        );

        if force {
            submission.retired = true;
        } else {
            submission.lms_ack = lms.post_failure(&submission.xqueue_header, "this submission could not be graded").await;
            submission.retired = submission.lms_ack;
            if !submission.lms_ack {
                tracing::error!(id = submission.id, "could not contact LMS to retire submission");
            }
        }

        store.update(&submission).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xqueue_core::NewSubmission;

    #[tokio::test]
    async fn force_retires_without_contacting_lms() {
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
        submission.num_failures = 5;
        store.update(&submission).await.unwrap();

        let lms = LmsClient::new(std::time::Duration::from_millis(10), None);
        let thresholds = Thresholds {
            max_number_of_failures: 3,
            ..Thresholds::default()
        };

        retire_failed_submissions(&store, &lms, None, &thresholds, true)
            .await
            .unwrap();

        let after = store.get(id).await.unwrap();
        assert!(after.retired);
        assert!(!after.lms_ack);
    }
}
