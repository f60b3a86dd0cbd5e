use std::sync::Arc;

use chrono::Utc;
use xqueue_client::{GraderClient, LmsClient};
use xqueue_core::config::QueueConfig;
use xqueue_core::submission::Verdict;
use xqueue_core::Thresholds;
use xqueue_store::SubmissionStore;

/// Pushes submissions that arrived but were never picked up by a push worker
/// (`push_time` and `return_time` both unset) to the queue's grader, one shot,
/// retiring regardless of outcome. `num_failures` is incremented exactly once,
/// only when the push attempt fails — not unconditionally before the attempt
/// as the reference command does, since that double-counts every failure.
pub async fn push_orphaned_submissions(
    store: &Arc<dyn SubmissionStore>,
    grader: &Arc<dyn GraderClient>,
    lms: &LmsClient,
    queue: &QueueConfig,
    thresholds: &Thresholds,
) -> Result<(), xqueue_core::error::StorageError> {
    let cutoff = Utc::now() - chrono::Duration::seconds(thresholds.orphaned_submission_timeout_seconds);
    let orphans = store.scan_orphans(&queue.name, cutoff).await?;
    let grader_id = queue.grader_url().unwrap_or_default().to_owned();

    for mut submission in orphans {
        tracing::info!(
            id = submission.id,
            queue = %submission.queue_name,
            header = %submission.xqueue_header,
            "found orphaned submission"
        );

        submission.grader_id = grader_id.clone();
        submission.push_time = Some(Utc::now());

        match grader.respond(&submission.xqueue_body, &submission.urls).await {
            Ok(reply) => {
                submission.grader_reply = reply.0.clone();
                submission.return_time = Some(Utc::now());
                submission.lms_ack = lms.post_verdict(&submission.xqueue_header, &reply.0).await;
            }
            Err(e) => {
                submission.return_time = Some(Utc::now());
                tracing::error!(id = submission.id, grader_id = %submission.grader_id, error = %e, "orphan push failed");
                submission.num_failures += 1;
                let failure = Verdict::failure(format!("Unable to deliver your submission to grader: {e}"));
                let body = serde_json::to_string(&failure).unwrap_or_default();
                submission.lms_ack = lms.post_verdict(&submission.xqueue_header, &body).await;
            }
        }

        submission.retired = true;
        store.update(&submission).await?;
    }

    Ok(())
}
