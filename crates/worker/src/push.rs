use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use xqueue_client::GraderClient;
use xqueue_client::LmsClient;
use xqueue_core::config::QueueConfig;
use xqueue_core::submission::Verdict;
use xqueue_core::Thresholds;
use xqueue_store::SubmissionStore;

/// Runs the push worker loop for one queue until `shutdown` fires.
///
/// One shot per submission: a grader failure is terminal (§4.4) — only the
/// failure notification goes to the LMS, the row always retires at the end of
/// the iteration regardless of outcome.
pub async fn run_push_worker(
    queue: QueueConfig,
    store: Arc<dyn SubmissionStore>,
    grader: Arc<dyn GraderClient>,
    lms: Arc<LmsClient>,
    thresholds: Thresholds,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let processing_delay = chrono::Duration::seconds(thresholds.processing_delay_seconds);
    let grader_url = queue.grader_url().unwrap_or_default().to_owned();

    loop {
        if *shutdown.borrow() {
            return;
        }

        let claimed = store
            .next_pushable(&queue.name, &grader_url, processing_delay)
            .await;

        let mut submission = match claimed {
            Ok(Some(submission)) => submission,
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(thresholds.poll_interval_seconds)) => continue,
                    _ = shutdown.changed() => return,
                }
            }
            Err(e) => {
                tracing::error!(queue = %queue.name, error = %e, "next_pushable failed");
                tokio::time::sleep(Duration::from_secs(thresholds.poll_interval_seconds)).await;
                continue;
            }
        };

        let files = submission.urls.clone();
        match grader.respond(&submission.xqueue_body, &files).await {
            Ok(reply) => {
                submission.grader_reply = reply.0.clone();
                submission.lms_ack = lms.post_verdict(&submission.xqueue_header, &reply.0).await;
            }
            Err(e) => {
                tracing::warn!(queue = %queue.name, submission_id = submission.id, error = %e, "grader call failed");
                submission.num_failures += 1;
                let failure = Verdict::failure(format!("Unable to deliver your submission to grader: {e}"));
                let body = serde_json::to_string(&failure).unwrap_or_default();
                submission.lms_ack = lms.post_verdict(&submission.xqueue_header, &body).await;
            }
        }

        submission.return_time = Some(Utc::now());
        submission.retired = true;

        if let Err(e) = store.update(&submission).await {
            tracing::error!(submission_id = submission.id, error = %e, "failed to record push outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xqueue_core::config::QueueKind;
    use xqueue_core::NewSubmission;

    #[tokio::test]
    async fn successful_grade_retires_with_ack() {
        let store = Arc::new(crate::testing::InMemoryStore::default());
        let id = store
            .create(NewSubmission {
                requester_id: "127.0.0.1".into(),
                lms_callback_url: "http://lms/cb".into(),
                queue_name: "q".into(),
                xqueue_header: r#"{"lms_callback_url":"http://lms/cb"}"#.into(),
                xqueue_body: "src".into(),
                urls: "{}".into(),
                keys: "{}".into(),
            })
            .await
            .unwrap();

        let grader = Arc::new(xqueue_client::CannedGraderClient::ok(r#"{"correct":true}"#));
        let lms = Arc::new(LmsClient::new(Duration::from_millis(10), None));
        let (tx, rx) = tokio::sync::watch::channel(false);

        let queue = QueueConfig {
            name: "q".into(),
            kind: QueueKind::Push {
                grader_url: "http://grader".into(),
            },
        };
        let store_dyn: Arc<dyn SubmissionStore> = store.clone();

        let handle = tokio::spawn(run_push_worker(
            queue,
            store_dyn,
            grader,
            lms,
            Thresholds {
                poll_interval_seconds: 0,
                ..Thresholds::default()
            },
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let _ = handle.await;

        let updated = store.get(id).await.unwrap();
        assert!(updated.retired);
        assert_eq!(updated.grader_reply, r#"{"correct":true}"#);
    }
}
