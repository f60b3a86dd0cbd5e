use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::error::Envelope;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GetSubmissionParams {
    #[serde(default)]
    queue_name: Option<String>,
}

/// `GET /xqueue/get_submission/`: the pull interface's dispatch step (§4.3).
pub async fn get_submission(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<GetSubmissionParams>,
) -> Response {
    let Some(queue_name) = params.queue_name else {
        return Envelope::<String>::fail("'get_submission' must provide parameter 'queue_name'");
    };

    if state.config.queue(&queue_name).is_none() {
        return Envelope::<String>::fail(format!("Queue '{queue_name}' not found"));
    }

    let processing_delay = chrono::Duration::seconds(state.config.thresholds.processing_delay_seconds);
    let submission = match state.store.next_pullable(&queue_name, &addr.ip().to_string(), processing_delay).await {
        Ok(Some(submission)) => submission,
        Ok(None) => return Envelope::<String>::fail(format!("Queue '{queue_name}' is empty")),
        Err(e) => {
            tracing::error!(error = %e, queue = %queue_name, "next_pullable failed");
            return Envelope::<String>::fail("internal storage error");
        }
    };

    let xqueue_files = if let Some(path) = submission.urls_sentinel_path() {
        let timeout = Duration::from_secs(state.config.thresholds.sentinel_fetch_timeout_seconds);
        match tokio::time::timeout(timeout, state.blobs.get(&path)).await {
            Ok(Ok(bytes)) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => value.get("files").cloned().unwrap_or(serde_json::json!({})).to_string(),
                Err(e) => {
                    tracing::error!(error = %e, path = %path, "spilled file mapping was not valid JSON");
                    return Envelope::<String>::fail(format!(
                        "Error fetching submission for {queue_name}. Please try again."
                    ));
                }
            },
            Ok(Err(e)) => {
                tracing::error!(error = %e, path = %path, "could not fetch spilled file mapping");
                return Envelope::<String>::fail(format!(
                    "Error fetching submission for {queue_name}. Please try again."
                ));
            }
            Err(_) => {
                tracing::error!(path = %path, "spilled file mapping fetch timed out");
                return Envelope::<String>::fail(format!(
                    "Error fetching submission for {queue_name}. Please try again."
                ));
            }
        }
    } else {
        submission.urls.clone()
    };

    let header = serde_json::json!({
        "submission_id": submission.id,
        "submission_key": submission.pullkey,
    });
    let payload = serde_json::json!({
        "xqueue_header": header.to_string(),
        "xqueue_body": submission.xqueue_body,
        "xqueue_files": xqueue_files,
    });

    Envelope::ok(payload.to_string())
}
