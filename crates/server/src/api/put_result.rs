use axum::extract::{Form, State};
use axum::response::Response;
use serde::Deserialize;

use crate::error::Envelope;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PutResultForm {
    xqueue_header: String,
    xqueue_body: String,
}

#[derive(Deserialize)]
struct ResultHeader {
    submission_id: i64,
    submission_key: String,
}

/// `POST /xqueue/put_result/`: graders post their verdicts here (§4.3 step 3).
pub async fn put_result(State(state): State<AppState>, Form(form): Form<PutResultForm>) -> Response {
    let Ok(header) = serde_json::from_str::<ResultHeader>(&form.xqueue_header) else {
        return Envelope::<String>::fail("Incorrect reply format");
    };
    if header.submission_key.is_empty() {
        return Envelope::<String>::fail("Incorrect reply format");
    }

    let mut submission = match state.store.get(header.submission_id).await {
        Ok(submission) => submission,
        Err(_) => return Envelope::<String>::fail("Submission does not exist"),
    };

    if !submission.is_pulled() || header.submission_key != submission.pullkey {
        return Envelope::<String>::fail("Incorrect key for submission");
    }

    submission.return_time = Some(chrono::Utc::now());
    submission.grader_reply = form.xqueue_body;

    let lms_ack = state.lms.post_verdict(&submission.xqueue_header, &submission.grader_reply).await;
    submission.lms_ack = lms_ack;
    if !lms_ack {
        submission.num_failures += 1;
    }

    submission.retired = if submission.num_failures > state.config.thresholds.max_number_of_failures {
        true
    } else {
        submission.lms_ack
    };

    match state.store.update(&submission).await {
        Ok(true) => Envelope::ok(""),
        Ok(false) => {
            tracing::warn!(submission_id = submission.id, "put_result raced a retirement, discarding");
            Envelope::<String>::fail("Submission does not exist")
        }
        Err(e) => {
            tracing::error!(error = %e, submission_id = submission.id, "failed to persist put_result");
            Envelope::<String>::fail("internal storage error")
        }
    }
}
