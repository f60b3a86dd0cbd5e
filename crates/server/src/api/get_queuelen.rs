use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::error::Envelope;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GetQueuelenParams {
    #[serde(default)]
    queue_name: Option<String>,
}

pub async fn get_queuelen(State(state): State<AppState>, Query(params): Query<GetQueuelenParams>) -> Response {
    let Some(queue_name) = params.queue_name else {
        return Envelope::<String>::fail("'get_queuelen' must provide parameter 'queue_name'");
    };

    if state.config.queue(&queue_name).is_none() {
        let names: Vec<&str> = state.config.queues.iter().map(|q| q.name.as_str()).collect();
        return Envelope::<String>::fail(format!("Valid queue names are: {}", names.join(", ")));
    }

    let processing_delay = chrono::Duration::seconds(state.config.thresholds.processing_delay_seconds);
    match state.store.queue_length(&queue_name, processing_delay).await {
        Ok(len) => Envelope::ok(len),
        Err(e) => {
            tracing::error!(error = %e, queue = %queue_name, "failed to read queue length");
            Envelope::<String>::fail("internal storage error")
        }
    }
}
