use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Multipart, State};
use axum::response::Response;
use serde::Deserialize;
use xqueue_core::hashkey::make_hashkey;
use xqueue_core::submission::{CHARFIELD_LEN_LARGE, CHARFIELD_LEN_SMALL, KEY_SENTINEL_KEY, URL_SENTINEL_KEY};
use xqueue_core::NewSubmission;

use crate::error::Envelope;
use crate::state::AppState;

#[derive(Deserialize)]
struct IntakeHeader {
    lms_callback_url: String,
    // required for a well-formed header but not otherwise consulted here
    #[allow(dead_code)]
    lms_key: String,
    queue_name: String,
}

/// `POST /xqueue/submit/`: the intake handler (§4.2).
///
/// Fields `xqueue_header` and `xqueue_body` arrive as plain multipart text
/// parts; every other part is an uploaded file keyed by its filename.
pub async fn submit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Response {
    let mut xqueue_header: Option<String> = None;
    let mut xqueue_body: Option<String> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Envelope::<String>::fail(format!("malformed upload: {e}")),
        };
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "xqueue_header" => {
                xqueue_header = field.text().await.ok();
            }
            "xqueue_body" => {
                xqueue_body = field.text().await.ok();
            }
            other => {
                let filename = field.file_name().map(str::to_owned).unwrap_or_else(|| other.to_owned());
                let Ok(bytes) = field.bytes().await else {
                    return Envelope::<String>::fail("failed to read uploaded file");
                };
                files.push((filename, bytes.to_vec()));
            }
        }
    }

    let (Some(header), Some(body)) = (xqueue_header, xqueue_body) else {
        return Envelope::<String>::fail("Queue request has invalid format");
    };

    let parsed: Result<IntakeHeader, _> = serde_json::from_str(&header);
    let Ok(parsed) = parsed else {
        return Envelope::<String>::fail("Queue request has invalid format");
    };

    let Some(queue) = state.config.queue(&parsed.queue_name) else {
        return Envelope::<String>::fail(format!("Queue '{}' not found", parsed.queue_name));
    };
    let queue_name = queue.name.clone();

    if let Err(e) = state.store.invalidate_prior(truncate(&parsed.lms_callback_url, CHARFIELD_LEN_SMALL)).await {
        tracing::error!(error = %e, "failed to invalidate prior submissions");
        return Envelope::<String>::fail("internal storage error");
    }

    let mut keys = BTreeMap::new();
    let mut urls = BTreeMap::new();
    for (filename, bytes) in &files {
        let key = make_hashkey(&format!("{header}{filename}"));
        let path = format!("{queue_name}/{key}");
        if let Err(e) = state.blobs.save(&path, bytes).await {
            tracing::error!(error = %e, filename = %filename, "failed to store uploaded file");
            return Envelope::<String>::fail("internal storage error");
        }
        urls.insert(filename.clone(), state.blobs.url(&path));
        keys.insert(filename.clone(), key);
    }

    let mut urls_json = serde_json::to_string(&urls).unwrap_or_default();
    let mut keys_json = serde_json::to_string(&keys).unwrap_or_default();

    if urls_json.len() > CHARFIELD_LEN_LARGE {
        let filenames: Vec<&String> = files.iter().map(|(name, _)| name).collect();
        let spill_key = make_hashkey(&format!("{header}{}", serde_json::to_string(&filenames).unwrap_or_default()));
        let spill_path = format!("{queue_name}/{spill_key}");
        let spill_payload = serde_json::json!({ "files": urls, "keys": keys });
        let spilled = match serde_json::to_vec(&spill_payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize spilled file mapping");
                return Envelope::<String>::fail("internal storage error");
            }
        };
        if let Err(e) = state.blobs.save(&spill_path, &spilled).await {
            tracing::error!(error = %e, "failed to store spilled file mapping");
            return Envelope::<String>::fail("internal storage error");
        }
        urls_json = serde_json::json!({ URL_SENTINEL_KEY: spill_path }).to_string();
        keys_json = serde_json::json!({ KEY_SENTINEL_KEY: spill_key }).to_string();
    }

    let new_submission = NewSubmission {
        requester_id: addr.ip().to_string(),
        lms_callback_url: truncate(&parsed.lms_callback_url, CHARFIELD_LEN_SMALL).to_owned(),
        queue_name: queue_name.clone(),
        xqueue_header: header,
        xqueue_body: body,
        urls: urls_json,
        keys: keys_json,
    };

    if let Err(e) = state.store.create(new_submission).await {
        tracing::error!(error = %e, "failed to persist submission");
        return Envelope::<String>::fail("internal storage error");
    }

    let processing_delay = chrono::Duration::seconds(state.config.thresholds.processing_delay_seconds);
    match state.store.queue_length(&queue_name, processing_delay).await {
        Ok(len) => Envelope::ok(len),
        Err(e) => {
            tracing::error!(error = %e, "failed to read queue length after submit");
            Envelope::<String>::fail("internal storage error")
        }
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
