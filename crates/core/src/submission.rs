use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum persisted length of `lms_callback_url` and `queue_name` columns.
///
/// Mirrors the reference system's `CHARFIELD_LEN_SMALL`. Values longer than
/// this are truncated on intake, not rejected.
pub const CHARFIELD_LEN_SMALL: usize = 128;

/// Maximum persisted length of the serialized `urls`/`keys` JSON columns.
///
/// Mirrors the reference system's `CHARFIELD_LEN_LARGE`. A mapping that would
/// serialize past this length is spilled to the blob store and replaced by a
/// sentinel (see [`crate::submission::URL_SENTINEL_KEY`]).
pub const CHARFIELD_LEN_LARGE: usize = 1024;

/// Sentinel key under which the blob-store URL for an oversized `urls` map is stored.
pub const URL_SENTINEL_KEY: &str = "URL_FOR_EXTERNAL_DICTS";

/// Sentinel key under which the blob-store URL for an oversized `keys` map is stored.
pub const KEY_SENTINEL_KEY: &str = "KEY_FOR_EXTERNAL_DICTS";

/// The durable record describing one LMS-originated grading job through its
/// entire lifecycle. The only persistent entity in the system; every
/// component reads or writes some subset of these fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: i64,
    pub requester_id: String,
    pub lms_callback_url: String,
    pub queue_name: String,
    pub xqueue_header: String,
    pub xqueue_body: String,
    /// Filename → public URL, or the sentinel `{"URL_FOR_EXTERNAL_DICTS": <url>}`.
    pub urls: String,
    /// Filename → storage key, or the sentinel `{"KEY_FOR_EXTERNAL_DICTS": <url>}`.
    pub keys: String,
    pub arrival_time: DateTime<Utc>,
    pub pull_time: Option<DateTime<Utc>>,
    pub push_time: Option<DateTime<Utc>>,
    pub return_time: Option<DateTime<Utc>>,
    pub grader_id: String,
    pub pullkey: String,
    pub grader_reply: String,
    pub num_failures: i32,
    pub lms_ack: bool,
    pub retired: bool,
}

impl Submission {
    /// `true` once the submission has been handed out via pull and not yet requeued.
    pub fn is_pulled(&self) -> bool {
        !self.pullkey.is_empty()
    }

    /// Parses `urls` as a plain `{filename: url}` map, or `None` if it is the sentinel form.
    pub fn urls_map(&self) -> Option<std::collections::BTreeMap<String, String>> {
        serde_json::from_str(&self.urls).ok()
    }

    /// Returns the blob-store path named by the sentinel form of `urls`, if any.
    pub fn urls_sentinel_path(&self) -> Option<String> {
        sentinel_path(&self.urls, URL_SENTINEL_KEY)
    }

    pub fn keys_sentinel_path(&self) -> Option<String> {
        sentinel_path(&self.keys, KEY_SENTINEL_KEY)
    }
}

fn sentinel_path(json: &str, sentinel_key: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get(sentinel_key)?.as_str().map(str::to_owned)
}

/// Fields supplied by the intake handler to create a new submission; server-side
/// fields (`id`, `arrival_time`, `retired`, `num_failures`, `lms_ack`) are set by the store.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub requester_id: String,
    pub lms_callback_url: String,
    pub queue_name: String,
    pub xqueue_header: String,
    pub xqueue_body: String,
    pub urls: String,
    pub keys: String,
}

/// The verdict delivered by a grader, either directly (push) or via `put_result` (pull).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub correct: Option<bool>,
    pub score: f64,
    pub msg: String,
}

impl Verdict {
    /// The HTML snippet the LMS renders to the learner when grading failed outright.
    pub fn failure(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Verdict {
            correct: None,
            score: 0.0,
            msg: format!(r#"<div class="capa_alert">{msg}</div>"#),
        }
    }
}
