use chrono::{DateTime, Utc};
use xqueue_core::Submission;

/// Raw row shape for `sqlx::query_as`. Kept separate from [`Submission`] so
/// `xqueue-core` does not need to depend on `sqlx`.
#[derive(sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: i64,
    pub requester_id: String,
    pub lms_callback_url: String,
    pub queue_name: String,
    pub xqueue_header: String,
    pub xqueue_body: String,
    pub urls: String,
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

impl From<SubmissionRow> for Submission {
    fn from(row: SubmissionRow) -> Self {
        Submission {
            id: row.id,
            requester_id: row.requester_id,
            lms_callback_url: row.lms_callback_url,
            queue_name: row.queue_name,
            xqueue_header: row.xqueue_header,
            xqueue_body: row.xqueue_body,
            urls: row.urls,
            keys: row.keys,
            arrival_time: row.arrival_time,
            pull_time: row.pull_time,
            push_time: row.push_time,
            return_time: row.return_time,
            grader_id: row.grader_id,
            pullkey: row.pullkey,
            grader_reply: row.grader_reply,
            num_failures: row.num_failures,
            lms_ack: row.lms_ack,
            retired: row.retired,
        }
    }
}
