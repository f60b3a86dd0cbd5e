//! An in-memory `SubmissionStore` used only by this crate's own unit tests.
//! Not a general-purpose test double for other crates — those seed a real
//! Postgres instance (see `xqueue-store-postgres`'s `integration` feature).

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use xqueue_core::error::StorageError;
use xqueue_core::hashkey::make_hashkey;
use xqueue_core::{NewSubmission, Submission};
use xqueue_store::SubmissionStore;

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Submission>>,
    next_id: Mutex<i64>,
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn create(&self, submission: NewSubmission) -> Result<i64, StorageError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;
        self.rows.lock().unwrap().push(Submission {
            id,
            requester_id: submission.requester_id,
            lms_callback_url: submission.lms_callback_url,
            queue_name: submission.queue_name,
            xqueue_header: submission.xqueue_header,
            xqueue_body: submission.xqueue_body,
            urls: submission.urls,
            keys: submission.keys,
            arrival_time: Utc::now(),
            pull_time: None,
            push_time: None,
            return_time: None,
            grader_id: String::new(),
            pullkey: String::new(),
            grader_reply: String::new(),
            num_failures: 0,
            lms_ack: false,
            retired: false,
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Submission, StorageError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn invalidate_prior(&self, lms_callback_url: &str) -> Result<u64, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let mut n = 0;
        for row in rows.iter_mut() {
            if row.lms_callback_url == lms_callback_url && !row.retired {
                row.retired = true;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn next_pullable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
    ) -> Result<Option<Submission>, StorageError> {
        self.claim(queue, grader_id, processing_delay, true)
    }

    async fn next_pushable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
    ) -> Result<Option<Submission>, StorageError> {
        self.claim(queue, grader_id, processing_delay, false)
    }

    async fn queue_length(&self, queue: &str, processing_delay: Duration) -> Result<i64, StorageError> {
        let now = Utc::now();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|s| {
                s.queue_name == queue
                    && !s.retired
                    && s.pull_time.map(|t| t <= now - processing_delay).unwrap_or(true)
            })
            .count() as i64)
    }

    async fn update(&self, submission: &Submission) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|s| s.id == submission.id) {
            if row.retired {
                return Ok(false);
            }
            *row = submission.clone();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>, chunk_size: u32) -> Result<u64, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let mut deleted = 0u64;
        rows.retain(|s| {
            if deleted < u64::from(chunk_size) && s.arrival_time <= cutoff {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn requeue_stale_pulls(
        &self,
        queue: Option<&str>,
        pull_timeout: Duration,
        max_failures: i32,
    ) -> Result<Vec<Submission>, StorageError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if row.retired {
                continue;
            }
            if queue.is_some_and(|q| q != row.queue_name) {
                continue;
            }
            let Some(pull_time) = row.pull_time else { continue };
            if pull_time > now - pull_timeout {
                continue;
            }
            row.num_failures += 1;
            if row.num_failures < max_failures {
                row.pull_time = None;
                row.pullkey = String::new();
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn scan_failed(&self, queue: Option<&str>, threshold: i32) -> Result<Vec<Submission>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|s| !s.retired && s.num_failures >= threshold)
            .filter(|s| queue.is_none_or(|q| q == s.queue_name))
            .cloned()
            .collect())
    }

    async fn scan_unretired_for_queue(
        &self,
        queue: &str,
        arrival_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Submission>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|s| !s.retired && s.queue_name == queue)
            .filter(|s| arrival_before.is_none_or(|before| s.arrival_time <= before))
            .cloned()
            .collect())
    }

    async fn scan_orphans(&self, queue: &str, cutoff: DateTime<Utc>) -> Result<Vec<Submission>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|s| {
                !s.retired
                    && s.queue_name == queue
                    && s.push_time.is_none()
                    && s.return_time.is_none()
                    && s.arrival_time <= cutoff
            })
            .cloned()
            .collect())
    }

    async fn count_unretired_by_queue(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = self.rows.lock().unwrap();
        let mut counts: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
        for row in rows.iter().filter(|s| !s.retired) {
            *counts.entry(row.queue_name.clone()).or_default() += 1;
        }
        let mut v: Vec<_> = counts.into_iter().collect();
        v.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(v)
    }
}

impl InMemoryStore {
    fn claim(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: Duration,
        is_pull: bool,
    ) -> Result<Option<Submission>, StorageError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let candidate = rows
            .iter_mut()
            .filter(|s| s.queue_name == queue && !s.retired)
            .filter(|s| {
                let ts = if is_pull { s.pull_time } else { s.push_time };
                ts.map(|t| t <= now - processing_delay).unwrap_or(true)
            })
            .min_by_key(|s| s.arrival_time);

        let Some(row) = candidate else { return Ok(None) };
        if is_pull {
            row.pull_time = Some(now);
            row.pullkey = make_hashkey(&format!("{now}:{}", row.id));
        } else {
            row.push_time = Some(now);
        }
        row.grader_id = grader_id.to_owned();
        Ok(Some(row.clone()))
    }
}
