use std::collections::BTreeMap;

use serde::Deserialize;

/// Whether a queue forwards submissions to a preconfigured grader (`Push`) or
/// waits for an external poller to claim them (`Pull`). A queue is one or the
/// other, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueKind {
    Push { grader_url: String },
    Pull,
}

/// One configured queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub name: String,
    pub kind: QueueKind,
}

impl QueueConfig {
    pub fn grader_url(&self) -> Option<&str> {
        match &self.kind {
            QueueKind::Push { grader_url } => Some(grader_url),
            QueueKind::Pull => None,
        }
    }
}

/// Raw `[[queues]]` table entry as it appears in TOML; `grader_url = None` means pull-only.
#[derive(Debug, Deserialize)]
struct RawQueueConfig {
    name: String,
    grader_url: Option<String>,
}

/// Timing thresholds that govern double-dispatch protection, retries, and retirement.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Δ: in-flight grace period, in seconds, before a pulled/pushed row becomes
    /// eligible for re-selection. No canonical upstream default exists for this
    /// value (see `SPEC_FULL.md` design notes); 60s is a conservative default.
    #[serde(default = "default_processing_delay_seconds")]
    pub processing_delay_seconds: i64,

    /// Hard deadline for a grader HTTP call.
    #[serde(default = "default_grading_timeout_seconds")]
    pub grading_timeout_seconds: u64,

    /// Short deadline for an LMS callback HTTP call.
    #[serde(default = "default_requests_timeout_seconds")]
    pub requests_timeout_seconds: u64,

    /// Timeout for fetching a sentinel-blob file mapping during `get_submission`.
    #[serde(default = "default_sentinel_fetch_timeout_seconds")]
    pub sentinel_fetch_timeout_seconds: u64,

    /// Age after which a pulled-but-unreturned row is requeued.
    #[serde(default = "default_pulled_submission_timeout_seconds")]
    pub pulled_submission_timeout_seconds: i64,

    /// Age after which a never-dispatched row is eligible for orphan rescue.
    #[serde(default = "default_orphaned_submission_timeout_seconds")]
    pub orphaned_submission_timeout_seconds: i64,

    /// Number of failures a submission may accrue before the retire jobs act on it.
    #[serde(default = "default_max_number_of_failures")]
    pub max_number_of_failures: i32,

    /// Poll interval for an idle push worker.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            processing_delay_seconds: default_processing_delay_seconds(),
            grading_timeout_seconds: default_grading_timeout_seconds(),
            requests_timeout_seconds: default_requests_timeout_seconds(),
            sentinel_fetch_timeout_seconds: default_sentinel_fetch_timeout_seconds(),
            pulled_submission_timeout_seconds: default_pulled_submission_timeout_seconds(),
            orphaned_submission_timeout_seconds: default_orphaned_submission_timeout_seconds(),
            max_number_of_failures: default_max_number_of_failures(),
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

fn default_processing_delay_seconds() -> i64 {
    60
}
fn default_grading_timeout_seconds() -> u64 {
    30
}
fn default_requests_timeout_seconds() -> u64 {
    5
}
fn default_sentinel_fetch_timeout_seconds() -> u64 {
    2
}
fn default_pulled_submission_timeout_seconds() -> i64 {
    10
}
fn default_orphaned_submission_timeout_seconds() -> i64 {
    30
}
fn default_max_number_of_failures() -> i32 {
    3
}
fn default_poll_interval_seconds() -> u64 {
    2
}

/// Immutable process-wide configuration, loaded once at startup from a TOML file
/// with `XQUEUE_`-prefixed environment overrides, and threaded through
/// constructors as `Arc<Config>`. Never mutated at runtime.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queues: Vec<QueueConfig>,
    pub thresholds: Thresholds,
    pub lms: LmsConfig,
    pub blob_store: BlobStoreConfig,
    pub server: ServerSection,
    pub users: BTreeMap<String, String>,
}

impl Config {
    pub fn queue(&self, name: &str) -> Option<&QueueConfig> {
        self.queues.iter().find(|q| q.name == name)
    }

    pub fn push_queues(&self) -> impl Iterator<Item = &QueueConfig> {
        self.queues
            .iter()
            .filter(|q| matches!(q.kind, QueueKind::Push { .. }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LmsConfig {
    /// Optional HTTP Basic-auth credentials applied to every LMS callback attempt.
    pub basic_auth: Option<BasicAuthConfig>,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self { basic_auth: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobStoreConfig {
    #[serde(default = "default_blob_root")]
    pub root_dir: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_blob_root(),
            base_url: default_base_url(),
        }
    }
}

fn default_blob_root() -> String {
    "./data/blobs".to_owned()
}
fn default_base_url() -> String {
    "http://localhost:8000/files".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_session_secret")]
    pub session_secret: String,
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: i64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_secret: default_session_secret(),
            session_ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}
fn default_port() -> u16 {
    8000
}
fn default_session_secret() -> String {
    "change-me-in-production".to_owned()
}
fn default_session_ttl_seconds() -> i64 {
    3600
}

/// Raw deserialization shape of the TOML config file; converted into [`Config`]
/// by [`RawConfig::into_config`] so the queue list can be validated and the
/// push/pull split computed once.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub database_url: String,
    #[serde(default)]
    queues: Vec<RawQueueConfig>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub lms: LmsConfig,
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

impl RawConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn into_config(self) -> Config {
        let queues = self
            .queues
            .into_iter()
            .map(|q| QueueConfig {
                name: q.name,
                kind: match q.grader_url {
                    Some(grader_url) => QueueKind::Push { grader_url },
                    None => QueueKind::Pull,
                },
            })
            .collect();
        Config {
            database_url: self.database_url,
            queues,
            thresholds: self.thresholds,
            lms: self.lms,
            blob_store: self.blob_store,
            server: self.server,
            users: self.users,
        }
    }
}
