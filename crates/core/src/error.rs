use thiserror::Error;

/// Error taxonomy shared by every component of the dispatcher.
///
/// The HTTP layer (`xqueue-server`) maps each variant to the `{return_code,
/// content}` envelope; worker loops log and continue past everything except
/// `Config`, which is fatal at startup.
#[derive(Debug, Error)]
pub enum XqueueError {
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("submission {0} not found")]
    NotFound(i64),

    #[error("pullkey mismatch for submission {0}")]
    PullkeyMismatch(i64),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors from the submission store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("submission {0} not found")]
    NotFound(i64),

    #[error("refused to overwrite a retired submission ({0})")]
    AlreadyRetired(i64),
}

/// Errors from the blob store seam.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found at {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("fetch timed out at {0}")]
    Timeout(String),
}

/// Errors from outbound HTTP clients (grader, LMS callback).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("non-success status {status}: {body}")]
    Status { status: u16, body: String },
}
