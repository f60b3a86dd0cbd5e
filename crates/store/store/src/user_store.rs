use async_trait::async_trait;
use xqueue_core::error::StorageError;

/// The reconcilable user table backing session-cookie authentication (§6,
/// "Session & auth"). Separate from [`crate::SubmissionStore`] since it is
/// keyed by username rather than submission id and is written by a distinct
/// operational path (`update-users`).
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the user if absent, or overwrites its password hash if present.
    async fn upsert_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError>;

    /// Returns the stored password hash, or `None` if no such user exists.
    async fn password_hash(&self, username: &str) -> Result<Option<String>, StorageError>;
}
