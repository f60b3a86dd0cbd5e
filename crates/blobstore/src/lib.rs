mod memory;
mod filesystem;

pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use xqueue_core::error::BlobError;

/// Object-store abstraction used for uploaded submission files and for the
/// oversized `urls`/`keys` JSON blobs spilled out of the submission row.
///
/// Paths are of the form `<queue_name>/<key>`; no other assumptions are made
/// about the path shape. An S3-backed implementation is a drop-in behind this
/// trait and is not built here.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), BlobError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;

    /// The public URL at which `path` can later be fetched.
    fn url(&self, path: &str) -> String;
}
