use std::sync::Arc;

use xqueue_blobstore::BlobStore;
use xqueue_client::LmsClient;
use xqueue_core::Config;
use xqueue_store::{SubmissionStore, UserStore};

use crate::auth::SessionConfig;

/// Shared application state passed to every handler.
///
/// Grounded on the teacher's `api::AppState` shape (one `Arc`-wrapped handle per
/// collaborator, `Clone` so axum can hand a copy to each request).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SubmissionStore>,
    pub users: Arc<dyn UserStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub lms: Arc<LmsClient>,
    pub config: Arc<Config>,
    pub session: SessionConfig,
}
