pub mod config;
pub mod error;
pub mod hashkey;
pub mod submission;

pub use config::{Config, QueueConfig, QueueKind, Thresholds};
pub use error::XqueueError;
pub use hashkey::make_hashkey;
pub use submission::{NewSubmission, Submission, Verdict};
