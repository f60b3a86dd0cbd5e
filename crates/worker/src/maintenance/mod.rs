//! Periodic maintenance jobs (§4.6): requeue, retire, delete, orphan-rescue,
//! and queue-length accounting. Each job is a free function over a
//! `SubmissionStore` so it can be driven either by the server's
//! `tokio::time::interval` scheduler or one-shot from the CLI.

mod count_queued;
mod delete_old;
mod push_orphaned;
mod requeue_pulled;
mod retire_failed;
mod retire_old;
mod telemetry;
mod update_users;

pub use count_queued::count_queued_submissions;
pub use delete_old::delete_old_submissions;
pub use push_orphaned::push_orphaned_submissions;
pub use requeue_pulled::requeue_pulled_submissions;
pub use retire_failed::retire_failed_submissions;
pub use retire_old::retire_old_submissions;
pub use telemetry::{StdoutTelemetrySink, TelemetrySink, TracingTelemetrySink};
pub use update_users::update_users;
