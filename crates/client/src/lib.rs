mod grader;
mod lms;

pub use grader::{CannedGraderClient, GraderClient, GraderReply, HttpGraderClient};
pub use lms::LmsClient;
