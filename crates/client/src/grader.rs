use std::time::Duration;

use async_trait::async_trait;
use xqueue_core::error::ClientError;

/// The grader's raw reply body, persisted verbatim into `Submission::grader_reply`
/// and forwarded unchanged to the LMS.
#[derive(Debug, Clone)]
pub struct GraderReply(pub String);

/// What the reference system's duck-typed test-harness grader stubs become:
/// one method, two concrete variants (a canned test double and a real HTTP
/// proxy to the configured grader endpoint).
#[async_trait]
pub trait GraderClient: Send + Sync {
    async fn respond(&self, xqueue_body: &str, xqueue_files: &str) -> Result<GraderReply, ClientError>;
}

/// Posts `{xqueue_body, xqueue_files}` to a configured grader URL with a hard
/// deadline. Used by the push worker pool (§4.4) and by `push-orphaned-submissions`.
pub struct HttpGraderClient {
    client: reqwest::Client,
    grader_url: String,
}

impl HttpGraderClient {
    pub fn new(grader_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build grader HTTP client");
        Self {
            client,
            grader_url: grader_url.into(),
        }
    }
}

#[async_trait]
impl GraderClient for HttpGraderClient {
    async fn respond(&self, xqueue_body: &str, xqueue_files: &str) -> Result<GraderReply, ClientError> {
        let payload = serde_json::json!({
            "xqueue_body": xqueue_body,
            "xqueue_files": xqueue_files,
        });
        let response = self
            .client
            .post(&self.grader_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else {
                    ClientError::Connection(e.to_string())
                }
            })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(GraderReply(body))
        } else {
            Err(ClientError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Test double returning a fixed reply or error, standing in for a real grader
/// in unit tests that exercise the push/orphan-rescue logic without a network.
pub struct CannedGraderClient {
    result: Result<String, ClientError>,
}

impl CannedGraderClient {
    pub fn ok(reply: impl Into<String>) -> Self {
        Self {
            result: Ok(reply.into()),
        }
    }

    pub fn failing(error: ClientError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl GraderClient for CannedGraderClient {
    async fn respond(&self, _xqueue_body: &str, _xqueue_files: &str) -> Result<GraderReply, ClientError> {
        match &self.result {
            Ok(reply) => Ok(GraderReply(reply.clone())),
            Err(ClientError::Timeout) => Err(ClientError::Timeout),
            Err(ClientError::Connection(msg)) => Err(ClientError::Connection(msg.clone())),
            Err(ClientError::Status { status, body }) => Err(ClientError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canned_client_returns_configured_reply() {
        let client = CannedGraderClient::ok(r#"{"correct":true,"score":1,"msg":"ok"}"#);
        let reply = client.respond("body", "{}").await.unwrap();
        assert!(reply.0.contains("\"correct\":true"));
    }

    #[tokio::test]
    async fn canned_client_can_simulate_failure() {
        let client = CannedGraderClient::failing(ClientError::Timeout);
        let err = client.respond("body", "{}").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }
}
