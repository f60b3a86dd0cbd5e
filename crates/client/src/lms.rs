use std::time::Duration;

use serde::Deserialize;
use xqueue_core::config::BasicAuthConfig;
use xqueue_core::submission::Verdict;

/// Total attempts `post_verdict` makes before giving up (1 initial + 4 retries).
const MAX_ATTEMPTS: u32 = 5;

#[derive(Deserialize)]
struct HeaderCallbackUrl {
    lms_callback_url: String,
}

/// Posts grading verdicts back to the LMS, with bounded retries and optional
/// Basic-auth credentials applied to every attempt.
pub struct LmsClient {
    client: reqwest::Client,
    basic_auth: Option<BasicAuthConfig>,
}

impl LmsClient {
    pub fn new(timeout: Duration, basic_auth: Option<BasicAuthConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build LMS HTTP client");
        Self { client, basic_auth }
    }

    /// `header` is the submission's opaque `xqueue_header`; `body` is either
    /// the grader's reply string or a [`Verdict::failure`] JSON payload.
    ///
    /// Retries up to [`MAX_ATTEMPTS`] times with no backoff on non-2xx,
    /// connection error, or timeout; returns `false` only after exhausting
    /// every attempt.
    pub async fn post_verdict(&self, header: &str, body: &str) -> bool {
        let Ok(parsed) = serde_json::from_str::<HeaderCallbackUrl>(header) else {
            tracing::error!("xqueue_header missing lms_callback_url, cannot deliver verdict");
            return false;
        };

        let payload = serde_json::json!({
            "xqueue_header": header,
            "xqueue_body": body,
        });

        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self.client.post(&parsed.lms_callback_url).json(&payload);
            if let Some(auth) = &self.basic_auth {
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => return true,
                Ok(response) => {
                    tracing::warn!(status = %response.status(), attempt, "LMS callback returned non-success status");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "LMS callback request failed");
                }
            }
        }
        false
    }

    /// Convenience wrapper for the failure path: builds the `capa_alert` HTML
    /// payload and posts it as the verdict body.
    pub async fn post_failure(&self, header: &str, msg: &str) -> bool {
        let failure = Verdict::failure(msg);
        let body = serde_json::to_string(&failure).unwrap_or_default();
        self.post_verdict(header, &body).await
    }
}
