use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{self, Request, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

use xqueue_blobstore::MemoryBlobStore;
use xqueue_client::LmsClient;
use xqueue_core::config::RawConfig;
use xqueue_core::error::StorageError;
use xqueue_core::hashkey::make_hashkey;
use xqueue_core::{Config, NewSubmission, Submission};
use xqueue_server::auth::SessionConfig;
use xqueue_server::state::AppState;
use xqueue_store::{SubmissionStore, UserStore};

// -- In-memory store double, local to this crate's own tests --------------
//
// Mirrors the shape of `xqueue-worker`'s private test double: one struct
// implementing both `SubmissionStore` and `UserStore`, since the server
// wires a single Postgres connection to both traits (see `main.rs`).

#[derive(Default)]
struct TestStore {
    rows: Mutex<Vec<Submission>>,
    next_id: Mutex<i64>,
    users: Mutex<BTreeMap<String, String>>,
}

#[async_trait]
impl SubmissionStore for TestStore {
    async fn create(&self, submission: NewSubmission) -> Result<i64, StorageError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;
        self.rows.lock().unwrap().push(Submission {
            id,
            requester_id: submission.requester_id,
            lms_callback_url: submission.lms_callback_url,
            queue_name: submission.queue_name,
            xqueue_header: submission.xqueue_header,
            xqueue_body: submission.xqueue_body,
            urls: submission.urls,
            keys: submission.keys,
            arrival_time: chrono::Utc::now(),
            pull_time: None,
            push_time: None,
            return_time: None,
            grader_id: String::new(),
            pullkey: String::new(),
            grader_reply: String::new(),
            num_failures: 0,
            lms_ack: false,
            retired: false,
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Submission, StorageError> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn invalidate_prior(&self, lms_callback_url: &str) -> Result<u64, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let mut n = 0;
        for row in rows.iter_mut() {
            if row.lms_callback_url == lms_callback_url && !row.retired {
                row.retired = true;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn next_pullable(
        &self,
        queue: &str,
        grader_id: &str,
        processing_delay: chrono::Duration,
    ) -> Result<Option<Submission>, StorageError> {
        let now = chrono::Utc::now();
        let mut rows = self.rows.lock().unwrap();
        let candidate = rows
            .iter_mut()
            .filter(|s| s.queue_name == queue && !s.retired)
            .filter(|s| s.pull_time.map(|t| t <= now - processing_delay).unwrap_or(true))
            .min_by_key(|s| s.arrival_time);
        let Some(row) = candidate else { return Ok(None) };
        row.pull_time = Some(now);
        row.pullkey = make_hashkey(&format!("{now}:{}", row.id));
        row.grader_id = grader_id.to_owned();
        Ok(Some(row.clone()))
    }

    async fn next_pushable(
        &self,
        _queue: &str,
        _grader_id: &str,
        _processing_delay: chrono::Duration,
    ) -> Result<Option<Submission>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn queue_length(&self, queue: &str, processing_delay: chrono::Duration) -> Result<i64, StorageError> {
        let now = chrono::Utc::now();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|s| {
                s.queue_name == queue
                    && !s.retired
                    && s.pull_time.map(|t| t <= now - processing_delay).unwrap_or(true)
            })
            .count() as i64)
    }

    async fn update(&self, submission: &Submission) -> Result<bool, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|s| s.id == submission.id) {
            if row.retired {
                return Ok(false);
            }
            *row = submission.clone();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_older_than(&self, _cutoff: chrono::DateTime<chrono::Utc>, _chunk_size: u32) -> Result<u64, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn requeue_stale_pulls(
        &self,
        _queue: Option<&str>,
        _pull_timeout: chrono::Duration,
        _max_failures: i32,
    ) -> Result<Vec<Submission>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn scan_failed(&self, _queue: Option<&str>, _threshold: i32) -> Result<Vec<Submission>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn scan_unretired_for_queue(
        &self,
        _queue: &str,
        _arrival_before: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Submission>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn scan_orphans(&self, _queue: &str, _cutoff: chrono::DateTime<chrono::Utc>) -> Result<Vec<Submission>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }

    async fn count_unretired_by_queue(&self) -> Result<Vec<(String, i64)>, StorageError> {
        unimplemented!("not exercised by the HTTP surface")
    }
}

#[async_trait]
impl UserStore for TestStore {
    async fn upsert_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError> {
        self.users.lock().unwrap().insert(username.to_owned(), password_hash.to_owned());
        Ok(())
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>, StorageError> {
        Ok(self.users.lock().unwrap().get(username).cloned())
    }
}

// -- Helpers ----------------------------------------------------------------

fn test_config() -> Config {
    let toml = r#"
        database_url = "postgres://unused/test"

        [[queues]]
        name = "test-pull"
    "#;
    RawConfig::from_toml_str(toml).unwrap().into_config()
}

fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
}

fn build_app(store: Arc<TestStore>) -> axum::Router {
    let config = Arc::new(test_config());
    let state = AppState {
        store: store.clone(),
        users: store,
        blobs: Arc::new(MemoryBlobStore::new("http://files.example")),
        lms: Arc::new(LmsClient::new(Duration::from_secs(2), None)),
        config,
        session: SessionConfig {
            secret: "test-secret".to_owned(),
            ttl_seconds: 3600,
        },
    };
    xqueue_server::api::router(state)
}

/// `ConnectInfo` is normally populated by `into_make_service_with_connect_info`
/// (see `main.rs`); tests exercising `submit`/`get_submission` stand in for
/// that layer by inserting the extension directly.
fn with_peer(mut request: Request<Body>) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))));
    request
}

fn envelope_json(body: axum::body::Bytes) -> serde_json::Value {
    serde_json::from_slice(&body).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

// -- Tests --------------------------------------------------------------

#[tokio::test]
async fn status_is_public_and_always_ok() {
    let app = build_app(Arc::new(TestStore::default()));

    let response = app
        .oneshot(Request::builder().uri("/xqueue/status/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = envelope_json(body_bytes(response).await);
    assert_eq!(json["return_code"], 0);
}

#[tokio::test]
async fn protected_routes_reject_missing_session() {
    let app = build_app(Arc::new(TestStore::default()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/xqueue/get_queuelen/?queue_name=test-pull")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = envelope_json(body_bytes(response).await);
    assert_eq!(json["return_code"], 1);
    assert_eq!(json["content"], "login_required");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let store = Arc::new(TestStore::default());
    store.upsert_user("grader", &hash_password("correct-horse")).await.unwrap();
    let app = build_app(store);

    let response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/xqueue/login/")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=grader&password=wrong"))
                .unwrap(),
        )
        .await
        .unwrap();

    let json = envelope_json(body_bytes(response).await);
    assert_eq!(json["return_code"], 1);
}

#[tokio::test]
async fn login_then_get_queuelen_round_trips_the_session_cookie() {
    let store = Arc::new(TestStore::default());
    store.upsert_user("grader", &hash_password("correct-horse")).await.unwrap();
    let app = build_app(store);

    let login_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/xqueue/login/")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=grader&password=correct-horse"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(login_response.status(), StatusCode::OK);
    let cookie = login_response
        .headers()
        .get(http::header::SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/xqueue/get_queuelen/?queue_name=test-pull")
                .header(http::header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = envelope_json(body_bytes(response).await);
    assert_eq!(json["return_code"], 0);
    assert_eq!(json["content"], 0);
}

#[tokio::test]
async fn get_queuelen_rejects_unknown_queue_name() {
    let store = Arc::new(TestStore::default());
    store.upsert_user("grader", &hash_password("pw")).await.unwrap();
    let app = build_app(store);

    let cookie = login(&app, "grader", "pw").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/xqueue/get_queuelen/?queue_name=does-not-exist")
                .header(http::header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = envelope_json(body_bytes(response).await);
    assert_eq!(json["return_code"], 1);
}

#[tokio::test]
async fn submit_then_get_submission_and_put_result_full_lifecycle() {
    let mock = MockLms::start().await;
    let lms_url = mock.base_url.clone();
    let server = tokio::spawn(mock.respond_n_times(200, 1));

    let store = Arc::new(TestStore::default());
    store.upsert_user("grader", &hash_password("pw")).await.unwrap();
    let app = build_app(store);

    let cookie = login(&app, "grader", "pw").await;

    let header = format!(r#"{{"lms_callback_url":"{lms_url}","lms_key":"k","queue_name":"test-pull"}}"#);
    let boundary = "XBOUNDARY";
    let multipart_body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"xqueue_header\"\r\n\r\n{header}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"xqueue_body\"\r\n\r\nsolution text\r\n\
         --{boundary}--\r\n"
    );

    let submit_response = app
        .clone()
        .oneshot(with_peer(
            Request::builder()
                .method(http::Method::POST)
                .uri("/xqueue/submit/")
                .header(http::header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                .header(http::header::COOKIE, cookie.clone())
                .body(Body::from(multipart_body))
                .unwrap(),
        ))
        .await
        .unwrap();
    let submit_json = envelope_json(body_bytes(submit_response).await);
    assert_eq!(submit_json["return_code"], 0);

    let get_response = app
        .clone()
        .oneshot(with_peer(
            Request::builder()
                .uri("/xqueue/get_submission/?queue_name=test-pull")
                .header(http::header::COOKIE, cookie.clone())
                .body(Body::empty())
                .unwrap(),
        ))
        .await
        .unwrap();
    let get_json = envelope_json(body_bytes(get_response).await);
    assert_eq!(get_json["return_code"], 0);
    let content: String = get_json["content"].as_str().unwrap().to_owned();
    let payload: serde_json::Value = serde_json::from_str(&content).unwrap();
    let pulled_header: serde_json::Value = serde_json::from_str(payload["xqueue_header"].as_str().unwrap()).unwrap();

    let put_header = serde_json::json!({
        "submission_id": pulled_header["submission_id"],
        "submission_key": pulled_header["submission_key"],
    });
    let put_body = format!(
        "xqueue_header={}&xqueue_body={}",
        urlencode(&put_header.to_string()),
        urlencode(r#"{"correct":true,"score":1,"msg":"ok"}"#)
    );

    let put_response = app
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/xqueue/put_result/")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(http::header::COOKIE, cookie)
                .body(Body::from(put_body))
                .unwrap(),
        )
        .await
        .unwrap();
    let put_json = envelope_json(body_bytes(put_response).await);
    assert_eq!(put_json["return_code"], 0);

    server.await.unwrap();
}

async fn login(app: &axum::Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/xqueue/login/")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("username={username}&password={password}")))
                .unwrap(),
        )
        .await
        .unwrap();
    response
        .headers()
        .get(http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned()
}

fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// -- A bare-bones mock LMS, same shape as `xqueue-client`'s own unit tests ---

struct MockLms {
    listener: tokio::net::TcpListener,
    base_url: String,
}

impl MockLms {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self {
            listener,
            base_url: format!("http://127.0.0.1:{port}"),
        }
    }

    async fn respond_n_times(self, status: u16, times: u32) {
        for _ in 0..times {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!("HTTP/1.1 {status} x\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}");
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    }
}
