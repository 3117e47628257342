//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::clock::Clock;
use crate::credentials::{BrokerError, BrokerResult, CredentialBroker, CredentialGrant};
use crate::results::UploadTask;
use crate::storage::{SessionFactory, TransferError, TransferResult, TransferSession};

/// A grant whose access key doubles as its name in assertions.
pub(crate) fn grant(name: &str, expires_at: i64) -> CredentialGrant {
    CredentialGrant {
        key_prefix: "prefix".to_string(),
        access_key_id: name.to_string(),
        secret_access_key: format!("{}-secret", name),
        session_token: format!("{}-token", name),
        expires_at,
    }
}

/// Writes `(case_index, name, size)` files into `dir` and returns their tasks.
pub(crate) fn write_files(dir: &TempDir, files: &[(usize, &str, usize)]) -> Vec<UploadTask> {
    files
        .iter()
        .map(|(case_index, name, size)| {
            let path = dir.path().join(name);
            std::fs::write(&path, vec![b'x'; *size]).unwrap();
            UploadTask::new(*case_index, path)
        })
        .collect()
}

/// A clock that only moves when told to.
pub(crate) struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A completed (or failed) fake transfer.
#[derive(Debug, Clone)]
pub(crate) struct UploadRecord {
    pub key: String,
    pub access_key_id: String,
}

#[derive(Default)]
struct StoreState {
    active: AtomicUsize,
    peak: AtomicUsize,
    attempts: AtomicUsize,
    closed: AtomicUsize,
    opened: Mutex<Vec<String>>,
    uploads: Mutex<Vec<UploadRecord>>,
}

/// In-memory object store that records every session and transfer.
pub(crate) struct FakeStore {
    state: Arc<StoreState>,
    delay: Duration,
    clock: Option<(Arc<ManualClock>, i64)>,
    failing: HashSet<String>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(StoreState::default()),
            delay: Duration::ZERO,
            clock: None,
            failing: HashSet::new(),
        }
    }

    /// Each transfer sleeps for `delay` before finishing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each transfer moves `clock` forward by `secs` as it finishes.
    pub fn advancing(mut self, clock: Arc<ManualClock>, secs: i64) -> Self {
        self.clock = Some((clock, secs));
        self
    }

    /// Transfers to `key` fail with a service error.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Successful transfers in completion order.
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads().into_iter().map(|u| u.key).collect()
    }
}

impl SessionFactory for FakeStore {
    fn open(&self, grant: &CredentialGrant) -> Arc<dyn TransferSession> {
        self.state
            .opened
            .lock()
            .unwrap()
            .push(grant.access_key_id.clone());

        Arc::new(FakeSession {
            access_key_id: grant.access_key_id.clone(),
            state: Arc::clone(&self.state),
            delay: self.delay,
            clock: self.clock.clone(),
            failing: self.failing.clone(),
        })
    }
}

struct FakeSession {
    access_key_id: String,
    state: Arc<StoreState>,
    delay: Duration,
    clock: Option<(Arc<ManualClock>, i64)>,
    failing: HashSet<String>,
}

#[async_trait]
impl TransferSession for FakeSession {
    async fn upload(&self, key: &str, path: &Path) -> TransferResult<u64> {
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(active, Ordering::SeqCst);
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((clock, secs)) = &self.clock {
            clock.advance(*secs);
        }

        let result = if self.failing.contains(key) {
            Err(TransferError::service("AccessDenied: Access Denied"))
        } else {
            match tokio::fs::metadata(path).await {
                Ok(metadata) => {
                    self.state.uploads.lock().unwrap().push(UploadRecord {
                        key: key.to_string(),
                        access_key_id: self.access_key_id.clone(),
                    });
                    Ok(metadata.len())
                }
                Err(e) => Err(TransferError::client(e.to_string())),
            }
        };

        self.state.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Broker that replays canned responses in order.
///
/// Once the script runs out every request is refused.
pub(crate) struct FakeBroker {
    responses: Mutex<VecDeque<BrokerResult<CredentialGrant>>>,
    calls: AtomicUsize,
    calls_while_busy: AtomicUsize,
    watched: Option<Arc<StoreState>>,
}

impl FakeBroker {
    pub fn new(responses: Vec<BrokerResult<CredentialGrant>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            calls_while_busy: AtomicUsize::new(0),
            watched: None,
        }
    }

    /// Counts requests made while `store` has transfers running.
    pub fn watching(mut self, store: &FakeStore) -> Self {
        self.watched = Some(Arc::clone(&store.state));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_while_busy(&self) -> usize {
        self.calls_while_busy.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialBroker for FakeBroker {
    async fn request_credentials(
        &self,
        _target: &str,
        _key_prefix: &str,
    ) -> BrokerResult<CredentialGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(state) = &self.watched
            && state.active.load(Ordering::SeqCst) > 0
        {
            self.calls_while_busy.fetch_add(1, Ordering::SeqCst);
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BrokerError::Refused("No more credentials.".to_string())))
    }
}

/// A request received by [`TestServer`].
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub path: String,
    pub body: Value,
}

type Responses = Arc<Mutex<HashMap<String, VecDeque<(u16, String)>>>>;

/// Minimal HTTP/1.1 server answering scripted responses per path.
///
/// Requests are matched on their path without the query string. Paths
/// without a scripted response get a 404 error envelope.
pub(crate) struct TestServer {
    pub base_url: String,
    responses: Responses,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let responses: Responses = Arc::default();
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::default();

        let (server_responses, server_requests) = (Arc::clone(&responses), Arc::clone(&requests));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let responses = Arc::clone(&server_responses);
                let requests = Arc::clone(&server_requests);
                tokio::spawn(handle(stream, responses, requests));
            }
        });

        Self {
            base_url,
            responses,
            requests,
        }
    }

    /// Queues a JSON response for the next request to `path`.
    pub fn respond(self, path: &str, status: u16, body: Value) -> Self {
        self.respond_raw(path, status, &body.to_string())
    }

    /// Queues a raw response body for the next request to `path`.
    pub fn respond_raw(self, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    mut stream: TcpStream,
    responses: Responses,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let body = serde_json::from_slice(&buf[header_end..header_end + content_length])
        .unwrap_or(Value::Null);
    requests.lock().unwrap().push(CapturedRequest {
        path: path.clone(),
        body,
    });

    let (status, body) = responses
        .lock()
        .unwrap()
        .get_mut(&path)
        .and_then(|queue| queue.pop_front())
        .unwrap_or_else(|| (404, r#"{"error":{"message":"Not found."}}"#.to_string()));

    let content_type = if body.starts_with('<') {
        "application/xml"
    } else {
        "application/json"
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        if status < 400 { "OK" } else { "Error" },
        content_type,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// A URL on localhost where nothing is listening.
pub(crate) async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
