//! In-process stand-in for the repository contents API, used by tests.
//!
//! Implements [`HttpSend`] so the real [`AuthenticatedTransport`] and
//! [`ContentsStore`] run unchanged against it.  It keeps objects in
//! insertion order, hands out a fresh `sha` on every write, and enforces
//! the upstream's rule that an overwrite must carry the current `sha`.

use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::config::Config;
use crate::credentials::{CredentialPair, CredentialRotator};
use crate::storage::contents::ContentsStore;
use crate::transport::{AuthenticatedTransport, HttpSend, RemoteRequest, RemoteResponse};
use crate::upload_log::UploadLog;
use crate::AppState;

pub(crate) const STUB_BASE: &str = "http://stub.test/repos/owner/repo/contents";

#[derive(Clone)]
enum Blob {
    Bytes(Vec<u8>),
    /// Served as-is on reads, for odd encodings.
    Raw(Value),
}

#[derive(Default)]
struct State {
    objects: Vec<(String, String, Blob)>,
    hidden: HashSet<String>,
    failing: HashSet<String>,
    denied_tokens: HashSet<String>,
    listing_error: Option<(StatusCode, String)>,
    requests: Vec<RemoteRequest>,
}

#[derive(Default)]
pub(crate) struct StubContents {
    state: Mutex<State>,
    revision: AtomicU64,
}

impl StubContents {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_sha(&self) -> String {
        format!("rev-{}", self.revision.fetch_add(1, Ordering::SeqCst))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seed an object.
    pub(crate) fn insert(&self, name: &str, data: &[u8]) {
        let sha = self.next_sha();
        let mut state = self.lock();
        state.objects.retain(|(n, _, _)| n != name);
        state
            .objects
            .push((name.to_string(), sha, Blob::Bytes(data.to_vec())));
    }

    /// Seed an object whose metadata response is `metadata` verbatim.
    pub(crate) fn insert_raw(&self, name: &str, metadata: Value) {
        let sha = self.next_sha();
        self.lock()
            .objects
            .push((name.to_string(), sha, Blob::Raw(metadata)));
    }

    /// Reads of `name` answer 404 while the object keeps existing.
    pub(crate) fn hide_from_reads(&self, name: &str) {
        self.lock().hidden.insert(name.to_string());
    }

    /// Reads of `name` answer 500.
    pub(crate) fn fail_fetch(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    /// Requests authorized with `token` answer 403.
    pub(crate) fn deny_token(&self, token: &str) {
        self.lock().denied_tokens.insert(token.to_string());
    }

    /// The root listing answers with an error-shaped payload.
    pub(crate) fn fail_listing(&self, status: StatusCode, message: &str) {
        self.lock().listing_error = Some((status, message.to_string()));
    }

    pub(crate) fn sha_of(&self, name: &str) -> Option<String> {
        self.lock()
            .objects
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, sha, _)| sha.clone())
    }

    pub(crate) fn content_of(&self, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .iter()
            .find_map(|(n, _, blob)| match blob {
                Blob::Bytes(data) if n == name => Some(data.clone()),
                _ => None,
            })
    }

    /// JSON bodies of every PUT received, in order.
    pub(crate) fn put_bodies(&self) -> Vec<Value> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == Method::PUT)
            .filter_map(|r| r.body.clone())
            .collect()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn handle(&self, request: RemoteRequest) -> (StatusCode, Value) {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let token = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string();
        if state.denied_tokens.contains(&token) {
            return (
                StatusCode::FORBIDDEN,
                json!({"message": "API rate limit exceeded"}),
            );
        }

        if request.url == STUB_BASE && request.method == Method::GET {
            if let Some((status, message)) = &state.listing_error {
                return (*status, json!({ "message": message }));
            }
            let listing: Vec<Value> = state
                .objects
                .iter()
                .map(|(name, sha, _)| {
                    json!({
                        "name": name,
                        "path": name,
                        "sha": sha,
                        "type": "file",
                        "url": format!("{STUB_BASE}/{}", encode(name)),
                    })
                })
                .collect();
            return (StatusCode::OK, Value::Array(listing));
        }

        let Some(encoded) = request.url.strip_prefix(&format!("{STUB_BASE}/")) else {
            return (StatusCode::NOT_FOUND, json!({"message": "Not Found"}));
        };
        let name = percent_encoding::percent_decode_str(encoded)
            .decode_utf8_lossy()
            .into_owned();
        let existing = state
            .objects
            .iter()
            .position(|(n, _, _)| *n == name);

        match request.method {
            Method::GET => {
                if state.failing.contains(&name) {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"message": "Server Error"}),
                    );
                }
                match existing {
                    Some(i) if !state.hidden.contains(&name) => {
                        let (name, sha, blob) = &state.objects[i];
                        match blob {
                            Blob::Raw(meta) => (StatusCode::OK, meta.clone()),
                            Blob::Bytes(data) => (
                                StatusCode::OK,
                                json!({
                                    "name": name,
                                    "sha": sha,
                                    "encoding": "base64",
                                    "content": wrap_base64(data),
                                }),
                            ),
                        }
                    }
                    _ => (StatusCode::NOT_FOUND, json!({"message": "Not Found"})),
                }
            }
            Method::PUT => {
                let body = request.body.unwrap_or(Value::Null);
                let given = body.get("sha").and_then(Value::as_str).map(str::to_string);
                let data = body
                    .get("content")
                    .and_then(Value::as_str)
                    .and_then(|c| BASE64_STANDARD.decode(c).ok())
                    .unwrap_or_default();
                let sha = self.next_sha();

                match existing {
                    Some(i) => {
                        let current = state.objects[i].1.clone();
                        if given.as_deref() != Some(current.as_str()) {
                            return (
                                StatusCode::CONFLICT,
                                json!({
                                    "message": format!("{name} does not match {current}")
                                }),
                            );
                        }
                        state.objects[i] = (name.clone(), sha.clone(), Blob::Bytes(data));
                        (StatusCode::OK, json!({"content": {"name": name, "sha": sha}}))
                    }
                    None => {
                        state
                            .objects
                            .push((name.clone(), sha.clone(), Blob::Bytes(data)));
                        (
                            StatusCode::CREATED,
                            json!({"content": {"name": name, "sha": sha}}),
                        )
                    }
                }
            }
            _ => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({"message": "Method Not Allowed"}),
            ),
        }
    }
}

impl HttpSend for StubContents {
    fn send(
        &self,
        request: RemoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteResponse>> + Send + '_>> {
        let (status, body) = self.handle(request);
        Box::pin(async move {
            Ok(RemoteResponse {
                status,
                body: Bytes::from(serde_json::to_vec(&body)?),
            })
        })
    }
}

fn encode(name: &str) -> String {
    percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Base64 with a newline every 60 characters, as the contents API sends it.
fn wrap_base64(data: &[u8]) -> String {
    let encoded = BASE64_STANDARD.encode(data);
    let mut out = String::new();
    for chunk in encoded.as_bytes().chunks(60) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push('\n');
    }
    out
}

/// A store wired to `stub` with tokens `tok-primary` / `tok-fallback`,
/// rotating on 403.
pub(crate) fn stub_store(stub: Arc<StubContents>) -> ContentsStore {
    let rotator = Arc::new(CredentialRotator::new(CredentialPair::new(
        "tok-primary",
        Some("tok-fallback".to_string()),
    )));
    let transport =
        AuthenticatedTransport::new(stub, rotator, StatusCode::FORBIDDEN, "repostore-test")
            .unwrap();
    ContentsStore::new(transport, STUB_BASE, "main", Arc::new(UploadLog::new()))
}

/// Build a zip archive in memory from `(name, data)` pairs.
pub(crate) fn zip_bytes<D: AsRef<[u8]>>(entries: &[(&str, D)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data.as_ref()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Application state over `stub` with default configuration.
pub(crate) fn stub_state(stub: Arc<StubContents>) -> Arc<AppState> {
    Arc::new(AppState::new(Config::default(), stub_store(stub)))
}
