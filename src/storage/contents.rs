//! Remote object adapter over the repository contents API.
//!
//! Every object is one file at the repository root:
//!   `{api_url}/repos/{owner}/{repo}/contents/{name}`
//!
//! Writes follow the contents API's optimistic concurrency rule: an
//! overwrite must carry the blob `sha` (the revision marker) of the
//! current content, so [`ContentsStore::try_put`] always reads the marker
//! immediately before writing.  A concurrent writer that lands in between
//! makes the upstream reject our write; that surfaces as a failed upload
//! and is not retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use http::{Method, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::credentials::{CredentialPair, CredentialRotator};
use crate::errors::StoreError;
use crate::transport::{AuthenticatedTransport, HttpSend, ReqwestSender};
use crate::upload_log::UploadLog;

/// Characters left unescaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Extension (lowercase, with dot) of Scratch project files.
pub const PROJECT_EXTENSION: &str = ".sb3";

/// Reject names with an empty, `.` or `..` segment.  URL resolution would
/// otherwise move the request outside the contents root.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

// -- Types --------------------------------------------------------------------

/// Local classification of an uploaded file.  Only used for logging and
/// the upload response; never stored upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryTag {
    Sb3,
    Asset,
}

impl CategoryTag {
    /// `.sb3` (any case) is a project; everything else is an asset.
    pub fn from_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(PROJECT_EXTENSION) {
            CategoryTag::Sb3
        } else {
            CategoryTag::Asset
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryTag::Sb3 => "sb3",
            CategoryTag::Asset => "asset",
        }
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of a root listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntry {
    #[serde(default)]
    pub name: String,
    /// API URL of the object's metadata.
    #[serde(default)]
    pub url: Option<String>,
}

/// Metadata and content of a single object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectContent {
    #[serde(default)]
    pub name: String,
    /// Revision marker.
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ObjectContent {
    /// Decode the content.
    ///
    /// Only non-empty base64 content is accepted.  The line breaks the
    /// contents API inserts every 60 characters are ignored.
    pub fn decode(&self) -> Result<Vec<u8>, StoreError> {
        let content = match (self.encoding.as_deref(), self.content.as_deref()) {
            (Some("base64"), Some(c)) if !c.trim().is_empty() => c,
            _ => {
                return Err(StoreError::UnsupportedEncoding {
                    name: self.name.clone(),
                    encoding: self.encoding.clone(),
                })
            }
        };

        let compact: String = content.split_ascii_whitespace().collect();
        BASE64_STANDARD
            .decode(compact)
            .map_err(|source| StoreError::Decode {
                name: self.name.clone(),
                source,
            })
    }
}

/// Which kind of write the upstream performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

#[derive(Debug, Serialize)]
struct WritePayload<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

// -- Store --------------------------------------------------------------------

/// The remote object store.
pub struct ContentsStore {
    transport: AuthenticatedTransport,
    /// Contents URL of the repository root (no trailing slash).
    base_url: String,
    branch: String,
    log: Arc<UploadLog>,
}

impl ContentsStore {
    pub fn new(
        transport: AuthenticatedTransport,
        base_url: impl Into<String>,
        branch: impl Into<String>,
        log: Arc<UploadLog>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            branch: branch.into(),
            log,
        }
    }

    /// Wire up a store talking to the configured upstream with `reqwest`.
    pub fn from_config(
        config: &UpstreamConfig,
        credentials: CredentialPair,
        log: Arc<UploadLog>,
    ) -> anyhow::Result<Self> {
        let sender = ReqwestSender::new(Duration::from_secs(config.timeout_secs))?;
        Self::with_sender(config, Arc::new(sender), credentials, log)
    }

    /// Like [`ContentsStore::from_config`] with an explicit sender.
    pub fn with_sender(
        config: &UpstreamConfig,
        sender: Arc<dyn HttpSend>,
        credentials: CredentialPair,
        log: Arc<UploadLog>,
    ) -> anyhow::Result<Self> {
        let auth_denied = StatusCode::from_u16(config.auth_denied_status)
            .map_err(|e| anyhow::anyhow!("invalid auth_denied_status: {e}"))?;
        let transport = AuthenticatedTransport::new(
            sender,
            Arc::new(CredentialRotator::new(credentials)),
            auth_denied,
            &config.user_agent,
        )?;
        Ok(Self::new(
            transport,
            config.contents_url(),
            config.branch.clone(),
            log,
        ))
    }

    pub fn log(&self) -> &UploadLog {
        &self.log
    }

    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Contents URL for the object `name`.
    pub fn object_url(&self, name: &str) -> String {
        let path: Vec<String> = name
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url, path.join("/"))
    }

    /// Current revision marker of `name`, `None` if the object does not
    /// exist yet.
    pub async fn revision_marker(&self, name: &str) -> Result<Option<String>, StoreError> {
        validate_name(name)?;
        let resp = self
            .transport
            .send(Method::GET, &self.object_url(name), None)
            .await?;

        if resp.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if resp.status == self.transport.auth_denied_status() {
            return Err(StoreError::Unauthorized {
                status: resp.status.as_u16(),
            });
        }
        if !resp.status.is_success() {
            return Err(StoreError::Upstream {
                status: resp.status.as_u16(),
                body: resp.text(),
            });
        }

        let meta: ObjectContent = resp.json()?;
        Ok(meta.sha)
    }

    /// Create or overwrite `name` with `content`.
    pub async fn try_put(&self, name: &str, content: &[u8]) -> Result<WriteOutcome, StoreError> {
        validate_name(name)?;
        let sha = self.revision_marker(name).await?;
        debug!(name, prior = ?sha, "writing object");

        let payload = WritePayload {
            message: format!("Upload {name} at {}", chrono::Utc::now().to_rfc3339()),
            content: BASE64_STANDARD.encode(content),
            branch: &self.branch,
            sha,
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| anyhow::anyhow!("serializing write payload: {e}"))?;

        let resp = self
            .transport
            .send(Method::PUT, &self.object_url(name), Some(body))
            .await?;

        match resp.status {
            StatusCode::CREATED => Ok(WriteOutcome::Created),
            StatusCode::OK => Ok(WriteOutcome::Updated),
            status => Err(StoreError::Upstream {
                status: status.as_u16(),
                body: resp.text(),
            }),
        }
    }

    /// Write `name` and record the outcome in the upload log.
    pub async fn put(&self, name: &str, content: &[u8], tag: CategoryTag) -> bool {
        let result = self.try_put(name, content).await;
        let outcome = if result.is_ok() { "uploaded" } else { "failed" };
        metrics::counter!(
            crate::metrics::UPLOADS_TOTAL,
            "type" => tag.as_str(),
            "status" => outcome
        )
        .increment(1);

        match result {
            Ok(_) => {
                self.log
                    .info(format!("[{tag}] Uploaded {name} successfully."));
                true
            }
            Err(e) => {
                self.log
                    .error(format!("[{tag}] Failed to upload {name}: {e}"));
                false
            }
        }
    }

    /// List every object at the repository root.
    ///
    /// An error-shaped payload (an object with a `message`) becomes
    /// [`StoreError::Listing`] carrying that message unchanged.
    pub async fn list(&self) -> Result<Vec<ObjectEntry>, StoreError> {
        let resp = self.transport.send(Method::GET, &self.base_url, None).await?;
        let value: serde_json::Value = resp.json()?;

        match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| StoreError::Malformed(format!("listing entries: {e}"))),
            serde_json::Value::Object(ref map) => match map.get("message") {
                Some(message) => Err(StoreError::Listing {
                    message: message
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| message.to_string()),
                }),
                None => Err(StoreError::Malformed(format!(
                    "listing returned an object without a message (HTTP {})",
                    resp.status
                ))),
            },
            other => Err(StoreError::Malformed(format!(
                "listing returned {other} (HTTP {})",
                resp.status
            ))),
        }
    }

    /// Fetch the metadata and content behind a listing `url`.
    pub async fn fetch(&self, url: &str) -> Result<ObjectContent, StoreError> {
        let resp = self.transport.send(Method::GET, url, None).await?;
        if !resp.status.is_success() {
            return Err(StoreError::Upstream {
                status: resp.status.as_u16(),
                body: resp.text(),
            });
        }
        resp.json()
    }

    /// Fetch an object by name.
    pub async fn fetch_named(&self, name: &str) -> Result<ObjectContent, StoreError> {
        validate_name(name)?;
        self.fetch(&self.object_url(name)).await
    }
}
