//! Authenticated transport to the upstream contents API.
//!
//! [`HttpSend`] is the physical sender: one request in, one response out.
//! The production implementation is [`ReqwestSender`]; tests substitute an
//! in-process stub.  [`AuthenticatedTransport`] sits on top, stamps every
//! request with the active credential and the standard headers, and
//! applies the rotation policy:
//!
//! - the request is issued once;
//! - if (and only if) the response carries the configured
//!   authorization-denied status, credentials are rotated and the identical
//!   request is issued one more time;
//! - the second response is returned whatever it is.
//!
//! There is no backoff and no retry on transport errors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::CredentialRotator;
use crate::errors::StoreError;

/// Media type requested from the contents API.
pub const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// REST API version pinned on every request.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

static API_VERSION_HEADER: HeaderName = HeaderName::from_static("x-github-api-version");

/// A fully-formed upstream request.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

/// A buffered upstream response.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl RemoteResponse {
    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            StoreError::Malformed(format!("invalid JSON (HTTP {}): {e}", self.status))
        })
    }

    /// The raw body as text, for logging upstream failures.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Physical HTTP sender.
pub trait HttpSend: Send + Sync + 'static {
    /// Issue `request` exactly once.
    fn send(
        &self,
        request: RemoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteResponse>> + Send + '_>>;
}

/// [`HttpSend`] over a shared `reqwest` client.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { client })
    }
}

impl HttpSend for ReqwestSender {
    fn send(
        &self,
        request: RemoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RemoteResponse>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method.clone(), &request.url)
                .headers(request.headers);
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("{} {} failed: {e}", request.method, request.url))?;

            let status = resp.status();
            let body = resp
                .bytes()
                .await
                .map_err(|e| anyhow::anyhow!("reading body of {} failed: {e}", request.url))?;

            Ok(RemoteResponse { status, body })
        })
    }
}

/// Credential-stamping sender with the single rotate-and-retry policy.
pub struct AuthenticatedTransport {
    sender: Arc<dyn HttpSend>,
    credentials: Arc<CredentialRotator>,
    auth_denied: StatusCode,
    user_agent: HeaderValue,
}

impl AuthenticatedTransport {
    pub fn new(
        sender: Arc<dyn HttpSend>,
        credentials: Arc<CredentialRotator>,
        auth_denied: StatusCode,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| anyhow::anyhow!("Invalid user agent {user_agent:?}: {e}"))?;
        Ok(Self {
            sender,
            credentials,
            auth_denied,
            user_agent,
        })
    }

    pub fn credentials(&self) -> &CredentialRotator {
        &self.credentials
    }

    /// The status that triggers rotation.
    pub fn auth_denied_status(&self) -> StatusCode {
        self.auth_denied
    }

    /// Issue `method url` with an optional JSON body, rotating credentials
    /// once if the first attempt is denied.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<RemoteResponse, StoreError> {
        let first = self.attempt(method.clone(), url, body.clone()).await?;
        if first.status != self.auth_denied {
            return Ok(first);
        }

        warn!(
            %method,
            url,
            status = %first.status,
            "upstream denied credential, rotating and retrying once"
        );
        self.credentials.rotate();

        let second = self.attempt(method, url, body).await?;
        if second.status == self.auth_denied {
            warn!(url, status = %second.status, "upstream denied rotated credential");
        }
        Ok(second)
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<RemoteResponse, StoreError> {
        let request = RemoteRequest {
            headers: self.headers()?,
            method,
            url: url.to_string(),
            body,
        };
        debug!(method = %request.method, url, "upstream request");

        let method_label = request.method.to_string();
        let response = self.sender.send(request).await?;

        metrics::counter!(
            crate::metrics::UPSTREAM_REQUESTS_TOTAL,
            "method" => method_label,
            "status" => response.status.as_u16().to_string()
        )
        .increment(1);

        Ok(response)
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.credentials.current()))
            .map_err(|e| anyhow::anyhow!("Invalid auth header value: {e}"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        headers.insert(
            API_VERSION_HEADER.clone(),
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, self.user_agent.clone());
        Ok(headers)
    }
}
