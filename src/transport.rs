use std::fmt;
use std::net::Ipv6Addr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::errors::{ApiErrorBody, ConnectionError, DecodeError, Result, UnmanicError};

pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const DEFAULT_PORT: u16 = 8888;
pub(crate) const DEFAULT_BASE_PATH: &str = "/unmanic/api/";
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("Unmanic-API/", env!("CARGO_PKG_VERSION"));

const ACCEPT_VALUE: &str = "application/json, text/plain, */*";
const JSON_MEDIA_TYPE: &str = "application/json";

/// Where and how to reach an Unmanic installation.
///
/// Usually built by [`ClientBuilder`](crate::ClientBuilder). A hand-built
/// config is checked by [`validated`](Self::validated) when it is handed to
/// [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Hostname, IPv4 address, or bare IPv6 address such as `::1`.
    pub host: String,
    pub port: u16,
    /// Normalised to start and end with `/` before use.
    pub base_path: String,
    pub tls: bool,
    /// Only applies to a session the transport opens itself.
    pub verify_ssl: bool,
    /// Bounds the whole request, from connect to the last body byte.
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Sent with every request, e.g. an `Authorization` header for a reverse proxy.
    pub headers: HeaderMap,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            base_path: DEFAULT_BASE_PATH.to_string(),
            tls: false,
            verify_ssl: true,
            request_timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HeaderMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Normalise the base path and reject a zero timeout or a user agent that
    /// cannot be sent as a header value.
    pub fn validated(mut self) -> Result<Self> {
        if self.request_timeout.is_zero() {
            return Err(UnmanicError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(UnmanicError::InvalidConfig(format!(
                "invalid user agent {:?}",
                self.user_agent
            )));
        }
        self.base_path = normalize_base_path(&self.base_path);
        Ok(self)
    }

    /// `scheme://host:port/base_path/path`.
    pub fn url(&self, path: &str) -> std::result::Result<Url, ConnectionError> {
        let scheme = if self.tls { "https" } else { "http" };
        let base = format!(
            "{scheme}://{}:{}{}",
            self.url_host(),
            self.port,
            normalize_base_path(&self.base_path)
        );
        let base_url = Url::parse(&base).map_err(|source| ConnectionError::InvalidUrl {
            url: base.clone(),
            source,
        })?;

        base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| ConnectionError::InvalidUrl {
                url: format!("{base}{path}"),
                source,
            })
    }

    fn url_host(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

/// Normalise a base path to exactly one leading and one trailing `/`.
pub(crate) fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// HTTP methods the Unmanic API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// A single call against the API, relative to the configured base path.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Pre-serialised JSON.
    pub body: Option<String>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Attach a JSON body. Sent with `Content-Type: application/json`.
    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self
    }
}

/// A successful (non 4xx/5xx) response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed because the content type mentioned `application/json`.
    Json(serde_json::Value),
    /// Returned verbatim.
    Text { content_type: String, body: String },
}

impl Payload {
    /// The JSON object, or a [`DecodeError`] if the server sent anything else.
    pub fn into_object(
        self,
    ) -> std::result::Result<serde_json::Map<String, serde_json::Value>, DecodeError> {
        match self {
            Payload::Json(serde_json::Value::Object(map)) => Ok(map),
            Payload::Json(_) => Err(DecodeError::NotAnObject),
            Payload::Text { content_type, body } => Err(DecodeError::UnexpectedText {
                content_type,
                len: body.len(),
            }),
        }
    }
}

/// Performs requests on behalf of [`Client`](crate::Client).
///
/// [`HttpTransport`] is the real implementation; tests can substitute their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<Payload>;

    /// Release any session the transport opened itself. Safe to call repeatedly.
    async fn close_session(&self) {}
}

/// `reqwest`-backed [`Transport`].
///
/// The session is opened lazily on the first request unless one was supplied
/// with [`HttpTransport::with_session`]. A supplied session stays owned by the
/// caller and is never closed here. Dropping a request future aborts the
/// in-flight HTTP exchange.
pub struct HttpTransport {
    config: ConnectionConfig,
    session: Mutex<Option<reqwest::Client>>,
    owns_session: bool,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("owns_session", &self.owns_session)
            .field("session_open", &self.has_open_session())
            .finish()
    }
}

impl HttpTransport {
    /// Fails with [`UnmanicError::InvalidConfig`] if `config` does not pass
    /// [`ConnectionConfig::validated`].
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Ok(Self {
            config: config.validated()?,
            session: Mutex::new(None),
            owns_session: true,
        })
    }

    /// Share an existing `reqwest::Client` (and its connection pool).
    ///
    /// If the session has its own timeout and that fires first, the request
    /// fails with [`ConnectionError::SessionTimeout`].
    pub fn with_session(config: ConnectionConfig, session: reqwest::Client) -> Result<Self> {
        Ok(Self {
            config: config.validated()?,
            session: Mutex::new(Some(session)),
            owns_session: false,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn has_open_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn session(&self) -> Result<reqwest::Client> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let session = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.config.verify_ssl)
            .no_proxy()
            .build()
            .map_err(ConnectionError::Transport)?;
        debug!(host = %self.config.host, port = self.config.port, "opened HTTP session");
        *slot = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<Payload> {
        let ApiRequest {
            method,
            path,
            body,
            headers,
        } = request;

        let url = self.config.url(&path)?;
        let session = self.session()?;

        let mut builder = session
            .request(method.into(), url.clone())
            .header(USER_AGENT, self.config.user_agent.as_str())
            .header(ACCEPT, ACCEPT_VALUE)
            .headers(self.config.headers.clone())
            .headers(headers);
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, JSON_MEDIA_TYPE).body(body);
        }

        debug!(%method, %url, "sending request");

        let timeout = self.config.request_timeout;
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let content_type = content_type(response.headers());
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, content_type, text))
        };

        let (status, content_type, text) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(e)) if e.is_timeout() => {
                warn!(%method, %url, error = %e, "session timed out");
                return Err(ConnectionError::SessionTimeout(e).into());
            }
            Ok(Err(e)) => {
                warn!(%method, %url, error = %e, "request failed");
                return Err(ConnectionError::Transport(e).into());
            }
            Err(_) => {
                warn!(%method, %url, ?timeout, "request timed out");
                return Err(ConnectionError::Timeout(timeout).into());
            }
        };

        debug!(status, %url, content_type = %content_type, "received response");
        classify(status, content_type, text)
    }

    async fn close_session(&self) {
        if !self.owns_session {
            return;
        }
        let closed = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            debug!(host = %self.config.host, "closed HTTP session");
        }
    }
}

/// The response `Content-Type`, or `""` when absent.
fn content_type(headers: &HeaderMap) -> String {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return String::new();
    };
    match value.to_str() {
        Ok(text) => text.to_string(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(value.as_bytes()).into_owned();
            debug!(content_type = %lossy, "content type is not visible ASCII");
            lossy
        }
    }
}

/// Map a status code and body onto the error taxonomy. First match wins.
pub(crate) fn classify(status: u16, content_type: String, body: String) -> Result<Payload> {
    let err = match status {
        400 => UnmanicError::BadRequestValidation,
        404 => UnmanicError::BadRequestEndpointNotFound,
        405 => UnmanicError::BadRequestMethodNotAllowed,
        500 => UnmanicError::InternalServer,
        400..=599 => {
            let body = if is_json_media_type(&content_type) {
                match serde_json::from_str(&body) {
                    Ok(value) => ApiErrorBody::Json(value),
                    Err(_) => ApiErrorBody::Text(body),
                }
            } else {
                ApiErrorBody::Text(body)
            };
            UnmanicError::Api {
                status_code: status,
                content_type,
                body,
            }
        }
        _ => {
            if content_type.to_ascii_lowercase().contains(JSON_MEDIA_TYPE) {
                let value = serde_json::from_str(&body).map_err(DecodeError::Json)?;
                return Ok(Payload::Json(value));
            }
            return Ok(Payload::Text { content_type, body });
        }
    };

    warn!(status, error = %err, "API returned an error status");
    Err(err)
}

/// `application/json`, ignoring parameters such as `charset`.
fn is_json_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}
