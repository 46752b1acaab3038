//! Minimal HTTP plumbing with safe logging and flexible auth.
//!
//! - [`HttpClient`]: async client, optionally anchored to a base URL. Used for
//!   JSON APIs (text generation) and as the shared session of the async fetch
//!   strategy.
//! - [`blocking::BlockingHttpClient`]: blocking page client for callers that
//!   run on plain threads (sequential, thread pool, process workers).
//! - Never logs secret values; `Auth` is reported by kind only.
//! - Optional raw response logging via `FANOUT_HTTP_RAW=1` (target `http.raw`).
//!
//! There is no retry loop: every call is exactly one round trip.
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), fanout_http::HttpError> {
//! let client = fanout_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .post_json("v1/items", None, &serde_json::json!({"q": 1}))
//!     .await?;
//! # Ok(()) }
//! ```

pub mod blocking;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

const RAW_ENV: &str = "FANOUT_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;

pub const DEFAULT_USER_AGENT: &str = concat!("fanout/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn next_request_id() -> String {
    format!("r{}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed))
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    fn from_send(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(timeout)
        } else {
            HttpError::Network(err.to_string())
        }
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use fanout_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Custom header (e.g., Anthropic: x-api-key)
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Header { .. } => "header",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use fanout_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// A decoded text response.
#[derive(Debug, Clone)]
pub struct TextBody {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Option<Url>,
    inner: Client,
    pub default_timeout: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use fanout_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let mut base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        // `join` replaces the last segment unless the base ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut client = Self::unanchored(None)?;
        client.base = Some(base);
        Ok(client)
    }

    /// Construct a client with no base URL; every request takes an absolute URL.
    ///
    /// One instance reuses its connection pool across all requests, which is
    /// what makes it usable as a shared fetch session.
    pub fn unanchored(user_agent: Option<&str>) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base: None,
            inner,
            default_timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Override the default timeout.
    ///
    /// ```no_run
    /// use fanout_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?
    ///     .with_timeout(Duration::from_secs(2));
    /// assert_eq!(client.default_timeout, Duration::from_secs(2));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// POST JSON using optional Bearer auth.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let opts = RequestOpts {
            auth: bearer.map(Auth::Bearer),
            ..Default::default()
        };
        self.post_json_opts(path, body, opts).await
    }

    /// POST JSON with per-request options (headers/auth/timeout).
    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        let (req_id, _status, _headers, bytes) = self
            .send(Method::POST, path, Some(payload), opts)
            .await?;
        decode_json(&req_id, &bytes)
    }

    /// GET a text document (HTML pages). `url` may be absolute.
    pub async fn get_text(&self, url: &str, mut opts: RequestOpts<'_>) -> Result<TextBody, HttpError> {
        opts.allow_absolute = true;
        let (_req_id, status, headers, bytes) = self.send(Method::GET, url, None, opts).await?;
        Ok(text_body(status, &headers, &bytes))
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute || self.base.is_none() {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        match &self.base {
            Some(base) => base.join(path).map_err(|e| HttpError::Url(e.to_string())),
            None => Err(HttpError::Url(format!("not an absolute URL: {path}"))),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        opts: RequestOpts<'_>,
    ) -> Result<(String, StatusCode, HeaderMap, Vec<u8>), HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let mut rb = self
            .inner
            .request(method.clone(), url.clone())
            .timeout(timeout);
        let has_body = body.is_some();
        if let Some(bytes) = body {
            rb = rb.header(CONTENT_TYPE, "application/json").body(bytes);
        }
        if let Some(hdrs) = &opts.headers {
            rb = rb.headers(hdrs.clone());
        }
        match &opts.auth {
            Some(Auth::Bearer(tok)) => {
                let tok = sanitize_api_key(tok)?;
                rb = rb.bearer_auth(tok);
            }
            Some(Auth::Header { name, value }) => {
                rb = rb.header(name, value);
            }
            Some(Auth::None) | None => {}
        }

        let req_id = next_request_id();
        tracing::debug!(
            req_id=%req_id,
            method=%method,
            host_path=%host_path(&url),
            timeout_ms=timeout.as_millis() as u64,
            auth_kind=opts.auth.as_ref().map(Auth::kind).unwrap_or("none"),
            has_body,
            "http.request.start"
        );

        let t0 = Instant::now();
        let resp = rb.send().await.map_err(|err| {
            let err = HttpError::from_send(err, timeout);
            tracing::warn!(req_id=%req_id, error=%err, "http.network_error.send");
            err
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(|err| {
            let err = HttpError::from_send(err, timeout);
            tracing::warn!(req_id=%req_id, error=%err, "http.network_error.body");
            err
        })?;

        finish(&req_id, status, &headers, &bytes, t0)?;
        Ok((req_id, status, headers, bytes.to_vec()))
    }
}

// ==============================
// Helpers shared with `blocking`
// ==============================

/// Log the response and turn non-success statuses into [`HttpError::Api`].
fn finish(
    req_id: &str,
    status: StatusCode,
    headers: &HeaderMap,
    bytes: &[u8],
    t0: Instant,
) -> Result<(), HttpError> {
    let request_id = headers
        .get("x-request-id")
        .or_else(|| headers.get("request-id"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::debug!(
        req_id=%req_id,
        %status,
        duration_ms=t0.elapsed().as_millis() as u64,
        body_len=bytes.len(),
        x_request_id=%request_id,
        "http.response.headers"
    );

    if raw_enabled() {
        let truncated = bytes.len() > RAW_MAX_BODY;
        let text = String::from_utf8_lossy(&bytes[..bytes.len().min(RAW_MAX_BODY)]);
        tracing::info!(
            target: "http.raw",
            %req_id,
            %status,
            headers=?redact_headers(headers),
            body=%text,
            truncated
        );
    }

    if status.is_success() {
        return Ok(());
    }

    let message = extract_error_message(bytes);
    tracing::warn!(
        req_id=%req_id,
        %status,
        message=%message,
        x_request_id=%request_id,
        "http.error"
    );
    Err(HttpError::Api {
        status,
        message,
        request_id,
    })
}

fn decode_json<T: DeserializeOwned>(req_id: &str, bytes: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice::<T>(bytes).map_err(|e| {
        let snippet = snip_body(bytes);
        tracing::warn!(
            req_id=%req_id,
            serde_err=%e,
            body_snippet=%snippet,
            "http.response.decode_error"
        );
        HttpError::Decode(e.to_string(), snippet)
    })
}

fn text_body(status: StatusCode, headers: &HeaderMap, bytes: &[u8]) -> TextBody {
    TextBody {
        status,
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn host_path(url: &Url) -> String {
    format!("{}{}", url.host_str().unwrap_or("-"), url.path())
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let secret = key.eq_ignore_ascii_case("authorization")
                || key.eq_ignore_ascii_case("x-api-key");
            let val = if secret {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

/// Pull a human-readable message out of a provider error body.
fn extract_error_message(body: &[u8]) -> String {
    // OpenAI and Anthropic both nest it: {"error":{"message":"..."}}
    let Ok(val) = serde_json::from_slice::<serde_json::Value>(body) else {
        return snip_body(body);
    };
    let nested = val
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str());
    let flat = ["message", "detail", "error"]
        .iter()
        .find_map(|k| val.get(*k).and_then(|m| m.as_str()));
    match nested.or(flat) {
        Some(msg) if !msg.is_empty() => msg.to_string(),
        _ => snip_body(body),
    }
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    if s.is_empty() {
        return Err(HttpError::Build("API key is empty".into()));
    }
    Ok(s)
}

/// Validate a secret for use as a raw header value (e.g. `x-api-key`).
pub fn secret_header(name: &'static str, raw: &str) -> Result<Auth<'static>, HttpError> {
    let key = sanitize_api_key(raw)?;
    let mut value =
        HeaderValue::from_str(&key).map_err(|e| HttpError::Build(format!("invalid {name}: {e}")))?;
    value.set_sensitive(true);
    Ok(Auth::Header {
        name: HeaderName::from_static(name),
        value,
    })
}
