//! Blocking page client.
//!
//! Wraps `reqwest::blocking::Client`, which owns an internal runtime. Build
//! and drop it outside of any async context; calling it from plain threads
//! (including rayon workers) is fine and the connection pool is shared.

use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;

use crate::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_USER_AGENT, HttpError, TextBody, finish, host_path,
    next_request_id, text_body,
};

#[derive(Clone, Debug)]
pub struct BlockingHttpClient {
    inner: Client,
    timeout: Duration,
}

impl BlockingHttpClient {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self { inner, timeout })
    }

    /// GET an absolute URL and return its body as text.
    pub fn get_text(&self, url: &str) -> Result<TextBody, HttpError> {
        let url = reqwest::Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;
        let req_id = next_request_id();
        tracing::debug!(
            req_id=%req_id,
            method=%Method::GET,
            host_path=%host_path(&url),
            timeout_ms=self.timeout.as_millis() as u64,
            "http.request.start"
        );

        let t0 = Instant::now();
        let resp = self.inner.get(url).send().map_err(|err| {
            let err = HttpError::from_send(err, self.timeout);
            tracing::warn!(req_id=%req_id, error=%err, "http.network_error.send");
            err
        })?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().map_err(|err| {
            let err = HttpError::from_send(err, self.timeout);
            tracing::warn!(req_id=%req_id, error=%err, "http.network_error.body");
            err
        })?;

        finish(&req_id, status, &headers, &bytes, t0)?;
        Ok(text_body(status, &headers, &bytes))
    }
}
