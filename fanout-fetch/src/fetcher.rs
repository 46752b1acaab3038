use std::time::{Duration, Instant};

use fanout_http::blocking::BlockingHttpClient;
use fanout_http::{HttpClient, HttpError, RequestOpts, TextBody};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{DEFAULT_PARAGRAPHS, intro_paragraphs};

/// How pages are requested and how much of each is kept.
///
/// Serializable so a process-pool worker can be handed the exact settings
/// of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Leading paragraphs extracted from each page.
    pub paragraphs: usize,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Overrides the default `fanout/<version>` user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            paragraphs: DEFAULT_PARAGRAPHS,
            timeout_secs: fanout_http::DEFAULT_TIMEOUT.as_secs(),
            user_agent: None,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: HttpError,
    },
    #[error("{url} is not an HTML document (content-type {content_type})")]
    NotHtml { url: String, content_type: String },
    #[error("building http client: {0}")]
    Client(#[source] HttpError),
}

impl FetchError {
    /// The page the error belongs to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Http { url, .. } | Self::NotHtml { url, .. } => Some(url),
            Self::Client(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Http {
                source: HttpError::Timeout(_),
                ..
            }
        )
    }
}

/// Retrieves pages and reduces them to their intro text.
///
/// Owns a blocking client shared by every caller thread. Async callers bring
/// their own [`HttpClient`] session from [`Fetcher::session`] so one session
/// serves a whole batch.
#[derive(Debug, Clone)]
pub struct Fetcher {
    settings: FetchSettings,
    client: BlockingHttpClient,
}

impl Fetcher {
    /// Build outside of any async runtime; the blocking client owns one.
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = BlockingHttpClient::new(settings.timeout(), settings.user_agent.as_deref())
            .map_err(FetchError::Client)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// A fresh async session configured like the blocking client.
    pub fn session(&self) -> Result<HttpClient, FetchError> {
        HttpClient::unanchored(self.settings.user_agent.as_deref())
            .map(|client| client.with_timeout(self.settings.timeout()))
            .map_err(FetchError::Client)
    }

    /// Fetch `url` on the calling thread and return its intro text.
    pub fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let page = self.client.get_text(url).map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        self.finish(url, page, t0)
    }

    /// Fetch `url` through a shared async session and return its intro text.
    pub async fn fetch_async(&self, session: &HttpClient, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let page = session
            .get_text(url, RequestOpts::default())
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        self.finish(url, page, t0)
    }

    fn finish(&self, url: &str, page: TextBody, t0: Instant) -> Result<String, FetchError> {
        ensure_markup(url, page.content_type.as_deref())?;
        let text = intro_paragraphs(&page.body, self.settings.paragraphs);
        tracing::debug!(
            url = %url,
            bytes = page.body.len(),
            chars = text.chars().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "fetch.extracted"
        );
        if text.is_empty() {
            tracing::info!(url = %url, "fetch.no_paragraphs");
        }
        Ok(text)
    }
}

/// Accepts a missing content type, `text/*`, and anything HTML or XML flavoured.
fn ensure_markup(url: &str, content_type: Option<&str>) -> Result<(), FetchError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let mime = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
    {
        Ok(())
    } else {
        Err(FetchError::NotHtml {
            url: url.to_string(),
            content_type: raw.to_string(),
        })
    }
}
