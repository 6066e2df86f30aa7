//! HTTP index scanner backend.
//!
//! Fetches an HTML index page, collects the links whose final path segment
//! passes the name filter, then issues a `HEAD` per link and fingerprints it
//! from the response headers.

use crate::archive::{ArchiveEntry, Fingerprint};
use crate::backend::ScannerBackend;
use crate::error::{ErrorKind, Result};
use crate::filter::NameFilter;
use crate::location::Location;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// HTTP(S) scanner backend.
///
/// Accepts `http:` and `https:` locations that serve an HTML index (e.g. an
/// auto-index directory listing). Credentials in the location's user-info
/// are sent as basic auth.
///
/// Every request is bounded by the client timeout; a hanging endpoint stalls
/// only the worker scanning it, and only until the timeout fires.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    name: String,
    client: Client,
    interval: Duration,
}
impl HttpBackend {
    /// Create a backend with the [default request timeout](DEFAULT_TIMEOUT).
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::with_timeout(name, DEFAULT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client (TLS backend) can't be initialized.
    pub fn with_timeout(name: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::BackendError("failed to initialize HTTP client".to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            interval: DEFAULT_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn request(&self, method: Method, url: &Url, location: &Location) -> RequestBuilder {
        let request = self.client.request(method, url.clone());
        match location.credentials() {
            Some((user, password)) => request.basic_auth(user, password),
            None => request,
        }
    }

    /// `HEAD` one archive link. `None` if the server says it is gone (404 or
    /// 410); any other failure fails the pass so the archive is not reported
    /// as removed.
    async fn fingerprint(&self, location: &Location, link: &Url) -> Result<Option<Fingerprint>> {
        let response = self
            .request(Method::HEAD, link, location)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(link.to_string()))?;
        let status = response.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) {
            tracing::debug!(backend = self.name(), link = %link, status = %status, "Skipping missing archive link");
            return Ok(None);
        }
        if !status.is_success() {
            exn::bail!(ErrorKind::Network(format!("{link}: {status}")));
        }
        Ok(Some(fingerprint_from_headers(response.headers())))
    }
}

#[async_trait]
impl ScannerBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, location: &Location) -> bool {
        matches!(location.scheme(), "http" | "https")
    }

    fn default_interval(&self) -> Duration {
        self.interval
    }

    async fn list(&self, location: &Location, filter: &dyn NameFilter) -> Result<Vec<ArchiveEntry>> {
        let index = self
            .request(Method::GET, location.url(), location)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .or_raise(|| ErrorKind::Network(location.to_string()))?
            .text()
            .await
            .or_raise(|| ErrorKind::Network(location.to_string()))?;
        let links = extract_links(location.url(), &index, filter);
        tracing::trace!(backend = self.name(), location = %location, links = links.len(), "Fetched index");

        let mut archives = Vec::with_capacity(links.len());
        for link in links {
            if let Some(fingerprint) = self.fingerprint(location, &link).await? {
                archives.push(ArchiveEntry::new(link.to_string(), fingerprint, link));
            }
        }
        Ok(archives)
    }
}

/// Collect archive links from an index page, resolved against `base`.
///
/// Only `http(s)` links whose last path segment passes `filter` are kept;
/// fragments are dropped and duplicates removed (first occurrence wins).
fn extract_links(base: &Url, html: &str, filter: &dyn NameFilter) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(&LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|link| matches!(link.scheme(), "http" | "https"))
        .map(|mut link| {
            link.set_fragment(None);
            link
        })
        .filter(|link| {
            let path = link.path();
            let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
            !name.is_empty() && filter.accept(dir, name)
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

fn fingerprint_from_headers(headers: &HeaderMap) -> Fingerprint {
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Fingerprint::Http {
        etag: header(ETAG),
        last_modified: header(LAST_MODIFIED),
        length: header(CONTENT_LENGTH).and_then(|v| v.parse().ok()),
    }
}
