// # HTTP Fetch Functions
//
// This crate provides HTTP-backed fetch functions for datasync sources.
//
// ## Purpose
//
// The core never performs network calls itself: a source is handed a
// `FetchFunction` and only decides *when* to call it. This crate is the
// stock answer to *what* to call for JSON endpoints:
// - `HttpFetcher`: one `GET`, body decoded as `T`
// - `PagedFetcher`: walks a paged list endpoint (`records` plus
//   `navigation.nextPage`) until the last page and returns every record
//
// ## Errors
//
// Transport failures and non-success statuses become `Error::Http`,
// undecodable bodies become `Error::Json`. Nothing here retries: the
// scheduler owns the retry timer.

use datasync_core::traits::FetchFunction;
use datasync_core::{Error, Result};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use std::marker::PhantomData;
use std::time::Duration;

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Page size requested from paged list endpoints
pub const DEFAULT_PER_PAGE: u32 = 1000;

/// Upper bound on pages walked by a single fetch
const MAX_PAGES: u32 = 1000;

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Shared request settings for both fetchers
#[derive(Clone)]
struct Endpoint {
    url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            bearer_token: None,
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    async fn get_json<B: DeserializeOwned>(&self, query: &[(&str, String)]) -> Result<B> {
        let mut request = self.client.get(&self.url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("{} returned {}", self.url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Fetches a single JSON document with `GET`
pub struct HttpFetcher<T> {
    endpoint: Endpoint,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpFetcher<T> {
    /// Create a fetcher for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new(url.into()),
            _marker: PhantomData,
        }
    }

    /// Send `Authorization: Bearer {token}` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.bearer_token = Some(token.into());
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.client = build_client(timeout);
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

#[async_trait::async_trait]
impl<T> FetchFunction<T> for HttpFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        tracing::debug!("GET {}", self.endpoint.url);
        self.endpoint.get_json(&[]).await
    }
}

/// One page of a paged list endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<R> {
    /// Records on this page
    #[serde(default = "Vec::new")]
    pub records: Vec<R>,

    /// Paging links
    #[serde(default)]
    pub navigation: Navigation,
}

impl<R> Page<R> {
    /// Whether the server advertised a following page
    pub fn has_next(&self) -> bool {
        self.navigation.next_page.is_some()
    }
}

/// Paging links of a [`Page`]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    /// Link to the next page, absent on the last one
    #[serde(default)]
    pub next_page: Option<PageLink>,
}

/// A single paging link
#[derive(Debug, Deserialize)]
pub struct PageLink {
    /// Absolute URI of the page
    #[serde(default)]
    pub uri: Option<String>,
}

/// Fetches every record of a paged list endpoint
///
/// Pages are requested with `page` and `perPage` query parameters,
/// starting at 1, until a page comes back without `navigation.nextPage`.
pub struct PagedFetcher<R> {
    endpoint: Endpoint,
    per_page: u32,
    _marker: PhantomData<fn() -> R>,
}

impl<R> PagedFetcher<R> {
    /// Create a paged fetcher for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::new(url.into()),
            per_page: DEFAULT_PER_PAGE,
            _marker: PhantomData,
        }
    }

    /// Send `Authorization: Bearer {token}` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.endpoint.bearer_token = Some(token.into());
        self
    }

    /// Override the requested page size
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint.client = build_client(timeout);
        self
    }

    /// Requested page size
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    fn page_query(&self, page: u32) -> [(&'static str, String); 2] {
        [("page", page.to_string()), ("perPage", self.per_page.to_string())]
    }
}

/// Collect the records of consecutive pages until one has no successor
///
/// Split out of [`PagedFetcher`] so the paging loop does not depend on
/// the transport.
pub async fn collect_pages<R, F, Fut>(mut fetch_page: F) -> Result<Vec<R>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Page<R>>>,
{
    let mut records = Vec::new();
    let mut page = 1;

    loop {
        let current = fetch_page(page).await?;
        let has_next = current.has_next();
        records.extend(current.records);

        if !has_next {
            return Ok(records);
        }
        if page >= MAX_PAGES {
            return Err(Error::http(format!(
                "paged list did not end after {} pages",
                MAX_PAGES
            )));
        }
        page += 1;
    }
}

#[async_trait::async_trait]
impl<R> FetchFunction<Vec<R>> for PagedFetcher<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<Vec<R>> {
        let records = collect_pages(|page| {
            let query = self.page_query(page);
            async move {
                tracing::debug!("GET {} (page {})", self.endpoint.url, page);
                self.endpoint.get_json::<Page<R>>(&query).await
            }
        })
        .await?;

        tracing::debug!("{}: fetched {} records", self.endpoint.url, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn page(json: &str) -> Page<u32> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn page_without_navigation_is_last() {
        let last = page(r#"{ "records": [1, 2] }"#);
        assert_eq!(last.records, vec![1, 2]);
        assert!(!last.has_next());

        let more = page(r#"{ "records": [], "navigation": { "nextPage": { "uri": "https://x/?page=2" } } }"#);
        assert!(more.has_next());
    }

    #[tokio::test]
    async fn pages_are_walked_until_exhausted() {
        let pages = Mutex::new(VecDeque::from(vec![
            r#"{ "records": [1, 2], "navigation": { "nextPage": {} } }"#,
            r#"{ "records": [3], "navigation": { "nextPage": {} } }"#,
            r#"{ "records": [4], "navigation": {} }"#,
        ]));
        let requested = Mutex::new(Vec::new());

        let records = collect_pages(|n| {
            requested.lock().unwrap().push(n);
            let next = pages.lock().unwrap().pop_front();
            async move { next.map(page).ok_or_else(|| Error::http("no more pages")) }
        })
        .await
        .unwrap();

        assert_eq!(records, vec![1, 2, 3, 4]);
        assert_eq!(*requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn a_failing_page_fails_the_whole_list() {
        let result = collect_pages(|n| async move {
            if n == 2 {
                Err(Error::http("503"))
            } else {
                Ok(page(r#"{ "records": [1], "navigation": { "nextPage": {} } }"#))
            }
        })
        .await;

        assert_eq!(result, Err(Error::http("503")));
    }

    #[test]
    fn paged_query_carries_page_and_size() {
        let fetcher = PagedFetcher::<u32>::new("https://api.example.com/calls").with_per_page(0);
        assert_eq!(fetcher.per_page(), 1);

        let fetcher = fetcher.with_per_page(250);
        let query = fetcher.page_query(3);
        assert_eq!(query[0], ("page", "3".to_string()));
        assert_eq!(query[1], ("perPage", "250".to_string()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_http_error() {
        let fetcher = HttpFetcher::<serde_json::Value>::new("http://127.0.0.1:1/calls")
            .with_bearer_token("token")
            .with_timeout(Duration::from_secs(2));
        assert_eq!(fetcher.url(), "http://127.0.0.1:1/calls");

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
