use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use query_core::PageSource;
use reqwest::{header::ACCEPT, Client};
use serde_json::Value;
use shared::error::{ErrorCode, FetchError};
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use crate::json_path::next_page_url;

/// Fetches one JSON document.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, url: &Url) -> Result<Value, FetchError>;
}

pub struct ReqwestFetcher {
    http: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JsonFetcher for ReqwestFetcher {
    async fn fetch_json(&self, url: &Url) -> Result<Value, FetchError> {
        let res = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| FetchError::new(ErrorCode::Transport, err.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::status(
                status.as_u16(),
                format!("GET {url} returned {status}"),
            ));
        }

        res.json::<Value>()
            .await
            .map_err(|err| FetchError::new(ErrorCode::Decode, err.to_string()))
    }
}

/// Page source for a list: the first page comes from `src`, later pages from the
/// bookmark URL found in the previous page.
pub struct ListSource {
    fetcher: Arc<dyn JsonFetcher>,
    src: watch::Sender<Option<String>>,
    bookmark: String,
    renderable: AtomicBool,
}

impl ListSource {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        src: Option<String>,
        bookmark: impl Into<String>,
    ) -> Self {
        let (src, _) = watch::channel(src);
        Self {
            fetcher,
            src,
            bookmark: bookmark.into(),
            renderable: AtomicBool::new(true),
        }
    }

    pub fn src(&self) -> Option<String> {
        self.src.borrow().clone()
    }

    /// Swaps the list source. Returns whether it actually changed.
    pub fn replace_src(&self, src: Option<String>) -> bool {
        self.src.send_if_modified(|current| {
            if *current == src {
                return false;
            }
            *current = src;
            true
        })
    }

    pub fn is_renderable(&self) -> bool {
        self.renderable.load(Ordering::Acquire)
    }

    pub fn set_renderable(&self, renderable: bool) {
        self.renderable.store(renderable, Ordering::Release);
    }

    fn resolve(&self, target: &str) -> Result<Url, FetchError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.src().ok_or_else(|| {
                    FetchError::new(
                        ErrorCode::InvalidUrl,
                        format!("relative url '{target}' without a list src"),
                    )
                })?;
                Url::parse(&base)
                    .and_then(|base_url| base_url.join(target))
                    .map_err(|err| {
                        FetchError::new(
                            ErrorCode::InvalidUrl,
                            format!("cannot resolve '{target}' against '{base}': {err}"),
                        )
                    })
            }
            Err(err) => Err(FetchError::new(
                ErrorCode::InvalidUrl,
                format!("invalid url '{target}': {err}"),
            )),
        }
    }
}

#[async_trait]
impl PageSource for ListSource {
    type Page = Value;
    type Param = String;
    type Error = FetchError;

    async fn fetch_page(&self, param: Option<String>) -> Result<Value, FetchError> {
        if !self.is_renderable() {
            debug!("list: host not renderable, skipping fetch");
            return Ok(Value::Null);
        }
        let Some(target) = param.or_else(|| self.src()) else {
            return Ok(Value::Null);
        };

        let url = self.resolve(&target)?;
        debug!("list: fetching page url={url}");
        self.fetcher.fetch_json(&url).await
    }

    /// A null page (skipped fetch) continues from `src`, so the list can still load
    /// once the host becomes renderable or gets a src.
    fn next_page_param(&self, page: &Value) -> Option<String> {
        if page.is_null() {
            return self.src();
        }
        next_page_url(page, &self.bookmark)
    }
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
