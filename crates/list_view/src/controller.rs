//! Wires list triggers (src changes, viewport proximity, button clicks, refresh)
//! to the query controller.

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use query_core::InfiniteQuery;
use shared::domain::LoadMoreMode;
use tokio::sync::watch;
use tracing::debug;

use crate::{
    options::ListOptions,
    render::{render, should_auto_load, ListRender, ListState},
    source::{JsonFetcher, ListSource, ReqwestFetcher},
};

/// A mounted list. Trigger methods return the fetch to await or spawn; triggers
/// that do not apply return an already completed future.
#[derive(Clone)]
pub struct ListController {
    options: Arc<ListOptions>,
    query: InfiniteQuery<ListSource>,
}

impl ListController {
    pub fn new(options: ListOptions) -> Self {
        Self::with_fetcher(options, Arc::new(ReqwestFetcher::new()))
    }

    pub fn with_fetcher(options: ListOptions, fetcher: Arc<dyn JsonFetcher>) -> Self {
        let source = ListSource::new(
            fetcher,
            options.src.clone(),
            options.load_more_bookmark.clone(),
        );
        Self {
            options: Arc::new(options),
            query: InfiniteQuery::new(source),
        }
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    pub fn query(&self) -> &InfiniteQuery<ListSource> {
        &self.query
    }

    pub fn state(&self) -> ListState {
        self.query.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.query.subscribe()
    }

    pub fn render(&self) -> ListRender {
        render(&self.query.state(), &self.options)
    }

    /// Initial fetch of the current src.
    pub fn mount(&self) -> BoxFuture<'static, ()> {
        self.query.reset().boxed()
    }

    /// Points the list at another src; only a real change discards the loaded pages.
    pub fn set_src(&self, src: Option<String>) -> BoxFuture<'static, ()> {
        if !self.query.source().replace_src(src) {
            return future::ready(()).boxed();
        }
        debug!("list: src changed, resetting");
        self.query.reset().boxed()
    }

    pub fn set_renderable(&self, renderable: bool) {
        self.query.source().set_renderable(renderable);
    }

    /// Viewport proximity of the end-of-list sentinel changed.
    pub fn viewport_changed(&self, near_viewport: bool) -> BoxFuture<'static, ()> {
        let state = self.query.state();
        let renderable = self.query.source().is_renderable();
        if !should_auto_load(&state, &self.options, near_viewport, renderable) {
            return future::ready(()).boxed();
        }
        self.query.load_more(false).boxed()
    }

    /// The "load more" button was activated.
    pub fn click_load_more(&self) -> BoxFuture<'static, ()> {
        if self.options.load_more != LoadMoreMode::Manual || !self.query.state().has_more {
            return future::ready(()).boxed();
        }
        self.query.load_more(false).boxed()
    }

    pub fn refresh(&self) -> BoxFuture<'static, ()> {
        self.query.reset().boxed()
    }

    pub fn teardown(&self) {
        self.query.teardown();
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
