//! Paginated query controller: sequences page fetches, drops superseded results and
//! publishes whole [`QueryState`] snapshots to whoever renders them.

use std::{
    fmt,
    future::Future,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

mod safe_state;
pub use safe_state::SafeState;

/// Snapshot of a paginated query. Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState<P, E> {
    pub loading: bool,
    pub error: Option<E>,
    pub pages: Vec<P>,
    /// Assumed `true` until the first accepted page says otherwise.
    pub has_more: bool,
}

impl<P, E> QueryState<P, E> {
    pub fn initial() -> Self {
        Self {
            loading: false,
            error: None,
            pages: Vec::new(),
            has_more: true,
        }
    }

    pub fn last_page(&self) -> Option<&P> {
        self.pages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl<P, E> Default for QueryState<P, E> {
    fn default() -> Self {
        Self::initial()
    }
}

/// Where pages come from and how to continue after one.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Page: Clone + Send + Sync + 'static;
    type Param: Send + 'static;
    type Error: Clone + fmt::Display + Send + Sync + 'static;

    /// Fetches the page identified by `param`, or the first page when `param` is `None`.
    async fn fetch_page(&self, param: Option<Self::Param>) -> Result<Self::Page, Self::Error>;

    /// Continuation parameter for the page after `page`; `None` means there is none.
    fn next_page_param(&self, page: &Self::Page) -> Option<Self::Param>;
}

/// [`PageSource`] assembled from a fetch closure and a next-param closure.
pub struct FnSource<F, G, P, Q, E> {
    fetch: F,
    next: G,
    _marker: PhantomData<fn(Option<Q>) -> Result<P, E>>,
}

impl<F, G, P, Q, E> FnSource<F, G, P, Q, E> {
    pub fn new(fetch: F, next: G) -> Self {
        Self {
            fetch,
            next,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, G, Fut, P, Q, E> PageSource for FnSource<F, G, P, Q, E>
where
    F: Fn(Option<Q>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, E>> + Send + 'static,
    G: Fn(&P) -> Option<Q> + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
    Q: Send + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    type Page = P;
    type Param = Q;
    type Error = E;

    async fn fetch_page(&self, param: Option<Q>) -> Result<P, E> {
        (self.fetch)(param).await
    }

    fn next_page_param(&self, page: &P) -> Option<Q> {
        (self.next)(page)
    }
}

pub type SourceState<S> = QueryState<<S as PageSource>::Page, <S as PageSource>::Error>;

struct Shared<P, E> {
    sequence: AtomicU64,
    state: SafeState<QueryState<P, E>>,
}

/// One accepted `load_more` call, captured at the moment it started.
struct Attempt<S: PageSource> {
    basis: Vec<S::Page>,
    param: Option<S::Param>,
    in_flight: InFlight<S>,
}

/// Settles an attempt exactly once. Dropped unsettled, it clears `loading` if the
/// attempt is still the latest, so an abandoned future does not block later calls.
struct InFlight<S: PageSource> {
    shared: Weak<Shared<S::Page, S::Error>>,
    token: u64,
    settled: bool,
}

/// Controller for an infinite / paginated query.
///
/// Handles are cheap to clone and share one state. Only the most recently started
/// fetch may commit its outcome; older ones are ignored when they resolve.
pub struct InfiniteQuery<S: PageSource> {
    source: Arc<S>,
    shared: Arc<Shared<S::Page, S::Error>>,
}

impl<S: PageSource> Clone for InfiniteQuery<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: PageSource> fmt::Debug for InfiniteQuery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.get();
        f.debug_struct("InfiniteQuery")
            .field("sequence", &self.shared.sequence.load(Ordering::Acquire))
            .field("loading", &state.loading)
            .field("pages", &state.pages.len())
            .field("has_more", &state.has_more)
            .field("active", &self.shared.state.is_mounted())
            .finish()
    }
}

impl<S: PageSource> InfiniteQuery<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            shared: Arc::new(Shared {
                sequence: AtomicU64::new(0),
                state: SafeState::new(QueryState::initial()),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> SourceState<S> {
        self.shared.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<SourceState<S>> {
        self.shared.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.is_mounted()
    }

    /// Ends the owning session: pending and future transitions are dropped silently.
    pub fn teardown(&self) {
        debug!("query: session torn down");
        self.shared.state.unmount();
    }

    /// Requests the next page, or the first page again when `resetting`.
    ///
    /// The start of the call happens before this returns: the duplicate check,
    /// the sequence token and the `loading` transition. The returned future performs
    /// the fetch once polled and settles the outcome. It never fails; fetch errors are
    /// reported through [`QueryState::error`].
    ///
    /// Without `resetting`, a call made while a fetch is outstanding does nothing.
    pub fn load_more(&self, resetting: bool) -> impl Future<Output = ()> + Send + 'static {
        let attempt = self.begin(resetting);
        let source = Arc::clone(&self.source);

        async move {
            let Some(Attempt {
                basis,
                param,
                in_flight,
            }) = attempt
            else {
                return;
            };
            let outcome = source.fetch_page(param).await;
            in_flight.settle(&*source, basis, outcome);
        }
    }

    /// Discards accumulated pages and fetches the first page, superseding any
    /// fetch in flight.
    pub fn reset(&self) -> impl Future<Output = ()> + Send + 'static {
        self.load_more(true)
    }

    fn begin(&self, resetting: bool) -> Option<Attempt<S>> {
        let mut started = None;
        self.shared.state.update(|state| {
            if !resetting && state.loading {
                debug!("query: load_more ignored, fetch already in flight");
                return false;
            }

            let token = self.shared.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            let previous = (!resetting).then(|| state.clone());
            *state = QueryState {
                loading: true,
                ..state.clone()
            };
            started = Some((token, previous));
            true
        });

        let Some((token, previous)) = started else {
            if !self.shared.state.is_mounted() {
                debug!("query: load_more ignored, session torn down");
            }
            return None;
        };

        // Source callbacks run outside the state lock.
        let param = previous
            .as_ref()
            .and_then(QueryState::last_page)
            .and_then(|page| self.source.next_page_param(page));
        let basis = previous.map(|state| state.pages).unwrap_or_default();
        debug!(
            "query: fetch started token={token} resetting={resetting} basis_pages={}",
            basis.len()
        );

        Some(Attempt {
            basis,
            param,
            in_flight: InFlight {
                shared: Arc::downgrade(&self.shared),
                token,
                settled: false,
            },
        })
    }
}

impl<S: PageSource> InFlight<S> {
    fn settle(mut self, source: &S, basis: Vec<S::Page>, outcome: Result<S::Page, S::Error>) {
        self.settled = true;
        let token = self.token;
        let Some(shared) = self.shared.upgrade() else {
            debug!("query: dropping outcome token={token}, controller released");
            return;
        };
        if !shared.state.is_mounted() {
            debug!("query: dropping outcome token={token}, session torn down");
            return;
        }

        // Computed before taking the state lock.
        let has_more = match &outcome {
            Ok(page) => source.next_page_param(page).is_some(),
            Err(_) => false,
        };

        shared.state.update(|state| {
            let latest = shared.sequence.load(Ordering::Acquire);
            if latest != token {
                debug!("query: discarding superseded outcome token={token} latest={latest}");
                return false;
            }

            *state = match outcome {
                Ok(page) => {
                    let mut pages = basis;
                    pages.push(page);
                    QueryState {
                        loading: false,
                        error: None,
                        pages,
                        has_more,
                    }
                }
                Err(err) => {
                    warn!("query: page fetch failed token={token}: {err}");
                    QueryState {
                        loading: false,
                        error: Some(err),
                        ..state.clone()
                    }
                }
            };
            true
        });
    }
}

impl<S: PageSource> Drop for InFlight<S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let token = self.token;
        shared.state.update(|state| {
            if shared.sequence.load(Ordering::Acquire) != token || !state.loading {
                return false;
            }
            debug!("query: fetch abandoned before settling token={token}");
            *state = QueryState {
                loading: false,
                ..state.clone()
            };
            true
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
