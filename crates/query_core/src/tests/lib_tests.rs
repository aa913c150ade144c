use super::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
};
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestPage {
    id: &'static str,
    next: Option<u32>,
}

fn page(id: &'static str, next: Option<u32>) -> TestPage {
    TestPage { id, next }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

type Reply = oneshot::Sender<Result<TestPage, TestError>>;

/// Source whose fetches stay pending until the test resolves them by call index.
#[derive(Clone, Default)]
struct GatedSource {
    calls: Arc<Mutex<Vec<Option<u32>>>>,
    pending: Arc<Mutex<Vec<Option<Reply>>>>,
}

impl GatedSource {
    async fn wait_for_calls(&self, expected: usize) {
        for _ in 0..200 {
            if self.calls.lock().await.len() >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {expected} fetch calls");
    }

    async fn resolve(&self, index: usize, result: Result<TestPage, TestError>) {
        let reply = {
            let mut pending = self.pending.lock().await;
            pending[index].take().expect("fetch already resolved")
        };
        let _ = reply.send(result);
    }

    async fn call_params(&self) -> Vec<Option<u32>> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl PageSource for GatedSource {
    type Page = TestPage;
    type Param = u32;
    type Error = TestError;

    async fn fetch_page(&self, param: Option<u32>) -> Result<TestPage, TestError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.push(Some(tx));
        self.calls.lock().await.push(param);
        rx.await
            .unwrap_or_else(|_| Err(TestError("gate dropped".into())))
    }

    fn next_page_param(&self, page: &TestPage) -> Option<u32> {
        page.next
    }
}

/// Resolves immediately from a fixed table keyed by the requested cursor.
fn scripted_source(
    fetches: Arc<AtomicUsize>,
    failing: Arc<Mutex<bool>>,
) -> impl PageSource<Page = TestPage, Param = u32, Error = TestError> {
    let table: Arc<HashMap<Option<u32>, TestPage>> = Arc::new(HashMap::from([
        (None, page("p1", Some(2))),
        (Some(2), page("p2", Some(3))),
        (Some(3), page("p3", None)),
    ]));
    FnSource::new(
        move |param: Option<u32>| {
            let table = Arc::clone(&table);
            let fetches = Arc::clone(&fetches);
            let failing = Arc::clone(&failing);
            async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                if *failing.lock().await {
                    return Err(TestError("boom".into()));
                }
                table
                    .get(&param)
                    .cloned()
                    .ok_or_else(|| TestError(format!("no page for {param:?}")))
            }
        },
        |page: &TestPage| page.next,
    )
}

fn ids(state: &QueryState<TestPage, TestError>) -> Vec<&'static str> {
    state.pages.iter().map(|page| page.id).collect()
}

#[tokio::test]
async fn initial_state_is_idle_and_assumes_more_pages() {
    let query = InfiniteQuery::new(GatedSource::default());

    assert_eq!(query.state(), QueryState::initial());
    assert!(!query.state().loading);
    assert!(query.state().error.is_none());
    assert!(query.state().pages.is_empty());
    assert!(query.state().has_more);
    assert!(query.is_active());
}

#[tokio::test]
async fn load_more_accumulates_pages_following_next_params() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = InfiniteQuery::new(scripted_source(
        Arc::clone(&fetches),
        Arc::new(Mutex::new(false)),
    ));

    query.load_more(false).await;
    let state = query.state();
    assert_eq!(ids(&state), vec!["p1"]);
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert!(state.has_more);

    query.load_more(false).await;
    assert_eq!(ids(&query.state()), vec!["p1", "p2"]);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn continuation_param_comes_from_last_accepted_page() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let first = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    source.resolve(0, Ok(page("p1", Some(7)))).await;
    first.await.expect("first load");

    let second = tokio::spawn(query.load_more(false));
    source.wait_for_calls(2).await;
    source.resolve(1, Ok(page("p2", None))).await;
    second.await.expect("second load");

    assert_eq!(source.call_params().await, vec![None, Some(7)]);
}

#[tokio::test]
async fn has_more_turns_false_on_page_without_next_param() {
    let query = InfiniteQuery::new(scripted_source(
        Arc::new(AtomicUsize::new(0)),
        Arc::new(Mutex::new(false)),
    ));

    for _ in 0..3 {
        query.load_more(false).await;
    }

    let state = query.state();
    assert_eq!(ids(&state), vec!["p1", "p2", "p3"]);
    assert!(!state.has_more);
}

#[tokio::test]
async fn duplicate_load_more_while_in_flight_fetches_once() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let first = query.load_more(false);
    assert!(query.state().loading);
    let second = query.load_more(false);

    let first = tokio::spawn(first);
    let second = tokio::spawn(second);
    source.wait_for_calls(1).await;
    second.await.expect("duplicate call");
    assert!(query.state().loading);

    source.resolve(0, Ok(page("p1", Some(2)))).await;
    first.await.expect("first call");

    assert_eq!(source.call_params().await.len(), 1);
    assert_eq!(ids(&query.state()), vec!["p1"]);
    assert!(!query.state().loading);
}

#[tokio::test]
async fn reset_supersedes_in_flight_load_regardless_of_resolution_order() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let call_a = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    let call_b = tokio::spawn(query.reset());
    source.wait_for_calls(2).await;

    source.resolve(1, Ok(page("b", None))).await;
    call_b.await.expect("reset");
    assert_eq!(ids(&query.state()), vec!["b"]);
    assert!(!query.state().loading);

    source.resolve(0, Ok(page("a", Some(2)))).await;
    call_a.await.expect("stale load");

    let state = query.state();
    assert_eq!(ids(&state), vec!["b"]);
    assert!(!state.has_more);
    assert!(!state.loading);
}

#[tokio::test]
async fn superseded_failure_is_discarded_silently() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());
    let mut rx = query.subscribe();

    let call_a = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    let call_b = tokio::spawn(query.reset());
    source.wait_for_calls(2).await;

    source.resolve(1, Ok(page("b", Some(2)))).await;
    call_b.await.expect("reset");
    let _ = rx.borrow_and_update();

    source.resolve(0, Err(TestError("late failure".into()))).await;
    call_a.await.expect("stale load");

    assert!(query.state().error.is_none());
    assert_eq!(ids(&query.state()), vec!["b"]);
    assert!(!rx.has_changed().expect("controller alive"));
}

#[tokio::test]
async fn failure_keeps_previous_pages_and_reports_error() {
    let failing = Arc::new(Mutex::new(false));
    let query = InfiniteQuery::new(scripted_source(
        Arc::new(AtomicUsize::new(0)),
        Arc::clone(&failing),
    ));

    query.load_more(false).await;
    *failing.lock().await = true;
    query.load_more(false).await;

    let state = query.state();
    assert_eq!(ids(&state), vec!["p1"]);
    assert_eq!(state.error, Some(TestError("boom".into())));
    assert!(!state.loading);
    assert!(state.has_more);
}

#[tokio::test]
async fn next_success_clears_error() {
    let failing = Arc::new(Mutex::new(true));
    let query = InfiniteQuery::new(scripted_source(
        Arc::new(AtomicUsize::new(0)),
        Arc::clone(&failing),
    ));

    query.load_more(false).await;
    assert!(query.state().error.is_some());
    assert!(query.state().pages.is_empty());

    *failing.lock().await = false;
    query.load_more(false).await;

    let state = query.state();
    assert!(state.error.is_none());
    assert_eq!(ids(&state), vec!["p1"]);
}

#[tokio::test]
async fn reset_replaces_accumulated_pages_with_first_page() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = InfiniteQuery::new(scripted_source(
        Arc::clone(&fetches),
        Arc::new(Mutex::new(false)),
    ));

    query.load_more(false).await;
    query.load_more(false).await;
    assert_eq!(ids(&query.state()), vec!["p1", "p2"]);

    let reset = query.reset();
    let during = query.state();
    assert!(during.loading);
    assert_eq!(ids(&during), vec!["p1", "p2"]);
    reset.await;

    let state = query.state();
    assert_eq!(ids(&state), vec!["p1"]);
    assert!(state.has_more);
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn reset_proceeds_while_load_is_in_flight() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let _pending = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    let reset = tokio::spawn(query.reset());
    source.wait_for_calls(2).await;

    assert_eq!(source.call_params().await, vec![None, None]);
    source.resolve(1, Ok(page("fresh", None))).await;
    reset.await.expect("reset");
    assert_eq!(ids(&query.state()), vec!["fresh"]);
}

#[tokio::test]
async fn teardown_suppresses_pending_outcome() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let pending = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    let before = query.state();

    query.teardown();
    source.resolve(0, Ok(page("late", None))).await;
    pending.await.expect("pending load must not panic");

    assert!(!query.is_active());
    assert_eq!(query.state(), before);
}

#[tokio::test]
async fn calls_after_teardown_do_not_fetch() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = InfiniteQuery::new(scripted_source(
        Arc::clone(&fetches),
        Arc::new(Mutex::new(false)),
    ));

    query.teardown();
    query.load_more(false).await;
    query.reset().await;

    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert_eq!(query.state(), QueryState::initial());
}

#[tokio::test]
async fn dropped_controller_suppresses_pending_outcome() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());
    let rx = query.subscribe();

    let pending = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    drop(query);

    source.resolve(0, Ok(page("late", None))).await;
    pending.await.expect("pending load must not panic");

    let last = rx.borrow().clone();
    assert!(last.loading);
    assert!(last.pages.is_empty());
}

#[tokio::test]
async fn subscribers_see_start_and_commit_transitions() {
    let query = InfiniteQuery::new(scripted_source(
        Arc::new(AtomicUsize::new(0)),
        Arc::new(Mutex::new(false)),
    ));
    let mut rx = query.subscribe();

    let load = query.load_more(false);
    assert!(rx.has_changed().expect("controller alive"));
    assert!(rx.borrow_and_update().loading);

    load.await;
    assert!(rx.has_changed().expect("controller alive"));
    let committed = rx.borrow_and_update().clone();
    assert!(!committed.loading);
    assert_eq!(ids(&committed), vec!["p1"]);
}

#[tokio::test]
async fn dropping_unpolled_future_releases_loading() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = InfiniteQuery::new(scripted_source(
        Arc::clone(&fetches),
        Arc::new(Mutex::new(false)),
    ));

    let abandoned = query.load_more(false);
    assert!(query.state().loading);
    drop(abandoned);

    let state = query.state();
    assert!(!state.loading);
    assert!(state.pages.is_empty());
    assert_eq!(fetches.load(Ordering::SeqCst), 0);

    query.load_more(false).await;
    assert_eq!(ids(&query.state()), vec!["p1"]);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn aborting_fetch_in_flight_allows_next_load() {
    let source = GatedSource::default();
    let query = InfiniteQuery::new(source.clone());

    let task = tokio::spawn(query.load_more(false));
    source.wait_for_calls(1).await;
    task.abort();
    assert!(task.await.expect_err("aborted").is_cancelled());
    assert!(!query.state().loading);

    let retry = tokio::spawn(query.load_more(false));
    source.wait_for_calls(2).await;
    source.resolve(1, Ok(page("p1", None))).await;
    retry.await.expect("retry");

    assert_eq!(source.call_params().await, vec![None, None]);
    assert_eq!(ids(&query.state()), vec!["p1"]);
}

#[tokio::test]
async fn dropping_superseded_future_keeps_newer_fetch_loading() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let query = InfiniteQuery::new(scripted_source(
        Arc::clone(&fetches),
        Arc::new(Mutex::new(false)),
    ));

    let stale = query.load_more(false);
    let reset = query.reset();
    drop(stale);
    assert!(query.state().loading);

    reset.await;
    let state = query.state();
    assert!(!state.loading);
    assert_eq!(ids(&state), vec!["p1"]);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

/// Reads the controller's own state from its continuation callback.
struct ReentrantSource {
    query: OnceLock<InfiniteQuery<ReentrantSource>>,
    observed: std::sync::Mutex<Vec<usize>>,
}

#[async_trait]
impl PageSource for ReentrantSource {
    type Page = TestPage;
    type Param = u32;
    type Error = TestError;

    async fn fetch_page(&self, param: Option<u32>) -> Result<TestPage, TestError> {
        match param {
            None => Ok(page("p1", Some(2))),
            Some(2) => Ok(page("p2", None)),
            Some(other) => Err(TestError(format!("no page for {other}"))),
        }
    }

    fn next_page_param(&self, page: &TestPage) -> Option<u32> {
        if let Some(query) = self.query.get() {
            let pages = query.state().pages.len();
            self.observed.lock().expect("observed lock").push(pages);
        }
        page.next
    }
}

#[tokio::test]
async fn source_callbacks_may_read_controller_state() {
    let query = InfiniteQuery::new(ReentrantSource {
        query: OnceLock::new(),
        observed: std::sync::Mutex::new(Vec::new()),
    });
    assert!(query.source().query.set(query.clone()).is_ok());

    query.load_more(false).await;
    query.load_more(false).await;

    let state = query.state();
    assert_eq!(ids(&state), vec!["p1", "p2"]);
    assert!(!state.has_more);
    assert!(!query.source().observed.lock().expect("observed lock").is_empty());
}
