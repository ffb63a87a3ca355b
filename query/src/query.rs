use std::{
    any::Any,
    cell::{Cell, RefCell},
    collections::BTreeSet,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
};

use leptos::*;

use crate::{
    dependency::{DependencySignal, DependencyTarget, DependencyWiring, StaleAction},
    query_cache::QueryCache,
    query_executor::run_fetch_loop,
    query_observer::{ListenerKey, Listeners},
    query_state::{CacheState, StaleState},
    timeout::{set_timeout, spawn_local},
    DependencyAction, FetchResult, Instant, QueryKey, QueryOptions, QueryResult, QueryValue,
    Subscription,
};

pub(crate) type Fetcher<V, E> = Rc<dyn Fn() -> Pin<Box<dyn Future<Output = FetchResult<V, E>>>>>;

/// A single keyed query: its fetch lifecycle, staleness, cache, and dependencies.
///
/// Cloning is cheap and yields a handle to the same query.
pub struct Query<V, E> {
    pub(crate) inner: Rc<QueryInner<V, E>>,
}

impl<V, E> Clone for Query<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub(crate) struct QueryInner<V, E> {
    key: QueryKey,
    fetcher: Fetcher<V, E>,
    options: QueryOptions<V, E>,

    // Fetching
    is_fetching: Cell<bool>,
    stopped_by: RefCell<BTreeSet<usize>>,

    // State
    current: RefCell<QueryResult<V, E>>,
    stale: RefCell<StaleState>,
    cache: RefCell<CacheState<V>>,

    // Synchronization
    in_use: Cell<bool>,
    exposed: RefCell<QueryResult<V, E>>,
    published_stale: Cell<bool>,
    result_listeners: Listeners<QueryResult<V, E>>,
    stale_listeners: Listeners<bool>,
    dependencies: RefCell<Vec<DependencyWiring>>,
}

pub(crate) struct WeakQuery<V, E>(Weak<QueryInner<V, E>>);

impl<V, E> WeakQuery<V, E> {
    pub(crate) fn upgrade(&self) -> Option<Query<V, E>> {
        self.0.upgrade().map(|inner| Query { inner })
    }
}

impl<V, E> Query<V, E>
where
    V: QueryValue,
    E: QueryValue,
{
    pub(crate) fn new<Fu>(
        key: QueryKey,
        fetcher: impl Fn() -> Fu + 'static,
        options: QueryOptions<V, E>,
    ) -> Self
    where
        Fu: Future<Output = FetchResult<V, E>> + 'static,
    {
        let fetcher: Fetcher<V, E> = Rc::new(move || {
            Box::pin(fetcher()) as Pin<Box<dyn Future<Output = FetchResult<V, E>>>>
        });
        let current = QueryResult::Loading;
        let stale = StaleState::new();
        let cache = CacheState::new();
        let exposed = derive_result(&current, &stale, &cache);
        let published_stale = stale.is_stale;

        Query {
            inner: Rc::new(QueryInner {
                key,
                fetcher,
                options,
                is_fetching: Cell::new(false),
                stopped_by: RefCell::new(BTreeSet::new()),
                current: RefCell::new(current),
                stale: RefCell::new(stale),
                cache: RefCell::new(cache),
                in_use: Cell::new(false),
                exposed: RefCell::new(exposed),
                published_stale: Cell::new(published_stale),
                result_listeners: Listeners::new(),
                stale_listeners: Listeners::new(),
                dependencies: RefCell::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakQuery<V, E> {
        WeakQuery(Rc::downgrade(&self.inner))
    }

    /// The key this query is registered under.
    pub fn key(&self) -> &QueryKey {
        &self.inner.key
    }

    /// The result subscribers see.
    pub fn get(&self) -> QueryResult<V, E> {
        self.inner
            .exposed
            .try_borrow()
            .expect("get borrow")
            .clone()
    }

    /// The raw outcome of the latest fetch, before stale or cached data is taken into account.
    pub fn current(&self) -> QueryResult<V, E> {
        self.inner
            .current
            .try_borrow()
            .expect("current borrow")
            .clone()
    }

    /// Whether the data is considered outdated.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.try_borrow().expect("is_stale borrow").is_stale
    }

    /// When the query turns stale on its own, if scheduled.
    pub fn turns_stale_at(&self) -> Option<Instant> {
        self.inner
            .stale
            .try_borrow()
            .expect("turns_stale_at borrow")
            .turns_stale_at
    }

    /// Whether a fetch loop is in flight.
    pub fn is_fetching(&self) -> bool {
        self.inner.is_fetching.get()
    }

    /// Whether a dependency currently blocks fetching.
    pub fn is_stopped(&self) -> bool {
        !self
            .inner
            .stopped_by
            .try_borrow()
            .expect("is_stopped borrow")
            .is_empty()
    }

    /// Whether cached data is available.
    pub fn has_cached(&self) -> bool {
        self.inner.cache.try_borrow().expect("has_cached borrow").has_cached
    }

    /// The cached data, if available.
    pub fn cached_data(&self) -> Option<V> {
        self.inner
            .cache
            .try_borrow()
            .expect("cached_data borrow")
            .cached()
            .cloned()
    }

    /// When the cached data expires, if scheduled.
    pub fn cache_expires_at(&self) -> Option<Instant> {
        self.inner
            .cache
            .try_borrow()
            .expect("cache_expires_at borrow")
            .expires_at
    }

    /// Number of active result subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.result_listeners.len()
    }

    /**
     * Subscriptions.
     */

    /// Subscribe to the result.
    ///
    /// The listener is called right away with the current result, then on every change.
    /// The first subscriber refetches a stale query. Dropping the [`Subscription`] unsubscribes.
    pub fn subscribe(&self, listener: impl Fn(&QueryResult<V, E>) + 'static) -> Subscription {
        if self.inner.result_listeners.is_empty() {
            self.on_first_subscriber();
        }

        let listener: Rc<dyn Fn(&QueryResult<V, E>)> = Rc::new(listener);
        let listener_key = self.inner.result_listeners.add(listener.clone());
        listener(&self.get());

        let query = self.downgrade();
        Subscription::new(move || {
            if let Some(query) = query.upgrade() {
                query.unsubscribe(listener_key);
            }
        })
    }

    /// Subscribe to the staleness flag. Does not count as a subscriber.
    pub fn subscribe_stale(&self, listener: impl Fn(bool) + 'static) -> Subscription {
        let listener: Rc<dyn Fn(&bool)> = Rc::new(move |is_stale: &bool| listener(*is_stale));
        let listener_key = self.inner.stale_listeners.add(listener.clone());
        listener(&self.is_stale());

        let query = self.downgrade();
        Subscription::new(move || {
            if let Some(query) = query.upgrade() {
                query.inner.stale_listeners.remove(listener_key);
            }
        })
    }

    /// The result as a reactive signal. The subscription ends when the current reactive owner is cleaned up.
    pub fn signal(&self) -> Signal<QueryResult<V, E>> {
        let state = RwSignal::new(self.get());
        let subscription = self.subscribe(move |result| state.set(result.clone()));
        on_cleanup(move || drop(subscription));
        state.into()
    }

    fn on_first_subscriber(&self) {
        self.inner.in_use.set(true);
        if self.inner.options.stale.on_subscribe_if_unused {
            self.mark_stale(false);
        } else if self.is_stale() {
            self.execute();
        }
    }

    fn unsubscribe(&self, listener_key: ListenerKey) {
        if self.inner.result_listeners.remove(listener_key)
            && self.inner.result_listeners.is_empty()
        {
            self.inner.in_use.set(false);
        }
    }

    /**
     * Staleness and cache.
     */

    /// Mark the query stale. Refetches if forced, subscribed, or `refetch_if_unused` is set.
    pub fn mark_stale(&self, force_refetch: bool) {
        self.inner
            .stale
            .try_borrow_mut()
            .expect("mark_stale borrow_mut")
            .mark_stale();
        self.publish();

        if force_refetch || self.inner.in_use.get() || self.inner.options.stale.refetch_if_unused {
            self.execute();
        }
    }

    /// Stop serving cached data and mark the query stale.
    pub fn clear_cache(&self, force_refetch: bool) {
        self.inner
            .cache
            .try_borrow_mut()
            .expect("clear_cache borrow_mut")
            .clear();
        self.mark_stale(force_refetch);
    }

    /// Mark stale and refetch.
    pub fn refetch(&self) {
        self.mark_stale(true)
    }

    /// Clear the cache and mark stale, refetching only if in use.
    pub fn invalidate(&self) {
        self.clear_cache(false)
    }

    /// Clear the cache and refetch.
    pub fn invalidate_and_refetch(&self) {
        self.clear_cache(true)
    }

    /// Optimistically commit `data` without fetching.
    pub fn update_data(&self, data: V) {
        self.set_data(data)
    }

    pub(crate) fn set_data(&self, data: V) {
        let expiry = (self.inner.options.cache.duration)(&data).map(|duration| {
            let query = self.downgrade();
            let timer = set_timeout(
                move || {
                    if let Some(query) = query.upgrade() {
                        query.clear_cache(false);
                    }
                },
                duration,
            );
            (duration, timer)
        });

        self.inner
            .cache
            .try_borrow_mut()
            .expect("set_data borrow_mut")
            .store(data.clone(), expiry);
        self.set_current(QueryResult::Ok(data));
    }

    /// Drop cached data without marking stale.
    pub(crate) fn drop_cache(&self) {
        self.inner
            .cache
            .try_borrow_mut()
            .expect("drop_cache borrow_mut")
            .clear();
    }

    /// A settled result restarts the staleness countdown.
    pub(crate) fn set_current(&self, result: QueryResult<V, E>) {
        if result.is_settled() {
            self.reset_staleness(&result);
        }
        *self
            .inner
            .current
            .try_borrow_mut()
            .expect("set_current borrow_mut") = result;
        self.publish();
    }

    fn reset_staleness(&self, result: &QueryResult<V, E>) {
        match (self.inner.options.stale.duration)(result) {
            Some(duration) => {
                let query = self.downgrade();
                let timer = set_timeout(
                    move || {
                        if let Some(query) = query.upgrade() {
                            query.mark_stale(false);
                        }
                    },
                    duration,
                );
                self.inner
                    .stale
                    .try_borrow_mut()
                    .expect("reset_staleness borrow_mut")
                    .fresh_for(duration, timer);
            }
            None => self
                .inner
                .stale
                .try_borrow_mut()
                .expect("reset_staleness borrow_mut")
                .mark_fresh(),
        }
    }

    /// Recompute the exposed result and notify listeners of whatever changed.
    fn publish(&self) {
        let (result_changed, stale_changed) = {
            let current = self.inner.current.try_borrow().expect("publish borrow");
            let stale = self.inner.stale.try_borrow().expect("publish borrow");
            let cache = self.inner.cache.try_borrow().expect("publish borrow");
            let next = derive_result(&current, &stale, &cache);

            let mut exposed = self
                .inner
                .exposed
                .try_borrow_mut()
                .expect("publish borrow_mut");
            let result_changed = if *exposed != next {
                *exposed = next.clone();
                Some(next)
            } else {
                None
            };

            let is_stale = stale.is_stale;
            let stale_changed =
                (self.inner.published_stale.replace(is_stale) != is_stale).then_some(is_stale);

            (result_changed, stale_changed)
        };

        if let Some(result) = result_changed {
            self.inner.result_listeners.notify(&result);
        }
        if let Some(is_stale) = stale_changed {
            self.inner.stale_listeners.notify(&is_stale);
        }
    }

    /**
     * Execution.
     */

    /// Start the fetch loop, unless the query is fresh or a loop is already in flight.
    pub(crate) fn execute(&self) {
        if !self.is_stale() || self.inner.is_fetching.replace(true) {
            return;
        }
        let query = self.clone();
        spawn_local(async move {
            run_fetch_loop(query).await;
        });
    }

    pub(crate) fn fetch(&self) -> Pin<Box<dyn Future<Output = FetchResult<V, E>>>> {
        (self.inner.fetcher)()
    }

    pub(crate) fn retry_delay(&self, count: u32, err: &E) -> Option<std::time::Duration> {
        (self.inner.options.on_retry)(count, err)
    }

    pub(crate) fn finish_fetching(&self) {
        self.inner.is_fetching.set(false);
    }

    /**
     * Dependencies.
     */

    pub(crate) fn wire_dependencies(&self, cache: &QueryCache) {
        let target: DependencyTarget = {
            let query = self.downgrade();
            Rc::new(move |signal: DependencySignal| {
                if let Some(query) = query.upgrade() {
                    query.apply_dependency_signal(signal);
                }
            })
        };

        let wirings: Vec<DependencyWiring> = self
            .inner
            .options
            .dependencies
            .iter()
            .enumerate()
            .map(|(index, dependency)| dependency.wire(index, cache, target.clone()))
            .collect();

        self.inner
            .dependencies
            .try_borrow_mut()
            .expect("wire_dependencies borrow_mut")
            .extend(wirings);
    }

    pub(crate) fn apply_dependency_signal(&self, signal: DependencySignal) {
        match signal {
            DependencySignal::Waiting(index) => {
                self.set_stopped_by(index, true);
            }
            DependencySignal::Changed(index, action) => {
                self.set_stopped_by(index, action == DependencyAction::Stop);
                match action {
                    // A query idled by a stop resumes once nothing holds it.
                    DependencyAction::Nothing => {
                        if !self.is_stopped() && self.current().is_idle() {
                            self.execute();
                        }
                    }
                    DependencyAction::Refetch => self.refetch(),
                    DependencyAction::ClearCacheAndRefetch | DependencyAction::Stop => {
                        self.invalidate_and_refetch()
                    }
                }
            }
            DependencySignal::Stale(StaleAction::BecomeStale) => self.mark_stale(false),
            DependencySignal::Stale(StaleAction::StaleAndClear) => self.clear_cache(false),
        }
    }

    fn set_stopped_by(&self, index: usize, stopped: bool) {
        let mut stopped_by = self
            .inner
            .stopped_by
            .try_borrow_mut()
            .expect("set_stopped_by borrow_mut");
        if stopped {
            stopped_by.insert(index);
        } else {
            stopped_by.remove(&index);
        }
    }
}

/// The result subscribers see, given the raw result and the staleness and cache state.
///
/// Cached data is served while stale, so a refetch never hides a value that is still known.
pub(crate) fn derive_result<V: Clone, E: Clone>(
    current: &QueryResult<V, E>,
    stale: &StaleState,
    cache: &CacheState<V>,
) -> QueryResult<V, E> {
    match (current, stale.is_stale, cache.cached()) {
        (QueryResult::Idle, _, _) => QueryResult::Idle,
        (QueryResult::Loading, false, Some(data)) => QueryResult::Ok(data.clone()),
        (current, false, _) => current.clone(),
        (_, true, Some(data)) => QueryResult::Ok(data.clone()),
        (_, true, None) => QueryResult::Loading,
    }
}

/// Type-erased access for the registry.
pub(crate) trait AnyQuery {
    fn key(&self) -> &QueryKey;
    fn mark_stale(&self, force_refetch: bool);
    fn clear_cache(&self, force_refetch: bool);
    fn as_any(&self) -> &dyn Any;
}

impl<V, E> AnyQuery for Query<V, E>
where
    V: QueryValue,
    E: QueryValue,
{
    fn key(&self) -> &QueryKey {
        Query::key(self)
    }

    fn mark_stale(&self, force_refetch: bool) {
        Query::mark_stale(self, force_refetch)
    }

    fn clear_cache(&self, force_refetch: bool) {
        Query::clear_cache(self, force_refetch)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<V, E> std::fmt::Debug for Query<V, E>
where
    V: QueryValue,
    E: QueryValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("key", self.key())
            .field("result", &self.get())
            .field("is_stale", &self.is_stale())
            .field("is_fetching", &self.is_fetching())
            .finish()
    }
}


#[cfg(all(test, feature = "ssr", not(feature = "csr")))]
mod fetch_tests {
    use std::{cell::Cell, future::Ready, time::Duration};

    use tokio::task::LocalSet;

    use super::*;

    fn counting(calls: &Rc<Cell<u32>>) -> impl Fn() -> Ready<FetchResult<String, String>> {
        let calls = calls.clone();
        move || {
            calls.set(calls.get() + 1);
            std::future::ready(FetchResult::Ok(format!("A{}", calls.get())))
        }
    }

    fn started<Fu>(
        fetcher: impl Fn() -> Fu + 'static,
        options: QueryOptions<String, String>,
    ) -> Query<String, String>
    where
        Fu: Future<Output = FetchResult<String, String>> + 'static,
    {
        let query = Query::new(QueryKey::from("test"), fetcher, options);
        query.execute();
        query
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn success_is_cached() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(counting(&calls), QueryOptions::default());
                assert_eq!(query.get(), QueryResult::Loading);
                assert!(query.is_fetching());

                settle().await;

                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));
                assert_eq!(query.cached_data(), Some("A1".to_string()));
                assert!(!query.is_stale());
                assert!(!query.is_fetching());
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_drops_cache() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    {
                        let calls = calls.clone();
                        move || {
                            calls.set(calls.get() + 1);
                            std::future::ready(if calls.get() == 1 {
                                FetchResult::Ok("A".to_string())
                            } else {
                                FetchResult::Err("boom".to_string())
                            })
                        }
                    },
                    QueryOptions::default(),
                );
                settle().await;
                assert!(query.has_cached());

                query.refetch();
                settle().await;

                assert_eq!(
                    query.get(),
                    QueryResult::Err {
                        is_refetching: false,
                        err: "boom".to_string()
                    }
                );
                assert!(!query.has_cached());
                assert!(!query.is_stale());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn mark_stale_twice_keeps_serving_cache() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default().set_stale_time(Duration::from_secs(10)),
                );
                settle().await;
                assert!(query.turns_stale_at().is_some());

                query.mark_stale(false);
                query.mark_stale(false);

                assert!(query.is_stale());
                assert_eq!(query.turns_stale_at(), None);
                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));

                tokio::time::sleep(Duration::from_secs(20)).await;
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_refetches_while_subscribed() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default().set_stale_time(Duration::from_secs(10)),
                );
                settle().await;

                let seen = Rc::new(RefCell::new(Vec::new()));
                let subscription = query.subscribe({
                    let seen = seen.clone();
                    move |result| seen.borrow_mut().push(result.clone())
                });
                assert_eq!(query.subscriber_count(), 1);

                tokio::time::sleep(Duration::from_secs(10)).await;

                assert_eq!(calls.get(), 2);
                assert_eq!(
                    *seen.borrow(),
                    vec![
                        QueryResult::Ok("A1".to_string()),
                        QueryResult::Ok("A2".to_string())
                    ]
                );

                drop(subscription);
                assert_eq!(query.subscriber_count(), 0);

                tokio::time::sleep(Duration::from_secs(10)).await;
                assert!(query.is_stale());
                assert_eq!(calls.get(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_if_unused_refetches_without_subscribers() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default()
                        .set_stale_time(Duration::from_secs(10))
                        .set_refetch_if_unused(true),
                );
                settle().await;

                tokio::time::sleep(Duration::from_secs(10)).await;

                assert_eq!(calls.get(), 2);
                assert_eq!(query.get(), QueryResult::Ok("A2".to_string()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_refetches_while_subscribed() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default().set_cache_time(Duration::from_secs(5)),
                );
                let _subscription = query.subscribe(|_| {});
                settle().await;
                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));
                assert!(query.cache_expires_at().is_some());

                tokio::time::sleep(Duration::from_millis(4_000)).await;
                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));

                tokio::time::sleep(Duration::from_millis(1_000)).await;
                assert_eq!(calls.get(), 2);
                assert_eq!(query.get(), QueryResult::Ok("A2".to_string()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn expired_cache_without_subscribers_turns_loading() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default().set_cache_time(Duration::from_secs(5)),
                );
                settle().await;

                tokio::time::sleep(Duration::from_secs(5)).await;

                assert!(!query.has_cached());
                assert!(query.is_stale());
                assert_eq!(query.get(), QueryResult::Loading);
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_subscriber_fetches_stale_query() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(counting(&calls), QueryOptions::default());
                settle().await;
                query.invalidate();
                assert_eq!(query.get(), QueryResult::Loading);
                settle().await;
                assert_eq!(calls.get(), 1);

                let _subscription = query.subscribe(|_| {});
                settle().await;

                assert_eq!(calls.get(), 2);
                assert_eq!(query.get(), QueryResult::Ok("A2".to_string()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_forces_refetch_when_configured() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(
                    counting(&calls),
                    QueryOptions::default().set_on_subscribe_if_unused(true),
                );
                settle().await;
                assert!(!query.is_stale());

                let first = query.subscribe(|_| {});
                let second = query.subscribe(|_| {});
                settle().await;
                assert_eq!(calls.get(), 2);

                drop((first, second));
                let _third = query.subscribe(|_| {});
                settle().await;
                assert_eq!(calls.get(), 3);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn update_data_skips_the_fetcher() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(counting(&calls), QueryOptions::default());
                settle().await;

                query.update_data("B".to_string());

                assert_eq!(query.get(), QueryResult::Ok("B".to_string()));
                assert_eq!(query.cached_data(), Some("B".to_string()));
                settle().await;
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_query_stays_idle_until_released() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = Query::new(
                    QueryKey::from("test"),
                    counting(&calls),
                    QueryOptions::default(),
                );
                query.apply_dependency_signal(DependencySignal::Waiting(0));
                query.execute();
                settle().await;

                assert!(query.is_stopped());
                assert_eq!(query.get(), QueryResult::Idle);
                assert_eq!(calls.get(), 0);

                query.apply_dependency_signal(DependencySignal::Changed(
                    0,
                    DependencyAction::Refetch,
                ));
                settle().await;

                assert!(!query.is_stopped());
                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn released_query_resumes_when_action_is_nothing() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = Query::new(
                    QueryKey::from("test"),
                    counting(&calls),
                    QueryOptions::default(),
                );
                query.apply_dependency_signal(DependencySignal::Waiting(0));
                query.apply_dependency_signal(DependencySignal::Waiting(1));
                query.execute();
                settle().await;
                assert_eq!(query.get(), QueryResult::Idle);

                query.apply_dependency_signal(DependencySignal::Changed(
                    0,
                    DependencyAction::Nothing,
                ));
                settle().await;
                assert!(query.is_stopped());
                assert_eq!(calls.get(), 0);

                query.apply_dependency_signal(DependencySignal::Changed(
                    1,
                    DependencyAction::Nothing,
                ));
                settle().await;
                assert_eq!(query.get(), QueryResult::Ok("A1".to_string()));
                assert_eq!(calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_listeners_see_changes_only() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = started(counting(&calls), QueryOptions::default());
                let seen = Rc::new(RefCell::new(Vec::new()));
                let _subscription = query.subscribe_stale({
                    let seen = seen.clone();
                    move |is_stale| seen.borrow_mut().push(is_stale)
                });
                settle().await;

                query.mark_stale(false);
                query.mark_stale(false);

                assert_eq!(*seen.borrow(), vec![true, false, true]);
                assert_eq!(query.subscriber_count(), 0);
            })
            .await;
    }
}
