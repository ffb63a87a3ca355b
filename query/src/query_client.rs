use leptos::*;
use std::{future::Future, rc::Rc};

use crate::{
    cache_observer::{CacheEvent, CacheObserver, CacheObserverKey},
    query::{AnyQuery, Query},
    query_cache::QueryCache,
    FetchResult, QueryKey, QueryKeyError, QueryOptions, QueryValue,
};

/// Provides a Query Client to the current scope.
pub fn provide_query_client() {
    provide_context(QueryClient::new());
}

/// Retrieves a Query Client from the current scope.
pub fn use_query_client() -> QueryClient {
    use_context::<QueryClient>().expect("Query Client Missing.")
}

/// The registry of queries, keyed hierarchically.
/// Exposes utility functions to manage queries.
///
/// Queries can be:
/// - [Used](Self::use_query)
///     - Created and fetched on first use, shared afterwards.
/// - [Invalidated](Self::invalidate)
///     - Cached data is dropped and the query refetches on next usage. Subscribed queries refetch immediately.
/// - [Marked stale](Self::mark_stale)
///     - Cached data keeps being served while the query refetches.
/// - [Manually updated](Self::update_data)
///     - Useful when you have updated a value and you want to manually set it in cache instead of waiting for query to refetch.
#[derive(Clone)]
pub struct QueryClient {
    pub(crate) cache: QueryCache,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Creates a new Query Client. Queries it creates belong to the current reactive owner, if any.
    pub fn new() -> Self {
        Self {
            cache: QueryCache::new(Owner::current()),
        }
    }

    /// Returns the query under `key`, creating and fetching it first if none exists.
    ///
    /// Options and fetcher only apply to a newly created query.
    /// If the key cannot hold this query, an error is logged and an unshared query is returned.
    ///
    /// Example:
    /// ```
    /// use leptos::*;
    /// use swr_query::*;
    ///
    /// fn track_query(client: &QueryClient, id: u32) -> Query<String, String> {
    ///     client.use_query(
    ///         ("track", id),
    ///         move || async move { FetchResult::Ok(format!("Track {id}")) },
    ///         QueryOptions::default(),
    ///     )
    /// }
    /// ```
    pub fn use_query<V, E, Fu>(
        &self,
        key: impl Into<QueryKey>,
        fetcher: impl Fn() -> Fu + 'static,
        options: QueryOptions<V, E>,
    ) -> Query<V, E>
    where
        V: QueryValue,
        E: QueryValue,
        Fu: Future<Output = FetchResult<V, E>> + 'static,
    {
        let key = key.into();
        let fetcher = Rc::new(fetcher);
        let shared = self.try_use_query(
            key.clone(),
            {
                let fetcher = fetcher.clone();
                move || fetcher()
            },
            options.clone(),
        );

        match shared {
            Ok(query) => query,
            Err(err) => {
                logging::error!("{err}. Using a query that is not shared.");
                self.create_query(key, move || fetcher(), options)
            }
        }
    }

    /// Like [`use_query`](Self::use_query), failing instead when the key cannot hold this query.
    pub fn try_use_query<V, E, Fu>(
        &self,
        key: impl Into<QueryKey>,
        fetcher: impl Fn() -> Fu + 'static,
        options: QueryOptions<V, E>,
    ) -> Result<Query<V, E>, QueryKeyError>
    where
        V: QueryValue,
        E: QueryValue,
        Fu: Future<Output = FetchResult<V, E>> + 'static,
    {
        let key = key.into();
        if let Some(existing) = self.cache.get_any(&key) {
            return existing
                .as_any()
                .downcast_ref::<Query<V, E>>()
                .cloned()
                .ok_or(QueryKeyError::TypeMismatch { key });
        }

        self.cache.check_vacant(&key)?;
        let query = self.create_query(key, fetcher, options);
        self.cache.insert(Rc::new(query.clone()))?;
        Ok(query)
    }

    fn create_query<V, E, Fu>(
        &self,
        key: QueryKey,
        fetcher: impl Fn() -> Fu + 'static,
        options: QueryOptions<V, E>,
    ) -> Query<V, E>
    where
        V: QueryValue,
        E: QueryValue,
        Fu: Future<Output = FetchResult<V, E>> + 'static,
    {
        self.cache.with_owner(|| {
            let query = Query::new(key, fetcher, options);
            query.wire_dependencies(&self.cache);
            query.execute();
            query
        })
    }

    /// Retrieve an existing query.
    /// If no query with these types exists under `key`, [`None`](Option::None) will be returned.
    pub fn get_query<V, E>(&self, key: impl Into<QueryKey>) -> Option<Query<V, E>>
    where
        V: QueryValue,
        E: QueryValue,
    {
        self.cache.get_query(&key.into())
    }

    /// Drop the cached data of the query under `key` and mark it stale.
    /// It refetches right away only if it is in use.
    ///
    /// Returns false if no query exists under `key`.
    pub fn invalidate(&self, key: impl Into<QueryKey>) -> bool {
        let key = key.into();
        let found = self.with_any_query(&key, |query| query.clear_cache(false));
        if found {
            self.cache.notify_observers(CacheEvent::Invalidated(key));
        }
        found
    }

    /// Drop the cached data of the query under `key` and refetch it.
    ///
    /// Returns false if no query exists under `key`.
    pub fn invalidate_and_refetch(&self, key: impl Into<QueryKey>) -> bool {
        let key = key.into();
        let found = self.with_any_query(&key, |query| query.clear_cache(true));
        if found {
            self.cache.notify_observers(CacheEvent::Invalidated(key));
        }
        found
    }

    /// Mark the query under `key` stale and refetch it, serving cached data meanwhile.
    ///
    /// Returns false if no query exists under `key`.
    pub fn refetch(&self, key: impl Into<QueryKey>) -> bool {
        self.mark_stale(key, true)
    }

    /// Mark the query under `key` stale.
    ///
    /// Returns false if no query exists under `key`.
    pub fn mark_stale(&self, key: impl Into<QueryKey>, force_refetch: bool) -> bool {
        self.with_any_query(&key.into(), |query| query.mark_stale(force_refetch))
    }

    /// A synchronous function that can be used to immediately set a query's data.
    ///
    /// Returns false if no query with these types exists under `key`.
    ///
    /// Example:
    /// ```
    /// use swr_query::*;
    ///
    /// fn rename(client: &QueryClient, id: u32, name: String) {
    ///     client.update_data::<String, String>(("track", id), name);
    /// }
    /// ```
    pub fn update_data<V, E>(&self, key: impl Into<QueryKey>, data: V) -> bool
    where
        V: QueryValue,
        E: QueryValue,
    {
        let key = key.into();
        match self.cache.get_query::<V, E>(&key) {
            Some(query) => {
                query.update_data(data);
                true
            }
            None => {
                logging::debug_warn!("No query to update under `{key}`");
                false
            }
        }
    }

    /// Invalidate every query under `prefix`, the query at `prefix` included.
    ///
    /// Returns the number of invalidated queries.
    pub fn invalidate_prefix(&self, prefix: impl Into<QueryKey>) -> usize {
        let queries = self.cache.queries_under(&prefix.into());
        self.invalidate_each(&queries);
        queries.len()
    }

    /// Invalidate all queries in the registry.
    pub fn invalidate_all(&self) {
        let queries = self.cache.all_queries();
        self.invalidate_each(&queries);
    }

    fn invalidate_each(&self, queries: &[Rc<dyn AnyQuery>]) {
        for query in queries {
            query.clear_cache(false);
            self.cache
                .notify_observers(CacheEvent::Invalidated(query.key().clone()));
        }
    }

    /// Returns the number of registered queries.
    ///
    /// Example:
    /// ```
    /// use leptos::*;
    /// use swr_query::*;
    ///
    /// fn cache_size() -> usize {
    ///    let client = use_query_client();
    ///    client.size().get()
    /// }
    /// ```
    pub fn size(&self) -> Signal<usize> {
        self.cache.size()
    }

    /// Register an observer for registry events.
    pub fn register_cache_observer(
        &self,
        observer: impl CacheObserver + 'static,
    ) -> CacheObserverKey {
        self.cache.register_observer(observer)
    }

    /// Unregister an observer. Returns false if it was not registered.
    pub fn unregister_cache_observer(&self, key: CacheObserverKey) -> bool {
        self.cache.unregister_observer(key)
    }

    fn with_any_query(&self, key: &QueryKey, func: impl FnOnce(&dyn AnyQuery)) -> bool {
        match self.cache.get_any(key) {
            Some(query) => {
                func(query.as_ref());
                true
            }
            None => {
                logging::debug_warn!("No query under `{key}`");
                false
            }
        }
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("size", &self.cache.all_queries().len())
            .finish()
    }
}
