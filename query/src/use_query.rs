use crate::query::Query;
use crate::{use_query_client, FetchResult, QueryKey, QueryOptions, QueryValue};
use std::future::Future;

/// Creates or reuses the query under `key`, using the [`QueryClient`](crate::QueryClient) in context.
/// Useful for data fetching, caching, and synchronization with server state.
///
/// A Query provides:
/// - Caching
/// - De-duplication
/// - Invalidation
/// - Background refetching
/// - Retries
/// - Dependencies on other queries and signals
///
///
/// Example
/// ```
/// use leptos::*;
/// use swr_query::*;
/// use std::time::Duration;
///
/// // Data type.
/// #[derive(Debug, Clone, PartialEq)]
/// struct UserData {
///     name: String,
/// }
///
/// // Fetcher
/// async fn get_user(id: u32) -> FetchResult<UserData, String> {
///     todo!()
/// }
///
/// // Query for a User.
/// fn user_query(id: u32) -> Signal<QueryResult<UserData, String>> {
///     swr_query::use_query(
///         ("user", id),
///         move || get_user(id),
///         QueryOptions::default()
///             .set_stale_time(Duration::from_secs(5))
///             .set_cache_time(Duration::from_secs(60)),
///     )
///     .signal()
/// }
///
/// ```
///
pub fn use_query<V, E, Fu>(
    key: impl Into<QueryKey>,
    fetcher: impl Fn() -> Fu + 'static,
    options: QueryOptions<V, E>,
) -> Query<V, E>
where
    V: QueryValue,
    E: QueryValue,
    Fu: Future<Output = FetchResult<V, E>> + 'static,
{
    use_query_client().use_query(key, fetcher, options)
}

/// Retrieve an existing query from the client in context.
pub fn get_query<V, E>(key: impl Into<QueryKey>) -> Option<Query<V, E>>
where
    V: QueryValue,
    E: QueryValue,
{
    use_query_client().get_query(key)
}

/// Drop the cached data of the query under `key` and mark it stale.
pub fn invalidate(key: impl Into<QueryKey>) -> bool {
    use_query_client().invalidate(key)
}

/// Drop the cached data of the query under `key` and refetch it.
pub fn invalidate_and_refetch(key: impl Into<QueryKey>) -> bool {
    use_query_client().invalidate_and_refetch(key)
}

/// Mark the query under `key` stale and refetch it.
pub fn refetch(key: impl Into<QueryKey>) -> bool {
    use_query_client().refetch(key)
}

/// Mark the query under `key` stale, refetching if forced or in use.
pub fn mark_stale(key: impl Into<QueryKey>, force_refetch: bool) -> bool {
    use_query_client().mark_stale(key, force_refetch)
}

/// Optimistically set the data of the query under `key`.
pub fn update_data<V, E>(key: impl Into<QueryKey>, data: V) -> bool
where
    V: QueryValue,
    E: QueryValue,
{
    use_query_client().update_data::<V, E>(key, data)
}
