use std::{rc::Rc, time::Duration};

use crate::{Dependency, QueryResult};

/// Decides whether, and after how long, a failed attempt is retried.
/// Receives the retry count (starting at 1) and the error. `None` gives up.
pub type RetryFn<E> = Rc<dyn Fn(u32, &E) -> Option<Duration>>;

/// Time until a query turns stale after producing a result. `None` means never.
pub type StaleDurationFn<V, E> = Rc<dyn Fn(&QueryResult<V, E>) -> Option<Duration>>;

/// Time until cached data expires. `None` means never.
pub type CacheDurationFn<V> = Rc<dyn Fn(&V) -> Option<Duration>>;

/**
 * Options for a query [`use_query()`](crate::QueryClient::use_query)
 */
#[derive(Clone)]
pub struct QueryOptions<V, E> {
    /// Queries and signals whose changes gate or refetch this query.
    pub dependencies: Vec<Dependency>,
    /// Back-off policy for [`FetchResult::Retry`](crate::FetchResult::Retry).
    /// Default is [`default_retry`].
    pub on_retry: RetryFn<E>,
    /// Staleness policy.
    pub stale: StaleOptions<V, E>,
    /// Cache expiry policy.
    pub cache: CacheOptions<V>,
}

/// When a query turns stale, and what happens then.
#[derive(Clone)]
pub struct StaleOptions<V, E> {
    /// Mark the query stale when it gains its first subscriber.
    pub on_subscribe_if_unused: bool,
    /// Time until the query turns stale after each result. Default is never.
    pub duration: StaleDurationFn<V, E>,
    /// Refetch on staleness even without subscribers.
    pub refetch_if_unused: bool,
}

/// When cached data expires.
#[derive(Clone)]
pub struct CacheOptions<V> {
    /// Time until cached data is cleared. Default is never.
    pub duration: CacheDurationFn<V>,
}

impl<V: 'static, E: 'static> Default for QueryOptions<V, E> {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            on_retry: Rc::new(default_retry::<E>),
            stale: StaleOptions::default(),
            cache: CacheOptions::default(),
        }
    }
}

impl<V: 'static, E: 'static> Default for StaleOptions<V, E> {
    fn default() -> Self {
        Self {
            on_subscribe_if_unused: false,
            duration: Rc::new(|_: &QueryResult<V, E>| None),
            refetch_if_unused: false,
        }
    }
}

impl<V: 'static> Default for CacheOptions<V> {
    fn default() -> Self {
        Self {
            duration: Rc::new(|_: &V| None),
        }
    }
}

impl<V: 'static, E: 'static> QueryOptions<V, E> {
    /// Add a dependency. Its index in the dependency list identifies it in the stop set.
    pub fn add_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Set the retry policy.
    pub fn set_on_retry(self, on_retry: impl Fn(u32, &E) -> Option<Duration> + 'static) -> Self {
        QueryOptions {
            on_retry: Rc::new(on_retry),
            ..self
        }
    }

    /// Compute the time until staleness from each result.
    pub fn set_stale_duration(
        self,
        duration: impl Fn(&QueryResult<V, E>) -> Option<Duration> + 'static,
    ) -> Self {
        QueryOptions {
            stale: StaleOptions {
                duration: Rc::new(duration),
                ..self.stale
            },
            ..self
        }
    }

    /// Turn stale a fixed time after every result.
    pub fn set_stale_time(self, stale_time: Duration) -> Self {
        self.set_stale_duration(move |_| Some(stale_time))
    }

    /// Refetch on staleness even without subscribers.
    pub fn set_refetch_if_unused(self, refetch_if_unused: bool) -> Self {
        QueryOptions {
            stale: StaleOptions {
                refetch_if_unused,
                ..self.stale
            },
            ..self
        }
    }

    /// Mark the query stale when it gains its first subscriber.
    pub fn set_on_subscribe_if_unused(self, on_subscribe_if_unused: bool) -> Self {
        QueryOptions {
            stale: StaleOptions {
                on_subscribe_if_unused,
                ..self.stale
            },
            ..self
        }
    }

    /// Compute the cache lifetime from each value.
    pub fn set_cache_duration(self, duration: impl Fn(&V) -> Option<Duration> + 'static) -> Self {
        QueryOptions {
            cache: CacheOptions {
                duration: Rc::new(duration),
            },
            ..self
        }
    }

    /// Expire cached data a fixed time after it was stored.
    pub fn set_cache_time(self, cache_time: Duration) -> Self {
        self.set_cache_duration(move |_| Some(cache_time))
    }
}

/// Retries twice without delay, then gives up.
pub fn default_retry<E>(count: u32, _err: &E) -> Option<Duration> {
    if count <= DEFAULT_RETRIES {
        Some(Duration::ZERO)
    } else {
        None
    }
}

const DEFAULT_RETRIES: u32 = 2;

/// Retry policy doubling the delay after each attempt, starting at `base` and capped at `max`.
/// Gives up after `max_retries` retries.
///
/// ```
/// use std::time::Duration;
/// use swr_query::*;
///
/// let options = QueryOptions::<String, String>::default().set_on_retry(exponential_backoff(
///     3,
///     Duration::from_millis(100),
///     Duration::from_secs(1),
/// ));
/// ```
pub fn exponential_backoff<E: 'static>(
    max_retries: u32,
    base: Duration,
    max: Duration,
) -> impl Fn(u32, &E) -> Option<Duration> + Clone + 'static {
    move |count, _| {
        if count == 0 || count > max_retries {
            return None;
        }
        let factor = 2_u32.saturating_pow(count - 1);
        Some(base.saturating_mul(factor).min(max))
    }
}

impl<V, E> std::fmt::Debug for QueryOptions<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("dependencies", &self.dependencies.len())
            .field("on_subscribe_if_unused", &self.stale.on_subscribe_if_unused)
            .field("refetch_if_unused", &self.stale.refetch_if_unused)
            .finish_non_exhaustive()
    }
}
