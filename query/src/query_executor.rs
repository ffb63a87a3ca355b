use std::time::Duration;

use leptos::*;

use crate::{query::Query, timeout::sleep, FetchResult, QueryResult, QueryValue};

/// Where the fetch loop goes next.
enum FetchStep<V, E> {
    Fetching,
    Retrying(Duration),
    Stopped,
    Settled(Result<V, E>),
    Exhausted(E),
}

/// Fetch until the query settles or a dependency stops it.
///
/// A plain error drops the cache. Running out of retries keeps it, so a later
/// staleness trigger can serve it again.
///
/// Only one loop runs per query; [`Query::execute`] guards against reentry.
/// A dependency that stops the query mid-flight takes effect before the next attempt.
pub(crate) async fn run_fetch_loop<V, E>(query: Query<V, E>)
where
    V: QueryValue,
    E: QueryValue,
{
    let mut retries = 0;
    let mut step = FetchStep::Fetching;

    loop {
        step = match step {
            FetchStep::Fetching if query.is_stopped() => FetchStep::Stopped,
            FetchStep::Fetching => match query.fetch().await {
                FetchResult::Ok(data) => FetchStep::Settled(Ok(data)),
                FetchResult::Err(err) => FetchStep::Settled(Err(err)),
                FetchResult::Retry { err, return_error } => {
                    retries += 1;
                    match query.retry_delay(retries, &err) {
                        None => FetchStep::Exhausted(err),
                        Some(delay) => {
                            if return_error {
                                query.drop_cache();
                                query.set_current(QueryResult::Err {
                                    is_refetching: true,
                                    err,
                                });
                            } else {
                                query.set_current(QueryResult::Loading);
                            }
                            FetchStep::Retrying(delay)
                        }
                    }
                }
            },
            FetchStep::Retrying(delay) => {
                sleep(delay).await;
                FetchStep::Fetching
            }
            FetchStep::Stopped => {
                query.set_current(QueryResult::Idle);
                break;
            }
            FetchStep::Settled(Ok(data)) => {
                query.set_data(data);
                break;
            }
            FetchStep::Settled(Err(err)) => {
                logging::debug_warn!("Query `{}` failed: {:?}", query.key(), &err);
                query.drop_cache();
                query.set_current(QueryResult::Err {
                    is_refetching: false,
                    err,
                });
                break;
            }
            FetchStep::Exhausted(err) => {
                logging::debug_warn!("Query `{}` gave up retrying: {:?}", query.key(), &err);
                query.set_current(QueryResult::Err {
                    is_refetching: false,
                    err,
                });
                break;
            }
        };
    }

    query.finish_fetching();
}

#[cfg(all(test, feature = "ssr", not(feature = "csr")))]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use tokio::task::LocalSet;

    use super::*;
    use crate::{QueryKey, QueryOptions};

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_policy_gives_up() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = Query::new(
                    QueryKey::from("flaky"),
                    {
                        let calls = calls.clone();
                        move || {
                            calls.set(calls.get() + 1);
                            std::future::ready(FetchResult::<u32, String>::Retry {
                                err: "offline".to_string(),
                                return_error: false,
                            })
                        }
                    },
                    QueryOptions::default(),
                );
                query.execute();
                settle().await;

                assert_eq!(calls.get(), 3);
                assert_eq!(
                    query.get(),
                    QueryResult::Err {
                        is_refetching: false,
                        err: "offline".to_string()
                    }
                );
                assert!(!query.is_fetching());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn returned_errors_are_shown_while_retrying() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = Query::new(
                    QueryKey::from("flaky"),
                    {
                        let calls = calls.clone();
                        move || {
                            calls.set(calls.get() + 1);
                            std::future::ready(if calls.get() == 1 {
                                FetchResult::Retry {
                                    err: "offline".to_string(),
                                    return_error: true,
                                }
                            } else {
                                FetchResult::Ok(7_u32)
                            })
                        }
                    },
                    QueryOptions::default().set_on_retry(|_, _| Some(Duration::from_secs(1))),
                );
                query.execute();
                settle().await;

                assert_eq!(
                    query.get(),
                    QueryResult::Err {
                        is_refetching: true,
                        err: "offline".to_string()
                    }
                );
                assert!(query.is_fetching());

                tokio::time::sleep(Duration::from_secs(1)).await;

                assert_eq!(calls.get(), 2);
                assert_eq!(query.get(), QueryResult::Ok(7));
                assert!(!query.is_fetching());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_the_cache() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0));
                let query = Query::new(
                    QueryKey::from("flaky"),
                    {
                        let calls = calls.clone();
                        move || {
                            calls.set(calls.get() + 1);
                            std::future::ready(if calls.get() == 1 {
                                FetchResult::Ok("A".to_string())
                            } else {
                                FetchResult::Retry {
                                    err: "offline".to_string(),
                                    return_error: false,
                                }
                            })
                        }
                    },
                    QueryOptions::<String, String>::default(),
                );
                query.execute();
                settle().await;

                query.refetch();
                settle().await;

                assert_eq!(calls.get(), 4);
                assert_eq!(
                    query.get(),
                    QueryResult::Err {
                        is_refetching: false,
                        err: "offline".to_string()
                    }
                );
                assert!(query.has_cached());
                assert_eq!(query.cached_data(), Some("A".to_string()));

                query.mark_stale(false);
                assert_eq!(query.get(), QueryResult::Ok("A".to_string()));
            })
            .await;
    }
}
