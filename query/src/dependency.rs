use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use leptos::*;

use crate::{
    cache_observer::CacheEvent, query::Query, query_cache::QueryCache, QueryKey, QueryResult,
    QueryValue, Subscription,
};

/// A value seen by a dependency, or nothing before the first observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    /// Nothing observed yet.
    Uninitialized,
    /// The last observed value.
    Value(T),
}

impl<T> Observed<T> {
    /// The observed value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Observed::Uninitialized => None,
            Observed::Value(value) => Some(value),
        }
    }
}

/// How a query reacts to a change of one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyAction {
    /// Keep the current state. Lifts a stop held by this dependency.
    Nothing,
    /// Mark stale and refetch.
    Refetch,
    /// Drop cached data and refetch.
    ClearCacheAndRefetch,
    /// Block fetching until this dependency changes again. The query turns idle.
    Stop,
}

/// How a query reacts when a query it depends on turns stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    /// Mark stale too.
    BecomeStale,
    /// Mark stale and drop cached data.
    StaleAndClear,
}

/// Something a query observes: another query or a reactive signal.
///
/// ```
/// use leptos::*;
/// use swr_query::*;
///
/// let _ = create_runtime();
/// let user_id = RwSignal::new(None::<u32>);
/// let options = QueryOptions::<String, String>::default()
///     .add_dependency(Dependency::on_signal(user_id, |_, id: &Option<u32>| {
///         if id.is_some() {
///             DependencyAction::Refetch
///         } else {
///             DependencyAction::Stop
///         }
///     }))
///     .add_dependency(Dependency::on_query(
///         "session",
///         |_, session: &QueryResult<String, String>| match session {
///             QueryResult::Ok(_) => DependencyAction::Refetch,
///             _ => DependencyAction::Stop,
///         },
///     ));
/// ```
#[derive(Clone)]
pub struct Dependency(Rc<dyn WireDependency>);

impl Dependency {
    /// Depend on the result of the query under `key`.
    ///
    /// While no query with these types is registered under `key`, the dependent query stays stopped.
    pub fn on_query<V, E>(
        key: impl Into<QueryKey>,
        on_change: impl Fn(&Observed<QueryResult<V, E>>, &QueryResult<V, E>) -> DependencyAction
            + 'static,
    ) -> Self
    where
        V: QueryValue,
        E: QueryValue,
    {
        Dependency(Rc::new(QueryDependency {
            key: key.into(),
            on_change: Rc::new(on_change),
            on_stale: None,
        }))
    }

    /// Like [`Dependency::on_query`], also reacting when the source query turns stale.
    pub fn on_query_with_stale<V, E>(
        key: impl Into<QueryKey>,
        on_change: impl Fn(&Observed<QueryResult<V, E>>, &QueryResult<V, E>) -> DependencyAction
            + 'static,
        on_stale: impl Fn() -> Option<StaleAction> + 'static,
    ) -> Self
    where
        V: QueryValue,
        E: QueryValue,
    {
        Dependency(Rc::new(QueryDependency {
            key: key.into(),
            on_change: Rc::new(on_change),
            on_stale: Some(Rc::new(on_stale)),
        }))
    }

    /// Depend on a reactive signal. `on_change` runs untracked, once initially and then on each distinct value.
    pub fn on_signal<T>(
        source: impl Into<Signal<T>>,
        on_change: impl Fn(&Observed<T>, &T) -> DependencyAction + 'static,
    ) -> Self
    where
        T: Clone + PartialEq + 'static,
    {
        Dependency(Rc::new(SignalDependency {
            source: source.into(),
            on_change: Rc::new(on_change),
        }))
    }

    pub(crate) fn wire(
        &self,
        index: usize,
        cache: &QueryCache,
        target: DependencyTarget,
    ) -> DependencyWiring {
        self.0.wire(index, cache, target)
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Dependency").finish_non_exhaustive()
    }
}

/// What a dependency reports to the query it gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DependencySignal {
    /// The source does not exist yet.
    Waiting(usize),
    Changed(usize, DependencyAction),
    Stale(StaleAction),
}

pub(crate) type DependencyTarget = Rc<dyn Fn(DependencySignal)>;

/// Keeps a dependency's subscriptions alive for as long as the dependent query.
#[derive(Default)]
pub(crate) struct DependencyWiring {
    subscriptions: Rc<RefCell<Vec<Subscription>>>,
}

pub(crate) trait WireDependency {
    fn wire(&self, index: usize, cache: &QueryCache, target: DependencyTarget)
        -> DependencyWiring;
}

struct QueryDependency<V, E> {
    key: QueryKey,
    on_change: Rc<dyn Fn(&Observed<QueryResult<V, E>>, &QueryResult<V, E>) -> DependencyAction>,
    on_stale: Option<Rc<dyn Fn() -> Option<StaleAction>>>,
}

impl<V, E> Clone for QueryDependency<V, E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            on_change: self.on_change.clone(),
            on_stale: self.on_stale.clone(),
        }
    }
}

impl<V, E> WireDependency for QueryDependency<V, E>
where
    V: QueryValue,
    E: QueryValue,
{
    fn wire(
        &self,
        index: usize,
        cache: &QueryCache,
        target: DependencyTarget,
    ) -> DependencyWiring {
        let wiring = DependencyWiring::default();

        if let Some(source) = cache.get_query::<V, E>(&self.key) {
            let subscriptions = self.observe(index, &source, &target);
            wiring
                .subscriptions
                .try_borrow_mut()
                .expect("wire borrow_mut")
                .extend(subscriptions);
            return wiring;
        }

        target(DependencySignal::Waiting(index));
        if cache.contains(&self.key) {
            logging::error!(
                "Dependency on `{}` will never resolve: the query there has different types.",
                self.key
            );
        } else {
            self.wait_for_creation(index, cache, target, wiring.subscriptions.clone());
        }
        wiring
    }
}

impl<V, E> QueryDependency<V, E>
where
    V: QueryValue,
    E: QueryValue,
{
    fn observe(
        &self,
        index: usize,
        source: &Query<V, E>,
        target: &DependencyTarget,
    ) -> Vec<Subscription> {
        let mut subscriptions = Vec::new();

        if let Some(on_stale) = self.on_stale.clone() {
            let target = target.clone();
            // The first call only records the baseline.
            let was_stale = Cell::new(None);
            subscriptions.push(source.subscribe_stale(move |is_stale| {
                let was = was_stale.replace(Some(is_stale));
                if is_stale && was == Some(false) {
                    if let Some(action) = on_stale() {
                        target(DependencySignal::Stale(action));
                    }
                }
            }));
        }

        let on_change = self.on_change.clone();
        let target = target.clone();
        let last_seen = RefCell::new(Observed::Uninitialized);
        subscriptions.push(source.subscribe(move |result| {
            if let Some(previous) = observe_change(&last_seen, result) {
                let action = on_change(&previous, result);
                target(DependencySignal::Changed(index, action));
            }
        }));

        subscriptions
    }

    /// Subscribe once a query appears under the key.
    fn wait_for_creation(
        &self,
        index: usize,
        cache: &QueryCache,
        target: DependencyTarget,
        subscriptions: Rc<RefCell<Vec<Subscription>>>,
    ) {
        let dependency = self.clone();
        let observer_key = Rc::new(Cell::new(None));
        let registered = cache.register_observer({
            let cache = cache.clone();
            let observer_key = observer_key.clone();
            move |event: CacheEvent| {
                let CacheEvent::Created(created) = event else {
                    return;
                };
                if created != dependency.key {
                    return;
                }
                if let Some(observer_key) = observer_key.take() {
                    cache.unregister_observer(observer_key);
                }
                match cache.get_query::<V, E>(&dependency.key) {
                    Some(source) => {
                        let observed = dependency.observe(index, &source, &target);
                        subscriptions
                            .try_borrow_mut()
                            .expect("wait_for_creation borrow_mut")
                            .extend(observed);
                    }
                    None => logging::error!(
                        "Dependency on `{}` will never resolve: the query there has different types.",
                        dependency.key
                    ),
                }
            }
        });
        observer_key.set(Some(registered));
    }
}

struct SignalDependency<T: 'static> {
    source: Signal<T>,
    on_change: Rc<dyn Fn(&Observed<T>, &T) -> DependencyAction>,
}

impl<T> WireDependency for SignalDependency<T>
where
    T: Clone + PartialEq + 'static,
{
    fn wire(
        &self,
        index: usize,
        _cache: &QueryCache,
        target: DependencyTarget,
    ) -> DependencyWiring {
        let source = self.source;
        let on_change = self.on_change.clone();
        let last_seen = RefCell::new(Observed::Uninitialized);

        create_isomorphic_effect(move |_| {
            let value = source.get();
            if let Some(previous) = observe_change(&last_seen, &value) {
                untrack(|| {
                    let action = on_change(&previous, &value);
                    target(DependencySignal::Changed(index, action));
                });
            }
        });

        DependencyWiring::default()
    }
}

/// Records `value` as the latest observation.
/// Returns the previous observation, or `None` when `value` repeats it.
fn observe_change<T: Clone + PartialEq>(
    last_seen: &RefCell<Observed<T>>,
    value: &T,
) -> Option<Observed<T>> {
    let mut last_seen = last_seen.try_borrow_mut().expect("observe_change borrow_mut");
    if matches!(&*last_seen, Observed::Value(last) if last == value) {
        return None;
    }
    Some(std::mem::replace(
        &mut *last_seen,
        Observed::Value(value.clone()),
    ))
}
