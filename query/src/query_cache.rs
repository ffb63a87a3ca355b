use std::{
    cell::RefCell,
    collections::{hash_map::Entry, HashMap},
    rc::Rc,
};

use leptos::*;
use slotmap::SlotMap;

use crate::{
    cache_observer::{CacheEvent, CacheObserver, CacheObserverKey},
    query::{AnyQuery, Query},
    KeySegment, QueryKey, QueryKeyError, QueryValue,
};

/// Hierarchical registry of queries.
///
/// Every key segment maps to a node that is either a query or a branch of subkeys, never both.
#[derive(Clone)]
pub(crate) struct QueryCache {
    owner: Option<Owner>,
    root: Rc<RefCell<HashMap<KeySegment, CacheNode>>>,
    observers: Rc<RefCell<SlotMap<CacheObserverKey, Rc<dyn CacheObserver>>>>,
    size: RwSignal<usize>,
}

pub(crate) enum CacheNode {
    Branch(HashMap<KeySegment, CacheNode>),
    Query(Rc<dyn AnyQuery>),
}

impl QueryCache {
    pub(crate) fn new(owner: Option<Owner>) -> Self {
        Self {
            owner,
            root: Rc::new(RefCell::new(HashMap::new())),
            observers: Rc::new(RefCell::new(SlotMap::with_key())),
            size: RwSignal::new(0),
        }
    }

    /// Runs `func` under the owner the cache was created in, so queries outlive the component that first used them.
    pub(crate) fn with_owner<R>(&self, func: impl FnOnce() -> R) -> R {
        match self.owner {
            Some(owner) => with_owner(owner, func),
            None => func(),
        }
    }

    /// The query under `key`. Keys that stop at a branch, or pass through a query, find nothing.
    pub(crate) fn get_any(&self, key: &QueryKey) -> Option<Rc<dyn AnyQuery>> {
        let root = self.root.try_borrow().expect("get_any borrow");
        match find_node(&root, key.segments()) {
            Some(CacheNode::Query(query)) => Some(query.clone()),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, key: &QueryKey) -> bool {
        self.get_any(key).is_some()
    }

    /// The query under `key`, if it has these value and error types.
    pub(crate) fn get_query<V, E>(&self, key: &QueryKey) -> Option<Query<V, E>>
    where
        V: QueryValue,
        E: QueryValue,
    {
        let query = self.get_any(key)?;
        let typed = query.as_any().downcast_ref::<Query<V, E>>().cloned();
        if typed.is_none() {
            logging::debug_warn!("{}", QueryKeyError::TypeMismatch { key: key.clone() });
        }
        typed
    }

    /// Whether a query could be registered under `key`.
    pub(crate) fn check_vacant(&self, key: &QueryKey) -> Result<(), QueryKeyError> {
        let root = self.root.try_borrow().expect("check_vacant borrow");
        if is_vacant(&root, key.segments()) {
            Ok(())
        } else {
            Err(QueryKeyError::PathConflict { key: key.clone() })
        }
    }

    pub(crate) fn insert(&self, query: Rc<dyn AnyQuery>) -> Result<(), QueryKeyError> {
        let key = query.key().clone();
        let inserted = {
            let mut root = self.root.try_borrow_mut().expect("insert borrow_mut");
            insert_node(&mut root, key.segments(), query)
        };
        if !inserted {
            return Err(QueryKeyError::PathConflict { key });
        }

        self.size.set(self.size.get_untracked() + 1);
        self.notify_observers(CacheEvent::Created(key));
        Ok(())
    }

    /// Every query whose key starts with `prefix`.
    pub(crate) fn queries_under(&self, prefix: &QueryKey) -> Vec<Rc<dyn AnyQuery>> {
        let root = self.root.try_borrow().expect("queries_under borrow");
        let mut queries = Vec::new();
        if let Some(node) = find_node(&root, prefix.segments()) {
            collect_queries(node, &mut queries);
        }
        queries
    }

    pub(crate) fn all_queries(&self) -> Vec<Rc<dyn AnyQuery>> {
        let root = self.root.try_borrow().expect("all_queries borrow");
        let mut queries = Vec::new();
        for node in root.values() {
            collect_queries(node, &mut queries);
        }
        queries
    }

    pub(crate) fn size(&self) -> Signal<usize> {
        cfg_if::cfg_if! {
            if #[cfg(debug_assertions)] {
                let size_signal = self.size;
                let cache = self.clone();
                create_memo(move |_| {
                    let size = size_signal.get();
                    let real_size = cache.all_queries().len();
                    assert!(size == real_size, "Cache size mismatch");
                    size
                }).into()
            } else {
                self.size.into()
            }
        }
    }

    pub(crate) fn register_observer(
        &self,
        observer: impl CacheObserver + 'static,
    ) -> CacheObserverKey {
        self.observers
            .try_borrow_mut()
            .expect("register_observer borrow mut")
            .insert(Rc::new(observer))
    }

    pub(crate) fn unregister_observer(&self, key: CacheObserverKey) -> bool {
        self.observers
            .try_borrow_mut()
            .expect("unregister_observer borrow mut")
            .remove(key)
            .is_some()
    }

    /// Observers may register or unregister observers while being notified.
    pub(crate) fn notify_observers(&self, event: CacheEvent) {
        let observers: Vec<_> = self
            .observers
            .try_borrow()
            .expect("notify_observers borrow")
            .values()
            .cloned()
            .collect();
        for observer in observers {
            observer.process_cache_event(event.clone());
        }
    }
}

fn find_node<'a>(
    nodes: &'a HashMap<KeySegment, CacheNode>,
    segments: &[KeySegment],
) -> Option<&'a CacheNode> {
    let (first, rest) = segments.split_first()?;
    let node = nodes.get(first)?;
    if rest.is_empty() {
        return Some(node);
    }
    match node {
        CacheNode::Branch(children) => find_node(children, rest),
        CacheNode::Query(_) => None,
    }
}

fn is_vacant(nodes: &HashMap<KeySegment, CacheNode>, segments: &[KeySegment]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    match (nodes.get(first), rest.is_empty()) {
        (None, _) => true,
        (Some(CacheNode::Branch(children)), false) => is_vacant(children, rest),
        _ => false,
    }
}

/// Inserts `query` at `segments`, creating intermediate branches on the way down.
fn insert_node(
    nodes: &mut HashMap<KeySegment, CacheNode>,
    segments: &[KeySegment],
    query: Rc<dyn AnyQuery>,
) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return match nodes.entry(first.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(CacheNode::Query(query));
                true
            }
            Entry::Occupied(_) => false,
        };
    }
    match nodes
        .entry(first.clone())
        .or_insert_with(|| CacheNode::Branch(HashMap::new()))
    {
        CacheNode::Branch(children) => insert_node(children, rest, query),
        CacheNode::Query(_) => false,
    }
}

fn collect_queries(node: &CacheNode, queries: &mut Vec<Rc<dyn AnyQuery>>) {
    match node {
        CacheNode::Query(query) => queries.push(query.clone()),
        CacheNode::Branch(children) => {
            for child in children.values() {
                collect_queries(child, queries);
            }
        }
    }
}
