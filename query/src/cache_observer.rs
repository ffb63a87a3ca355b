use crate::QueryKey;

slotmap::new_key_type! {
    /// Identifies a registered [`CacheObserver`], for unregistering it.
    pub struct CacheObserverKey;
}

/// Subscribing to cache events
pub trait CacheObserver {
    /// receive a cache event.
    fn process_cache_event(&self, event: CacheEvent);
}

impl<F> CacheObserver for F
where
    F: Fn(CacheEvent),
{
    fn process_cache_event(&self, event: CacheEvent) {
        self(event)
    }
}

/// The events that can be observed from the query registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A query was registered under the key.
    Created(QueryKey),
    /// The query under the key was invalidated through the client.
    Invalidated(QueryKey),
}

impl CacheEvent {
    /// The key the event is about.
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Created(key) | CacheEvent::Invalidated(key) => key,
        }
    }
}
