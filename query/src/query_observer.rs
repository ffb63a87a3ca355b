use std::{cell::RefCell, rc::Rc};

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    pub(crate) struct ListenerKey;
}

/// Set of callbacks notified with a value.
///
/// Callbacks may add or remove listeners, or trigger another notification, while being notified.
pub(crate) struct Listeners<T> {
    listeners: RefCell<SlotMap<ListenerKey, Rc<dyn Fn(&T)>>>,
}

impl<T> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RefCell::new(SlotMap::with_key()),
        }
    }

    pub(crate) fn add(&self, listener: Rc<dyn Fn(&T)>) -> ListenerKey {
        self.listeners
            .try_borrow_mut()
            .expect("add_listener borrow_mut")
            .insert(listener)
    }

    pub(crate) fn remove(&self, key: ListenerKey) -> bool {
        self.listeners
            .try_borrow_mut()
            .expect("remove_listener borrow_mut")
            .remove(key)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.try_borrow().expect("len borrow").len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn notify(&self, value: &T) {
        let listeners: Vec<_> = self
            .listeners
            .try_borrow()
            .expect("notify borrow")
            .iter()
            .map(|(key, listener)| (key, listener.clone()))
            .collect();
        for (key, listener) in listeners {
            // Skip listeners removed earlier in this pass.
            let is_listening = self
                .listeners
                .try_borrow()
                .expect("notify borrow")
                .contains_key(key);
            if is_listening {
                listener(value);
            }
        }
    }
}

/// An active subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribe now. Same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
