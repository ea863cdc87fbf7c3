//! Callback lists with explicit subscription handles
//!
//! Every subscription returns a [`SubscriptionId`]; dropping the owning
//! [`Listeners`] or calling [`Listeners::clear`] detaches all callbacks at once,
//! so nothing outlives the session or client state that registered it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn FnMut(&E) + Send + Sync>;

pub struct Listeners<E> {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback<E>)>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            callbacks: Vec::new(),
        }
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if the subscription was already removed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Invokes callbacks in subscription order
    pub fn emit(&mut self, event: &E) {
        for (_, callback) in self.callbacks.iter_mut() {
            callback(event);
        }
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_reaches_all_subscribers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners: Listeners<u32> = Listeners::new();

        let first = Arc::clone(&seen);
        listeners.subscribe(move |value: &u32| first.lock().unwrap().push(("first", *value)));
        let second = Arc::clone(&seen);
        listeners.subscribe(move |value: &u32| second.lock().unwrap().push(("second", *value)));

        listeners.emit(&7);

        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unsubscribe_is_deterministic() {
        let count = Arc::new(Mutex::new(0));
        let mut listeners: Listeners<()> = Listeners::new();

        let counter = Arc::clone(&count);
        let id = listeners.subscribe(move |_: &()| *counter.lock().unwrap() += 1);

        listeners.emit(&());
        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.emit(&());

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_clear_detaches_everything() {
        let mut listeners: Listeners<u8> = Listeners::new();
        listeners.subscribe(|_| {});
        listeners.subscribe(|_| {});
        assert_eq!(listeners.len(), 2);

        listeners.clear();
        assert!(listeners.is_empty());
    }
}
