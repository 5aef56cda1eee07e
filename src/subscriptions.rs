//! Callback fan-out with late-subscriber replay.
//!
//! A [`SubscriberList`] remembers the last published value. New subscribers
//! get it immediately, then every later publish in registration order.
//! A panicking callback is caught and logged; the remaining subscribers
//! still receive the value.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, error};

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListState<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
    latest: Option<T>,
}

pub struct SubscriberList<T> {
    name: &'static str,
    state: Arc<Mutex<ListState<T>>>,
}

impl<T> SubscriberList<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(ListState {
                next_id: 0,
                entries: Vec::new(),
                latest: None,
            })),
        }
    }

    /// Registers `callback`, replaying the latest value to it first.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let (id, replay) = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push((id, Arc::clone(&callback)));
            (id, state.latest.clone())
        };

        if let Some(value) = replay {
            invoke(self.name, &callback, &value);
        }

        let weak: Weak<Mutex<ListState<T>>> = Arc::downgrade(&self.state);
        let name = self.name;
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                lock(&state).entries.retain(|(entry_id, _)| *entry_id != id);
                debug!("{name}: subscriber {id} removed");
            }
        })
    }

    /// Stores `value` as the latest and delivers it to every subscriber.
    pub fn publish(&self, value: T) {
        let callbacks = {
            let mut state = lock(&self.state);
            state.latest = Some(value.clone());
            state
                .entries
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect::<Vec<_>>()
        };

        for callback in &callbacks {
            invoke(self.name, callback, &value);
        }
    }

    pub fn latest(&self) -> Option<T> {
        lock(&self.state).latest.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> SubscriberList<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Publishes only when `value` differs from the latest one. Returns
    /// whether anything was delivered.
    pub fn publish_if_changed(&self, value: T) -> bool {
        if lock(&self.state).latest.as_ref() == Some(&value) {
            return false;
        }
        self.publish(value);
        true
    }
}

fn lock<T>(state: &Mutex<ListState<T>>) -> std::sync::MutexGuard<'_, ListState<T>> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn invoke<T>(name: &str, callback: &Callback<T>, value: &T) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| callback(value)));
    if let Err(panic) = result {
        let msg = if let Some(s) = panic.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        error!("{name}: subscriber callback panicked: {msg}");
    }
}

/// Disposer returned by every subscribe call.
///
/// Dropping it leaves the callback registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}
