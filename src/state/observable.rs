//! Single-slot values that notify subscribers when they change
//!
//! A set is skipped when the new value is the *same* as the current one, as
//! decided by [`SameValue`]: scalars compare by value, `Arc`s by identity.
//! Containers are held behind `Arc`, so two distinct but equal lists still
//! notify; reuse the same `Arc` to suppress a notification.

use super::store::KeyValueStore;
use crate::utils::errors::AppError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

/// Identity check used to skip redundant sets
pub trait SameValue {
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(String, bool, char, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl<T: ?Sized> SameValue for Arc<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_value(b),
            _ => false,
        }
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by `subscribe`, given back to `unsubscribe`
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to revoke"]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct SubscriberList<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// Subscribers notified in subscription order
pub struct Subscribers<T> {
    inner: Mutex<SubscriberList<T>>,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SubscriberList {
                next_id: 0,
                callbacks: Vec::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = list.next_id;
        list.next_id += 1;
        list.callbacks.push((id, Arc::new(callback)));
        Subscription { id }
    }

    /// Remove a subscription, returning whether it was still active
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = list.callbacks.len();
        list.callbacks.retain(|(id, _)| *id != subscription.id);
        list.callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every subscriber with `value`
    ///
    /// The list is snapshotted first, so callbacks may subscribe, unsubscribe
    /// or set values themselves.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(value);
        }
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory observable value; sets notify synchronously
pub struct Observable<T> {
    value: RwLock<T>,
    subscribers: Subscribers<T>,
}

impl<T: Clone + SameValue> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: RwLock::new(initial),
            subscribers: Subscribers::new(),
        }
    }

    pub fn get_value(&self) -> T {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the value and notify subscribers, unless it is the same value
    ///
    /// Returns whether subscribers were notified.
    pub fn set_value(&self, value: T) -> bool {
        {
            let mut current = self.value.write().unwrap_or_else(PoisonError::into_inner);
            if current.same_value(&value) {
                return false;
            }
            *current = value.clone();
        }
        self.subscribers.notify(&value);
        true
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.subscribers.unsubscribe(subscription)
    }
}

/// Observable value backed by a durable key-value store
///
/// The value is loaded from the store on construction and re-read after every
/// successful write; `get_value` only reads the cached copy. Subscribers are
/// notified after the write has completed.
pub struct PersistentObservable<T> {
    key: String,
    store: Arc<dyn KeyValueStore>,
    value: RwLock<T>,
    subscribers: Subscribers<T>,
}

impl<T> PersistentObservable<T>
where
    T: Clone + SameValue + Serialize + DeserializeOwned,
{
    pub fn new<K: Into<String>>(store: Arc<dyn KeyValueStore>, key: K, initial: T) -> Self {
        let key = key.into();
        let value = load(store.as_ref(), &key).unwrap_or(initial);
        Self {
            key,
            store,
            value: RwLock::new(value),
            subscribers: Subscribers::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get_value(&self) -> T {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Persist the value, then notify subscribers, unless it is the same value
    ///
    /// Returns whether subscribers were notified. A failed write leaves the
    /// cached value untouched.
    pub async fn set_value(&self, value: T) -> Result<bool> {
        if self.get_value().same_value(&value) {
            return Ok(false);
        }

        let json = serde_json::to_value(&value)?;
        self.store
            .set(&self.key, json)
            .await
            .map_err(|e| e.with_context(format!("persisting '{}'", self.key)))?;

        let stored = load(self.store.as_ref(), &self.key).unwrap_or_else(|| value.clone());
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = stored;

        self.subscribers.notify(&value);
        Ok(true)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.subscribers.unsubscribe(subscription)
    }
}

fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_value(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}", AppError::store(key, format!("ignoring stored value: {}", e)));
            None
        }
    }
}
