//! Keyed fan-out over signals.
//!
//! A [`PubSub`] owns the sending side of one signal per key and hands the
//! receiving side to whoever subscribes to that key. Publishing releases the
//! signal of one key, or of every key matching a predicate, which is how one
//! external event (a readiness notification, a response carrying an id) reaches
//! exactly the coroutines waiting for it.
//!
//! # Locking
//!
//! The registry sits behind a reader/writer lock. `subscribe` and `unsubscribe`
//! take it exclusively; publishing takes it shared, borrows a [`Pinned`] sender
//! for every match and collects the resulting [`Wakeup`]s. The wake-ups are
//! fired after the lock is released, so a consumer resumed inline by its waker
//! may freely subscribe or publish again.
//!
//! [`Pinned`]: crate::Pinned

use crate::signal::{MpscStorage, Receiver, Sender, SignalStorage, Wakeup, signal};

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

/// The key container behind a [`PubSub`].
enum Registry<K, S: SignalStorage> {
    /// Fixed key set, each key with at most one subscriber.
    Exact(Vec<(K, Option<Sender<S>>)>),
    /// Open key set.
    Dynamic(HashMap<K, Sender<S>>),
}

impl<K: Eq + Hash, S: SignalStorage> Registry<K, S> {
    /// Returns the live sender of `key`.
    fn get(&self, key: &K) -> Option<&Sender<S>> {
        let sender = match self {
            Registry::Exact(slots) => slots
                .iter()
                .find(|(slot_key, _)| slot_key == key)
                .and_then(|(_, sender)| sender.as_ref()),
            Registry::Dynamic(map) => map.get(key),
        };

        sender.filter(|sender| !sender.is_stopped())
    }

    /// Iterates over the live senders.
    fn senders(&self) -> Box<dyn Iterator<Item = (&K, &Sender<S>)> + '_> {
        let stored: Box<dyn Iterator<Item = (&K, &Sender<S>)> + '_> = match self {
            Registry::Exact(slots) => Box::new(
                slots
                    .iter()
                    .filter_map(|(key, sender)| sender.as_ref().map(|sender| (key, sender))),
            ),
            Registry::Dynamic(map) => Box::new(map.iter()),
        };

        Box::new(stored.filter(|(_, sender)| !sender.is_stopped()))
    }

    /// Drops every sender whose receiver is gone.
    fn prune(&mut self) -> usize {
        match self {
            Registry::Exact(slots) => {
                let mut pruned = 0;
                for (_, slot) in slots.iter_mut() {
                    if slot.as_ref().is_some_and(Sender::is_stopped) {
                        *slot = None;
                        pruned += 1;
                    }
                }
                pruned
            }
            Registry::Dynamic(map) => {
                let before = map.len();
                map.retain(|_, sender| !sender.is_stopped());
                before - map.len()
            }
        }
    }
}

/// A registry of signal senders keyed by `K`.
///
/// `S` selects the signal storage of every subscription. The default,
/// [`MpscStorage`], tolerates publishers on any number of threads.
///
/// Every stored signal is stopped when the registry is dropped.
pub struct PubSub<K, S: SignalStorage = MpscStorage> {
    registry: RwLock<Registry<K, S>>,
}

impl<K: Eq + Hash + fmt::Debug, S: SignalStorage> PubSub<K, S> {
    /// Creates a registry accepting any key.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::Dynamic(HashMap::new())),
        }
    }

    /// Creates a registry restricted to `keys`.
    ///
    /// Subscribing to a key outside this set fails like a conflict does.
    pub fn exact(keys: impl IntoIterator<Item = K>) -> Self {
        let mut slots: Vec<(K, Option<Sender<S>>)> = Vec::new();
        for key in keys {
            if !slots.iter().any(|(existing, _)| *existing == key) {
                slots.push((key, None));
            }
        }

        Self {
            registry: RwLock::new(Registry::Exact(slots)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry<K, S>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry<K, S>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to `key`.
    ///
    /// Subscriptions whose receiver was dropped are pruned first, so a key that
    /// only had a dead subscriber is free again and short-lived keys do not
    /// accumulate in the registry.
    ///
    /// # Arguments
    /// - `key`: The key to listen on. For an exact registry it must be part of
    ///   the key set given to [`PubSub::exact`].
    ///
    /// # Returns
    /// The receiving side of a fresh signal, released by every
    /// [`PubSub::publish`] that targets `key`. `None` if `key` already has a
    /// live subscriber, or if the registry is exact and `key` is unknown.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use coreactor::PubSub;
    ///
    /// let pubsub = PubSub::<u16>::new();
    /// let mut rx = pubsub.subscribe(53).unwrap();
    /// assert!(pubsub.subscribe(53).is_none());
    ///
    /// assert!(pubsub.publish(&53));
    /// assert_eq!(rx.try_recv(), Some(true));
    /// ```
    pub fn subscribe(&self, key: K) -> Option<Receiver<S>> {
        let mut registry = self.write();

        let pruned = registry.prune();
        if pruned > 0 {
            debug!(pruned, "pubsub dead subscriptions pruned");
        }

        let receiver = match &mut *registry {
            Registry::Exact(slots) => {
                let (_, slot) = slots.iter_mut().find(|(slot_key, _)| *slot_key == key)?;
                if slot.is_some() {
                    None
                } else {
                    let (sender, receiver) = signal::<S>();
                    *slot = Some(sender);
                    Some(receiver)
                }
            }
            Registry::Dynamic(map) => {
                if map.contains_key(&key) {
                    None
                } else {
                    let (sender, receiver) = signal::<S>();
                    map.insert(key, sender);
                    Some(receiver)
                }
            }
        };

        match &receiver {
            Some(_) => debug!("pubsub subscription added"),
            None => debug!("pubsub subscription rejected"),
        }

        receiver
    }

    /// Removes the subscription of `key`, stopping its signal.
    ///
    /// Unlike [`PubSub::stop`], no final release is delivered. Returns `false`
    /// when `key` had no live subscriber.
    pub fn unsubscribe(&self, key: &K) -> bool {
        let removed = match &mut *self.write() {
            Registry::Exact(slots) => slots
                .iter_mut()
                .find(|(slot_key, _)| slot_key == key)
                .and_then(|(_, sender)| sender.take()),
            Registry::Dynamic(map) => map.remove(key),
        };

        // Dropping the sender stops the signal, outside the lock.
        removed.is_some_and(|sender| !sender.is_stopped())
    }

    /// Releases the signal subscribed under `key`.
    ///
    /// Returns `false` when nobody is subscribed to `key`.
    pub fn publish(&self, key: &K) -> bool {
        let wakeup = {
            let registry = self.read();
            match registry.get(key) {
                Some(sender) => sender.pin().release_deferred(),
                None => return false,
            }
        };

        trace!(?key, direct = wakeup.is_direct(), "pubsub publish");
        wakeup.fire();

        true
    }

    /// Releases the signal of every key matching `predicate`.
    ///
    /// Returns `false` when no live subscription matched.
    pub fn publish_if(&self, mut predicate: impl FnMut(&K) -> bool) -> bool {
        let wakeups: Vec<Wakeup> = {
            let registry = self.read();
            registry
                .senders()
                .filter(|(key, _)| predicate(key))
                .map(|(_, sender)| sender.pin().release_deferred())
                .collect()
        };

        trace!(matched = wakeups.len(), "pubsub publish by predicate");
        let matched = !wakeups.is_empty();
        for wakeup in wakeups {
            wakeup.fire();
        }

        matched
    }

    /// Releases, then stops, every stored signal.
    ///
    /// Every listener wakes once more and then observes its signal as dead,
    /// which unblocks all of them deterministically at shutdown.
    pub fn stop(&self) {
        let wakeups: Vec<Wakeup> = {
            let registry = self.read();
            registry
                .senders()
                .flat_map(|(_, sender)| {
                    let pinned = sender.pin();
                    let released = pinned.release_deferred();
                    let stopped = pinned.stop_deferred();
                    std::iter::once(released).chain(stopped)
                })
                .collect()
        };

        debug!(signals = wakeups.len(), "pubsub stopping");
        for wakeup in wakeups {
            wakeup.fire();
        }
    }

    /// Returns whether `key` has a live subscriber.
    pub fn contains(&self, key: &K) -> bool {
        self.read().get(key).is_some()
    }

    /// Returns the number of live subscriptions.
    pub fn len(&self) -> usize {
        self.read().senders().count()
    }

    /// Returns whether no live subscription is left.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + fmt::Debug, S: SignalStorage> Default for PubSub<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + fmt::Debug, S: SignalStorage> fmt::Debug for PubSub<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.read();
        let kind = match &*registry {
            Registry::Exact(_) => "exact",
            Registry::Dynamic(_) => "dynamic",
        };
        let keys: Vec<&K> = registry.senders().map(|(key, _)| key).collect();

        f.debug_struct("PubSub")
            .field("kind", &kind)
            .field("subscribed", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::UnsyncStorage;

    #[test]
    fn conflicting_subscription_is_rejected() {
        let pubsub = PubSub::<u32>::new();

        let _first = pubsub.subscribe(1).unwrap();
        assert!(pubsub.subscribe(1).is_none());
        assert!(pubsub.contains(&1));
        assert_eq!(pubsub.len(), 1);
    }

    #[test]
    fn stale_subscription_is_replaced() {
        let pubsub = PubSub::<u32, UnsyncStorage>::new();

        drop(pubsub.subscribe(1).unwrap());
        let mut rx = pubsub.subscribe(1).unwrap();

        assert!(pubsub.publish(&1));
        assert_eq!(rx.try_recv(), Some(true));
    }

    #[test]
    fn dropped_receivers_are_pruned_on_subscribe() {
        let pubsub = PubSub::<u32>::new();
        for key in 0..1_000 {
            drop(pubsub.subscribe(key).unwrap());
        }

        assert_eq!(pubsub.len(), 0);
        assert!(!pubsub.contains(&7));

        let _live = pubsub.subscribe(7).unwrap();
        let stored = match &*pubsub.read() {
            Registry::Dynamic(map) => map.len(),
            Registry::Exact(_) => unreachable!(),
        };
        assert_eq!(stored, 1);
    }

    #[test]
    fn exact_slot_is_freed_by_dropped_receiver() {
        let pubsub = PubSub::<u8, UnsyncStorage>::exact([1, 2]);

        let first = pubsub.subscribe(1).unwrap();
        assert!(pubsub.contains(&1));
        drop(first);

        assert!(!pubsub.contains(&1));
        assert!(pubsub.is_empty());
        assert!(!pubsub.publish(&1));
        assert!(!pubsub.unsubscribe(&1));

        let mut second = pubsub.subscribe(1).unwrap();
        assert!(pubsub.publish(&1));
        assert_eq!(second.try_recv(), Some(true));
    }

    #[test]
    fn exact_registry_rejects_unknown_keys() {
        let pubsub = PubSub::<&str>::exact(["a", "b", "a"]);

        assert!(pubsub.subscribe("c").is_none());
        assert!(pubsub.is_empty());
        let _a = pubsub.subscribe("a").unwrap();
        assert!(pubsub.subscribe("a").is_none());
        assert_eq!(pubsub.len(), 1);
    }

    #[test]
    fn publish_without_subscriber_reports_false() {
        let pubsub = PubSub::<u32>::new();

        assert!(!pubsub.publish(&7));
        assert!(!pubsub.publish_if(|_| true));
    }

    #[test]
    fn unsubscribe_stops_without_release() {
        let pubsub = PubSub::<u32, UnsyncStorage>::new();
        let mut rx = pubsub.subscribe(3).unwrap();

        assert!(pubsub.unsubscribe(&3));
        assert!(!pubsub.unsubscribe(&3));
        assert_eq!(rx.try_recv(), Some(false));
    }

    #[test]
    fn stop_releases_once_then_ends() {
        let pubsub = PubSub::<u32, UnsyncStorage>::new();
        let mut rx = pubsub.subscribe(0).unwrap();

        pubsub.stop();

        assert_eq!(rx.try_recv(), Some(true));
        assert_eq!(rx.try_recv(), Some(false));
        assert!(!pubsub.publish(&0));
    }
}
