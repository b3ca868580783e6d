//! In-process synchronization authority.
//!
//! [`InMemoryAuthority`] keeps one [`PropertyState`] per broadcast group in a
//! sharded concurrent map. Each state owns:
//! - a push gate serializing pushes and their fan-out,
//! - the stored value behind a short read/write lock,
//! - the subscriber callbacks in their own concurrent map.
//!
//! ## Subscription races
//!
//! A push snapshots the subscriber set right after storing its value, while
//! holding the gate. A subscribe that completes after the snapshot does not
//! receive that push; an unsubscribe that completes after the snapshot may
//! still be invoked by it. Neither ever waits for the fan-out to finish.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use propsync_types::{ParticipantId, StateId, SyncKey};
use serde::Serialize;
use std::any::{Any, type_name};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::authority::{Callback, SyncValue, SynchronizationAuthority};
use crate::config::AuthorityConfig;
use crate::error::{AuthorityResult, NotificationFailure, NotificationFailures};

/// Per-group value and subscriber storage.
struct PropertyState<T> {
    gate: Mutex<()>,
    value: RwLock<Option<T>>,
    callbacks: DashMap<ParticipantId, Callback<T>>,
}

impl<T: SyncValue> PropertyState<T> {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            value: RwLock::new(None),
            callbacks: DashMap::new(),
        }
    }
}

/// Type-independent view of a [`PropertyState`], so unsubscribing and
/// inspection work without knowing the value type.
trait ErasedState: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn remove_subscriber(&self, participant: &ParticipantId) -> bool;
    fn has_subscriber(&self, participant: &ParticipantId) -> bool;
    fn subscriber_count(&self) -> usize;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: SyncValue> ErasedState for PropertyState<T> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn remove_subscriber(&self, participant: &ParticipantId) -> bool {
        self.callbacks.remove(participant).is_some()
    }

    fn has_subscriber(&self, participant: &ParticipantId) -> bool {
        self.callbacks.contains_key(participant)
    }

    fn subscriber_count(&self) -> usize {
        self.callbacks.len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Operational counters.
#[derive(Debug, Default)]
struct Counters {
    pushes: AtomicU64,
    pulls: AtomicU64,
    notifications_delivered: AtomicU64,
    notification_failures: AtomicU64,
}

/// Point-in-time snapshot of authority activity.
///
/// Counters are monotonically increasing for the authority's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuthorityStats {
    /// Pushes accepted.
    pub pushes_total: u64,
    /// Pulls served.
    pub pulls_total: u64,
    /// Callbacks that completed successfully.
    pub notifications_delivered: u64,
    /// Callbacks that returned an error or panicked.
    pub notification_failures: u64,
    /// Broadcast groups touched so far.
    pub states: usize,
}

/// Thread-safe, process-local synchronization authority.
///
/// Construct one per sharing domain and hand it to contexts as an
/// `Arc<InMemoryAuthority>`; there is no global instance.
pub struct InMemoryAuthority {
    states: DashMap<StateId, Arc<dyn ErasedState>>,
    max_fanout_workers: usize,
    counters: Counters,
}

impl std::fmt::Debug for InMemoryAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuthority")
            .field("states", &self.states.len())
            .field("max_fanout_workers", &self.max_fanout_workers)
            .field("counters", &self.counters)
            .finish()
    }
}

impl Default for InMemoryAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthority {
    /// Create an authority with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&AuthorityConfig::default())
    }

    /// Create an authority from configuration.
    pub fn with_config(config: &AuthorityConfig) -> Self {
        Self {
            states: DashMap::new(),
            max_fanout_workers: config.max_fanout_workers.max(1),
            counters: Counters::default(),
        }
    }

    /// Upper bound on fan-out worker threads per push.
    pub fn max_fanout_workers(&self) -> usize {
        self.max_fanout_workers
    }

    /// Snapshot the operational counters.
    pub fn stats(&self) -> AuthorityStats {
        AuthorityStats {
            pushes_total: self.counters.pushes.load(Ordering::Relaxed),
            pulls_total: self.counters.pulls.load(Ordering::Relaxed),
            notifications_delivered: self.counters.notifications_delivered.load(Ordering::Relaxed),
            notification_failures: self.counters.notification_failures.load(Ordering::Relaxed),
            states: self.states.len(),
        }
    }

    /// Number of participants subscribed to a group.
    pub fn subscriber_count(&self, state_id: &StateId) -> usize {
        self.erased(state_id)
            .map(|state| state.subscriber_count())
            .unwrap_or(0)
    }

    /// Whether the key's participant currently has a callback registered.
    pub fn is_subscribed(&self, key: &SyncKey) -> bool {
        self.erased(&key.state_id())
            .map(|state| state.has_subscriber(key.participant_id()))
            .unwrap_or(false)
    }

    fn erased(&self, state_id: &StateId) -> Option<Arc<dyn ErasedState>> {
        self.states.get(state_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Get or lazily create the typed state for a group.
    ///
    /// # Panics
    ///
    /// Panics if the group was created for a different value type.
    fn state<T: SyncValue>(&self, state_id: StateId) -> Arc<PropertyState<T>> {
        let erased = match self.erased(&state_id) {
            Some(state) => state,
            None => Arc::clone(
                self.states
                    .entry(state_id)
                    .or_insert_with(|| {
                        tracing::debug!(
                            "Created state {:?} for {}",
                            state_id,
                            type_name::<T>()
                        );
                        let state: Arc<dyn ErasedState> = Arc::new(PropertyState::<T>::new());
                        state
                    })
                    .value(),
            ),
        };

        let stored_type = erased.type_name();
        match erased.into_any().downcast::<PropertyState<T>>() {
            Ok(state) => state,
            Err(_) => panic!(
                "state {} holds {} but was accessed as {}",
                state_id,
                stored_type,
                type_name::<T>()
            ),
        }
    }
}

impl SynchronizationAuthority for InMemoryAuthority {
    fn pull<T: SyncValue>(&self, key: &SyncKey) -> T {
        let state = self.state::<T>(key.state_id());
        self.counters.pulls.fetch_add(1, Ordering::Relaxed);
        let value = state.value.read().clone();
        value.unwrap_or_default()
    }

    fn push<T: SyncValue>(&self, key: &SyncKey, value: T) -> AuthorityResult<()> {
        let state_id = key.state_id();
        let state = self.state::<T>(state_id);

        let _gate = state.gate.lock();
        *state.value.write() = Some(value.clone());
        self.counters.pushes.fetch_add(1, Ordering::Relaxed);

        let recipients: Vec<(ParticipantId, Callback<T>)> = state
            .callbacks
            .iter()
            .filter(|entry| entry.key() != key.participant_id())
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        if recipients.is_empty() {
            return Ok(());
        }

        let failures = fan_out(&recipients, &value, self.max_fanout_workers);
        let delivered = recipients.len().saturating_sub(failures.len());
        self.counters
            .notifications_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);

        tracing::debug!(
            "Pushed {} to {}/{} subscribers of {:?}",
            key.group_id(),
            delivered,
            recipients.len(),
            state_id
        );

        if failures.is_empty() {
            return Ok(());
        }

        self.counters
            .notification_failures
            .fetch_add(failures.len() as u64, Ordering::Relaxed);
        for failure in &failures {
            tracing::warn!("Notification for {} failed: {}", key.group_id(), failure);
        }
        Err(NotificationFailures::new(state_id, failures).into())
    }

    fn subscribe<T: SyncValue>(
        &self,
        key: &SyncKey,
        callback: Callback<T>,
    ) -> AuthorityResult<()> {
        let state = self.state::<T>(key.state_id());
        let replaced = state
            .callbacks
            .insert(key.participant_id().clone(), callback)
            .is_some();

        tracing::debug!(
            "Subscribed {} (replaced: {}, total: {})",
            key,
            replaced,
            state.callbacks.len()
        );
        Ok(())
    }

    fn unsubscribe(&self, key: &SyncKey) -> AuthorityResult<()> {
        if let Some(state) = self.erased(&key.state_id()) {
            let removed = state.remove_subscriber(key.participant_id());
            tracing::debug!(
                "Unsubscribed {} (was subscribed: {}, remaining: {})",
                key,
                removed,
                state.subscriber_count()
            );
        }
        Ok(())
    }
}

/// Deliver `value` to every recipient, spreading them over at most
/// `max_workers` threads. Returns the failures in no particular order.
fn fan_out<T: SyncValue>(
    recipients: &[(ParticipantId, Callback<T>)],
    value: &T,
    max_workers: usize,
) -> Vec<NotificationFailure> {
    let workers = max_workers.clamp(1, recipients.len().max(1));
    if workers == 1 {
        return notify_chunk(recipients, value);
    }

    let chunk_size = recipients.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = recipients
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || notify_chunk(chunk, value)))
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|payload| {
                    vec![NotificationFailure::WorkerPanicked {
                        message: panic_message(payload.as_ref()),
                    }]
                })
            })
            .collect()
    })
}

/// Invoke callbacks one after another, catching errors and panics so one
/// bad subscriber cannot starve its siblings.
fn notify_chunk<T: SyncValue>(
    chunk: &[(ParticipantId, Callback<T>)],
    value: &T,
) -> Vec<NotificationFailure> {
    chunk
        .iter()
        .filter_map(|(participant, callback)| {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(Ok(())) => None,
                Ok(Err(source)) => Some(NotificationFailure::Failed {
                    participant: participant.clone(),
                    source,
                }),
                Err(payload) => Some(NotificationFailure::Panicked {
                    participant: participant.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            }
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::callback;
    use crate::error::AuthorityError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn key(participant: &str) -> SyncKey {
        SyncKey::new("Person", "name", "G", participant).unwrap()
    }

    /// Callback that records every value it receives.
    fn recorder() -> (Callback<String>, Arc<StdMutex<Vec<String>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = callback(move |v: &String| {
            sink.lock().unwrap().push(v.clone());
            Ok(())
        });
        (cb, seen)
    }

    #[test]
    fn push_then_pull_round_trips() {
        let authority = InMemoryAuthority::new();
        authority.push(&key("x"), "Alice".to_string()).unwrap();
        assert_eq!(authority.pull::<String>(&key("y")), "Alice");
    }

    #[test]
    fn pull_before_push_is_default() {
        let authority = InMemoryAuthority::new();
        assert_eq!(authority.pull::<String>(&key("x")), "");
        assert_eq!(authority.pull::<u32>(&SyncKey::new("T", "n", "G", "x").unwrap()), 0);
    }

    #[test]
    fn push_does_not_echo_to_pusher() {
        let authority = InMemoryAuthority::new();
        let (cb, seen) = recorder();
        authority.subscribe(&key("x"), cb).unwrap();

        authority.push(&key("x"), "Alice".to_string()).unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn push_reaches_every_other_subscriber_once() {
        let authority = InMemoryAuthority::new();
        let (b, seen_b) = recorder();
        let (c, seen_c) = recorder();
        authority.subscribe(&key("b"), b).unwrap();
        authority.subscribe(&key("c"), c).unwrap();

        authority.push(&key("a"), "Alice".to_string()).unwrap();

        assert_eq!(*seen_b.lock().unwrap(), vec!["Alice".to_string()]);
        assert_eq!(*seen_c.lock().unwrap(), vec!["Alice".to_string()]);
    }

    #[test]
    fn resubscribe_replaces_callback() {
        let authority = InMemoryAuthority::new();
        let (first, seen_first) = recorder();
        let (second, seen_second) = recorder();
        authority.subscribe(&key("b"), first).unwrap();
        authority.subscribe(&key("b"), second).unwrap();

        authority.push(&key("a"), "Alice".to_string()).unwrap();

        assert!(seen_first.lock().unwrap().is_empty());
        assert_eq!(seen_second.lock().unwrap().len(), 1);
        assert_eq!(authority.subscriber_count(&key("b").state_id()), 1);
    }

    #[test]
    fn subscribe_is_not_retroactive() {
        let authority = InMemoryAuthority::new();
        authority.push(&key("a"), "Alice".to_string()).unwrap();

        let (cb, seen) = recorder();
        authority.subscribe(&key("b"), cb).unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let authority = InMemoryAuthority::new();
        // Never-touched state.
        authority.unsubscribe(&key("b")).unwrap();
        assert_eq!(authority.stats().states, 0);

        let (cb, seen) = recorder();
        authority.subscribe(&key("b"), cb).unwrap();
        authority.unsubscribe(&key("b")).unwrap();
        authority.unsubscribe(&key("b")).unwrap();

        authority.push(&key("a"), "Alice".to_string()).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert!(!authority.is_subscribed(&key("b")));
    }

    #[test]
    fn groups_are_isolated() {
        let authority = InMemoryAuthority::new();
        let (cb, seen) = recorder();
        let other_group = SyncKey::new("Person", "name", "H", "b").unwrap();
        authority.subscribe(&other_group, cb).unwrap();

        authority.push(&key("a"), "Alice".to_string()).unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(authority.pull::<String>(&other_group), "");
    }

    #[test]
    fn failing_callbacks_are_aggregated_and_value_still_stored() {
        let authority = InMemoryAuthority::with_config(&AuthorityConfig {
            max_fanout_workers: 2,
        });
        let (good, seen_good) = recorder();
        authority.subscribe(&key("good"), good).unwrap();
        authority
            .subscribe(&key("bad"), callback(|_: &String| Err("rejected".into())))
            .unwrap();
        authority
            .subscribe(
                &key("panics"),
                callback(|_: &String| -> Result<(), crate::CallbackError> {
                    panic!("subscriber exploded")
                }),
            )
            .unwrap();

        let err = authority.push(&key("a"), "Alice".to_string()).unwrap_err();

        match err {
            AuthorityError::AggregateNotificationFailure(failures) => {
                assert_eq!(failures.len(), 2);
                assert!(!failures.is_empty());
                assert_eq!(failures.state_id(), key("a").state_id());
                let mut participants: Vec<_> = failures
                    .failures()
                    .iter()
                    .filter_map(|f| f.participant().map(|p| p.to_string()))
                    .collect();
                participants.sort();
                assert_eq!(participants, vec!["bad", "panics"]);
            }
            other => panic!("expected aggregate failure, got {other:?}"),
        }
        assert_eq!(*seen_good.lock().unwrap(), vec!["Alice".to_string()]);
        assert_eq!(authority.pull::<String>(&key("a")), "Alice");

        let stats = authority.stats();
        assert_eq!(stats.notifications_delivered, 1);
        assert_eq!(stats.notification_failures, 2);
    }

    #[test]
    fn fan_out_spreads_across_workers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let recipients: Vec<(ParticipantId, Callback<u32>)> = (0..10)
            .map(|i| {
                let calls = Arc::clone(&calls);
                let cb: Callback<u32> = callback(move |_: &u32| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                (ParticipantId::new(format!("p{i}")).unwrap(), cb)
            })
            .collect();

        let failures = fan_out(&recipients, &7, 3);

        assert!(failures.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn one_push_runs_slow_callbacks_concurrently() {
        const SUBSCRIBERS: usize = 6;
        const DELAY: std::time::Duration = std::time::Duration::from_millis(50);

        let authority = InMemoryAuthority::with_config(&AuthorityConfig {
            max_fanout_workers: SUBSCRIBERS,
        });
        for i in 0..SUBSCRIBERS {
            authority
                .subscribe(
                    &key(&format!("slow-{i}")),
                    callback(|_: &String| {
                        std::thread::sleep(DELAY);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        let started = std::time::Instant::now();
        authority.push(&key("a"), "Alice".to_string()).unwrap();
        let elapsed = started.elapsed();

        let serial = DELAY * SUBSCRIBERS as u32;
        assert!(
            elapsed < serial / 2,
            "{SUBSCRIBERS} callbacks took {elapsed:?}, serial would be {serial:?}"
        );
        assert_eq!(authority.stats().notifications_delivered, SUBSCRIBERS as u64);
    }

    #[test]
    fn subscribe_during_fan_out_misses_in_flight_push() {
        let authority = Arc::new(InMemoryAuthority::new());
        let (late, seen_late) = recorder();
        let late = Arc::new(StdMutex::new(Some(late)));

        // b's callback registers c while the push is being delivered.
        let auth = Arc::clone(&authority);
        let pending = Arc::clone(&late);
        authority
            .subscribe(
                &key("b"),
                callback(move |_: &String| {
                    if let Some(cb) = pending.lock().unwrap().take() {
                        auth.subscribe(&key("c"), cb)?;
                    }
                    Ok(())
                }),
            )
            .unwrap();

        authority.push(&key("a"), "first".to_string()).unwrap();
        assert!(authority.is_subscribed(&key("c")));
        assert!(seen_late.lock().unwrap().is_empty());

        authority.push(&key("a"), "second".to_string()).unwrap();
        assert_eq!(*seen_late.lock().unwrap(), vec!["second".to_string()]);
    }

    #[test]
    #[should_panic(expected = "was accessed as")]
    fn type_mismatch_panics() {
        let authority = InMemoryAuthority::new();
        authority.push(&key("a"), "Alice".to_string()).unwrap();
        let _: u64 = authority.pull(&key("a"));
    }

    #[test]
    fn stats_count_pushes_and_pulls() {
        let authority = InMemoryAuthority::new();
        authority.push(&key("a"), "Alice".to_string()).unwrap();
        authority.push(&key("a"), "Bob".to_string()).unwrap();
        let _: String = authority.pull(&key("b"));

        let stats = authority.stats();
        assert_eq!(stats.pushes_total, 2);
        assert_eq!(stats.pulls_total, 1);
        assert_eq!(stats.states, 1);
    }
}
