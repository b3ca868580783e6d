//! Per-instance synchronization state machine.
//!
//! A [`SynchronizationContext`] owns one instance's synchronized flag and
//! its tracked fields, and moves the instance between two states:
//!
//! ```text
//!                 synchronize()
//!  Desynchronized ─────────────► Synchronized
//!        ▲                            │
//!        └────────────────────────────┘
//!                desynchronize()
//! ```
//!
//! Each transition subscribes or unsubscribes every tracked field as one
//! [`Saga`]: if any step fails, the steps already taken are undone and the
//! instance stays in the state it started in.
//!
//! ## Locking
//!
//! `synchronize`, `desynchronize`, `resynchronize`, `write`,
//! `set_source_id` and `with_state_lock` all take the same per-instance
//! mutex. The closure passed to `with_state_lock` must not call any of them
//! on the same context, or it deadlocks. Authority callbacks only touch
//! field storage and never take this mutex.

use parking_lot::Mutex;
use propsync_types::{InstanceIdentity, KeyComponent, KeyError, KeyResult, SyncKey};
use std::fmt;
use std::sync::Arc;

use crate::authority::{SyncValue, SynchronizationAuthority};
use crate::error::{
    AuthorityError, AuthorityResult, RollbackFailure, Transition, TransitionError,
    TransitionResult, TransitionStep,
};
use crate::field::{SyncField, TrackedField};
use crate::saga::{Saga, SagaFailure};

/// Whether an instance currently participates in its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Holds no subscriptions; writes stay local.
    Desynchronized,
    /// Holds one subscription per tracked field; writes are pushed.
    Synchronized,
}

struct SyncState {
    synchronized: bool,
    /// Group pointer for the next synchronize.
    source_id: String,
    /// Keys for `source_id`, one per tracked field, in field order.
    keys: Vec<SyncKey>,
    /// Keys currently subscribed. Empty while desynchronized.
    subscribed: Vec<SyncKey>,
}

/// Builder for [`SynchronizationContext`].
pub struct ContextBuilder<A: SynchronizationAuthority> {
    authority: Arc<A>,
    identity: InstanceIdentity,
    source_id: Option<String>,
    fields: Vec<Box<dyn TrackedField<A>>>,
}

impl<A: SynchronizationAuthority> ContextBuilder<A> {
    /// Point the instance at a group other than its own.
    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Track a field. Fields are subscribed in the order they are tracked.
    ///
    /// # Panics
    ///
    /// Panics if a field with the same name is already tracked.
    pub fn track<T: SyncValue>(mut self, field: &SyncField<T>) -> Self {
        assert!(
            self.fields.iter().all(|f| f.name() != field.name()),
            "field `{}` is already tracked",
            field.name()
        );
        self.fields.push(Box::new(field.clone()));
        self
    }

    /// Validate the identity, source and field names and build the context.
    ///
    /// The source id defaults to the instance's own id.
    pub fn build(self) -> KeyResult<SynchronizationContext<A>> {
        let source_id = self
            .source_id
            .unwrap_or_else(|| self.identity.instance_id().to_string());
        let keys = keys_for(&self.identity, &self.fields, &source_id)?;

        Ok(SynchronizationContext {
            authority: self.authority,
            identity: self.identity,
            fields: self.fields,
            state: Mutex::new(SyncState {
                synchronized: false,
                source_id,
                keys,
                subscribed: Vec::new(),
            }),
        })
    }
}

fn keys_for<A: SynchronizationAuthority>(
    identity: &InstanceIdentity,
    fields: &[Box<dyn TrackedField<A>>],
    source_id: &str,
) -> KeyResult<Vec<SyncKey>> {
    if source_id.is_empty() {
        return Err(KeyError::InvalidKey {
            component: KeyComponent::SourceId,
        });
    }
    fields
        .iter()
        .map(|field| identity.key(field.name(), source_id))
        .collect()
}

/// One instance's synchronization state and tracked fields.
pub struct SynchronizationContext<A: SynchronizationAuthority> {
    authority: Arc<A>,
    identity: InstanceIdentity,
    fields: Vec<Box<dyn TrackedField<A>>>,
    state: Mutex<SyncState>,
}

impl<A: SynchronizationAuthority> fmt::Debug for SynchronizationContext<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|field| field.name()).collect();
        f.debug_struct("SynchronizationContext")
            .field("identity", &self.identity)
            .field("fields", &names)
            .finish_non_exhaustive()
    }
}

impl<A: SynchronizationAuthority> SynchronizationContext<A> {
    /// Start building a context for `identity` against `authority`.
    pub fn builder(authority: Arc<A>, identity: InstanceIdentity) -> ContextBuilder<A> {
        ContextBuilder {
            authority,
            identity,
            source_id: None,
            fields: Vec::new(),
        }
    }

    /// The instance this context belongs to.
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    /// The authority this context synchronizes through.
    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    /// The group pointer the next synchronize will use.
    pub fn source_id(&self) -> String {
        self.state.lock().source_id.clone()
    }

    /// Point the instance at another group.
    ///
    /// Takes effect on the next [`synchronize`](Self::synchronize) or
    /// [`resynchronize`](Self::resynchronize); an existing subscription
    /// stays on its current group until then.
    pub fn set_source_id(&self, source_id: impl Into<String>) -> KeyResult<()> {
        let source_id = source_id.into();
        let keys = keys_for(&self.identity, &self.fields, &source_id)?;
        let mut state = self.state.lock();
        state.source_id = source_id;
        state.keys = keys;
        Ok(())
    }

    /// Whether the instance is currently synchronized.
    pub fn is_synchronized(&self) -> bool {
        self.state.lock().synchronized
    }

    /// Current state.
    pub fn status(&self) -> SyncStatus {
        if self.is_synchronized() {
            SyncStatus::Synchronized
        } else {
            SyncStatus::Desynchronized
        }
    }

    /// Run `f` with the current synchronized flag, holding the state lock
    /// so the flag cannot change until `f` returns.
    ///
    /// `f` must not call back into this context's transition or write
    /// methods.
    pub fn with_state_lock<R>(&self, f: impl FnOnce(bool) -> R) -> R {
        let state = self.state.lock();
        f(state.synchronized)
    }

    /// Write a tracked field: update local storage and, while synchronized,
    /// push the value to the group.
    ///
    /// A push error is returned after the local write and the authority's
    /// stored value have both taken effect.
    ///
    /// # Panics
    ///
    /// Panics if `field` is not tracked by this context.
    pub fn write<T: SyncValue>(&self, field: &SyncField<T>, value: T) -> AuthorityResult<()> {
        let index = self.position(field);
        let state = self.state.lock();
        if !state.synchronized {
            field.store(value);
            return Ok(());
        }
        field.store(value.clone());
        self.authority.push(&state.subscribed[index], value)
    }

    fn position<T: SyncValue>(&self, field: &SyncField<T>) -> usize {
        self.fields
            .iter()
            .position(|tracked| {
                tracked
                    .as_any()
                    .downcast_ref::<SyncField<T>>()
                    .is_some_and(|f| f.ptr_eq(field))
            })
            .unwrap_or_else(|| {
                panic!(
                    "field `{}` is not tracked by {}",
                    field.name(),
                    self.identity.instance_id()
                )
            })
    }

    /// Subscribe every tracked field, then pull each field's current value.
    ///
    /// No-op if already synchronized. On failure every subscription made so
    /// far is withdrawn and the instance stays desynchronized.
    pub fn synchronize(&self) -> TransitionResult<()> {
        let mut state = self.state.lock();
        self.synchronize_locked(&mut state, Transition::Synchronize)
    }

    /// Unsubscribe every tracked field. Local values are kept.
    ///
    /// No-op if already desynchronized. On failure every field already
    /// unsubscribed is subscribed again and re-pulled, and the instance
    /// stays synchronized.
    pub fn desynchronize(&self) -> TransitionResult<()> {
        let mut state = self.state.lock();
        self.desynchronize_locked(&mut state, Transition::Desynchronize)
    }

    /// Leave the current group (if any) and join the one named by the
    /// current source id, without releasing the state lock in between.
    ///
    /// If leaving fails the instance stays synchronized on its old group;
    /// if joining fails it ends desynchronized.
    pub fn resynchronize(&self) -> TransitionResult<()> {
        let mut state = self.state.lock();
        self.desynchronize_locked(&mut state, Transition::Resynchronize)?;
        self.synchronize_locked(&mut state, Transition::Resynchronize)
    }

    fn synchronize_locked(
        &self,
        state: &mut SyncState,
        transition: Transition,
    ) -> TransitionResult<()> {
        if state.synchronized {
            return Ok(());
        }

        let keys = state.keys.clone();
        let authority = self.authority.as_ref();
        let saga = self
            .fields
            .iter()
            .zip(&keys)
            .fold(Saga::<AuthorityError>::new(), |saga, (field, key)| {
                saga.step(
                    move || field.subscribe(authority, key),
                    move || authority.unsubscribe(key),
                )
            });
        saga.run()
            .map_err(|failure| self.transition_error(transition, TransitionStep::Subscribe, failure))?;

        // Pull only once every subscription is in place, so no push can
        // land between a field's pull and its subscribe.
        for (field, key) in self.fields.iter().zip(&keys) {
            field.pull_into(authority, key);
        }

        tracing::debug!(
            "{} synchronized {} field(s) with source {}",
            self.identity.instance_id(),
            keys.len(),
            state.source_id
        );
        state.synchronized = true;
        state.subscribed = keys;
        Ok(())
    }

    fn desynchronize_locked(
        &self,
        state: &mut SyncState,
        transition: Transition,
    ) -> TransitionResult<()> {
        if !state.synchronized {
            return Ok(());
        }

        let authority = self.authority.as_ref();
        let saga = self
            .fields
            .iter()
            .zip(&state.subscribed)
            .fold(Saga::<AuthorityError>::new(), |saga, (field, key)| {
                saga.step(
                    move || authority.unsubscribe(key),
                    move || {
                        // Pushes made while the field was unsubscribed were
                        // missed, so catch up once the callback is back.
                        field.subscribe(authority, key)?;
                        field.pull_into(authority, key);
                        Ok(())
                    },
                )
            });
        saga.run().map_err(|failure| {
            self.transition_error(transition, TransitionStep::Unsubscribe, failure)
        })?;

        tracing::debug!(
            "{} desynchronized {} field(s)",
            self.identity.instance_id(),
            state.subscribed.len()
        );
        state.synchronized = false;
        state.subscribed.clear();
        Ok(())
    }

    fn transition_error(
        &self,
        transition: Transition,
        step: TransitionStep,
        failure: SagaFailure<AuthorityError>,
    ) -> TransitionError {
        let property = |index: usize| self.fields[index].name().to_string();
        let rollback_failures: Vec<RollbackFailure> = failure
            .compensation_failures
            .into_iter()
            .map(|(index, source)| RollbackFailure {
                property: property(index),
                source,
            })
            .collect();

        let err = TransitionError {
            transition,
            step,
            property: property(failure.step),
            source: failure.cause,
            rollback_failures,
        };
        if err.rolled_back() {
            tracing::warn!("{} rolled back: {}", self.identity.instance_id(), err);
        } else {
            tracing::error!(
                "{} could not be rolled back cleanly: {}",
                self.identity.instance_id(),
                err
            );
        }
        err
    }
}

impl<A: SynchronizationAuthority> Drop for SynchronizationContext<A> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.synchronized {
            return;
        }
        for key in &state.subscribed {
            if let Err(e) = self.authority.unsubscribe(key) {
                tracing::warn!("Failed to unsubscribe {} on drop: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAuthority;
    use crate::testing::{AuthorityCall, FaultMode, FaultyAuthority};

    struct Person<A: SynchronizationAuthority> {
        name: SyncField<String>,
        age: SyncField<u32>,
        email: SyncField<String>,
        ctx: SynchronizationContext<A>,
    }

    impl<A: SynchronizationAuthority> Person<A> {
        fn new(authority: &Arc<A>, id: &str, source: &str) -> Self {
            let name = SyncField::new("name");
            let age = SyncField::new("age");
            let email = SyncField::new("email");
            let ctx = SynchronizationContext::builder(
                Arc::clone(authority),
                InstanceIdentity::new("Person", id).unwrap(),
            )
            .source_id(source)
            .track(&name)
            .track(&age)
            .track(&email)
            .build()
            .unwrap();
            Self {
                name,
                age,
                email,
                ctx,
            }
        }

        fn key(&self, property: &str) -> SyncKey {
            self.ctx
                .identity()
                .key(property, &self.ctx.source_id())
                .unwrap()
        }
    }

    #[test]
    fn starts_desynchronized() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        assert_eq!(x.ctx.status(), SyncStatus::Desynchronized);
        assert!(!x.ctx.is_synchronized());
    }

    #[test]
    fn source_defaults_to_own_instance_id() {
        let authority = Arc::new(InMemoryAuthority::new());
        let ctx = SynchronizationContext::builder(
            authority,
            InstanceIdentity::new("Person", "x").unwrap(),
        )
        .build()
        .unwrap();
        assert_eq!(ctx.source_id(), "x");
    }

    #[test]
    fn build_rejects_empty_field_name() {
        let authority = Arc::new(InMemoryAuthority::new());
        let unnamed: SyncField<u32> = SyncField::new("");
        let err = SynchronizationContext::builder(
            authority,
            InstanceIdentity::new("Person", "x").unwrap(),
        )
        .track(&unnamed)
        .build()
        .unwrap_err();
        assert_eq!(
            err,
            KeyError::InvalidKey {
                component: KeyComponent::Property
            }
        );
    }

    #[test]
    #[should_panic(expected = "already tracked")]
    fn duplicate_field_names_panic() {
        let authority = Arc::new(InMemoryAuthority::new());
        let a: SyncField<u32> = SyncField::new("age");
        let b: SyncField<u32> = SyncField::new("age");
        let _ = SynchronizationContext::builder(
            authority,
            InstanceIdentity::new("Person", "x").unwrap(),
        )
        .track(&a)
        .track(&b);
    }

    #[test]
    fn synchronize_subscribes_every_field_then_pulls() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");

        x.ctx.synchronize().unwrap();

        assert!(x.ctx.is_synchronized());
        assert_eq!(
            authority.calls(),
            vec![
                AuthorityCall::Subscribe("name".into()),
                AuthorityCall::Subscribe("age".into()),
                AuthorityCall::Subscribe("email".into()),
                AuthorityCall::Pull("name".into()),
                AuthorityCall::Pull("age".into()),
                AuthorityCall::Pull("email".into()),
            ]
        );
        for property in ["name", "age", "email"] {
            assert!(authority.inner().is_subscribed(&x.key(property)));
        }
    }

    #[test]
    fn synchronize_adopts_group_values() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        x.ctx.write(&x.name, "Alice".to_string()).unwrap();
        x.ctx.write(&x.age, 41).unwrap();

        let y = Person::new(&authority, "y", "G");
        y.ctx.synchronize().unwrap();

        assert_eq!(y.name.get(), "Alice");
        assert_eq!(y.age.get(), 41);
        assert_eq!(y.email.get(), "");
    }

    #[test]
    fn synchronize_is_idempotent() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        authority.clear_calls();

        x.ctx.synchronize().unwrap();

        assert!(authority.calls().is_empty());
    }

    #[test]
    fn synchronize_rolls_back_on_subscribe_failure() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        authority.fail_subscribe("age", FaultMode::Once);

        let err = x.ctx.synchronize().unwrap_err();

        assert_eq!(err.transition, Transition::Synchronize);
        assert_eq!(err.step, TransitionStep::Subscribe);
        assert_eq!(err.property, "age");
        assert!(err.rolled_back());
        assert!(matches!(
            err.source,
            AuthorityError::SubscriptionFailure { .. }
        ));
        assert_eq!(x.ctx.status(), SyncStatus::Desynchronized);
        for property in ["name", "age", "email"] {
            assert!(!authority.inner().is_subscribed(&x.key(property)));
        }
        // Nothing is pulled after a failed subscribe phase.
        assert!(!authority
            .calls()
            .iter()
            .any(|call| matches!(call, AuthorityCall::Pull(_))));
    }

    #[test]
    fn synchronize_reports_failed_rollback() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        authority.fail_subscribe("email", FaultMode::Once);
        authority.fail_unsubscribe("name", FaultMode::Once);

        let err = x.ctx.synchronize().unwrap_err();

        assert_eq!(err.property, "email");
        assert_eq!(err.rollback_failures.len(), 1);
        assert_eq!(err.rollback_failures[0].property, "name");
        assert!(!x.ctx.is_synchronized());
    }

    #[test]
    fn desynchronize_unsubscribes_and_keeps_local_values() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        x.ctx.write(&x.name, "Alice".to_string()).unwrap();

        x.ctx.desynchronize().unwrap();

        assert_eq!(x.ctx.status(), SyncStatus::Desynchronized);
        assert_eq!(x.name.get(), "Alice");
        for property in ["name", "age", "email"] {
            assert!(!authority.is_subscribed(&x.key(property)));
        }
        // Already desynchronized.
        x.ctx.desynchronize().unwrap();
    }

    #[test]
    fn desynchronize_rolls_back_on_unsubscribe_failure() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        let y = Person::new(&authority, "y", "G");
        x.ctx.synchronize().unwrap();
        y.ctx.synchronize().unwrap();
        authority.fail_unsubscribe("age", FaultMode::Once);

        let err = x.ctx.desynchronize().unwrap_err();

        assert_eq!(err.transition, Transition::Desynchronize);
        assert_eq!(err.step, TransitionStep::Unsubscribe);
        assert_eq!(err.property, "age");
        assert!(err.rolled_back());
        assert!(x.ctx.is_synchronized());
        for property in ["name", "age", "email"] {
            assert!(authority.inner().is_subscribed(&x.key(property)));
        }

        // The restored subscription still delivers.
        y.ctx.write(&y.name, "Bob".to_string()).unwrap();
        assert_eq!(x.name.get(), "Bob");
    }

    #[test]
    fn desynchronize_rollback_catches_up_on_missed_pushes() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        let y = Person::new(&authority, "y", "G");
        x.ctx.synchronize().unwrap();
        y.ctx.synchronize().unwrap();

        // "name" is already unsubscribed when "age" fails, so this push
        // never reaches x's callback.
        let y_name = y.key("name");
        authority.fail_unsubscribe("age", FaultMode::Once);
        authority.on_fault(move |inner| {
            inner.push(&y_name, "Bob".to_string()).unwrap();
        });

        x.ctx.desynchronize().unwrap_err();

        assert!(x.ctx.is_synchronized());
        assert_eq!(x.name.get(), "Bob");
    }

    #[test]
    fn write_while_desynchronized_stays_local() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");

        x.ctx.write(&x.email, "x@example.com".to_string()).unwrap();

        assert_eq!(x.email.get(), "x@example.com");
        assert!(authority.calls().is_empty());
        assert_eq!(authority.inner().pull::<String>(&x.key("email")), "");
    }

    #[test]
    fn write_while_synchronized_reaches_peers() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        let y = Person::new(&authority, "y", "G");
        x.ctx.synchronize().unwrap();
        y.ctx.synchronize().unwrap();

        x.ctx.write(&x.age, 7).unwrap();

        assert_eq!(y.age.get(), 7);
        assert_eq!(x.age.get(), 7);
    }

    #[test]
    #[should_panic(expected = "is not tracked")]
    fn write_to_untracked_field_panics() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        let stray: SyncField<u32> = SyncField::new("age");
        let _ = x.ctx.write(&stray, 1);
    }

    #[test]
    fn resynchronize_moves_instance_to_new_group() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        let z = Person::new(&authority, "z", "H");
        x.ctx.synchronize().unwrap();
        z.ctx.synchronize().unwrap();
        z.ctx.write(&z.name, "Zed".to_string()).unwrap();

        let old_key = x.key("name");
        x.ctx.set_source_id("H").unwrap();
        // Still on G until resynchronized.
        assert!(authority.is_subscribed(&old_key));

        x.ctx.resynchronize().unwrap();

        assert!(!authority.is_subscribed(&old_key));
        assert!(authority.is_subscribed(&x.key("name")));
        assert_eq!(x.name.get(), "Zed");

        z.ctx.write(&z.name, "Zoe".to_string()).unwrap();
        assert_eq!(x.name.get(), "Zoe");
    }

    #[test]
    fn resynchronize_from_desynchronized_just_synchronizes() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");

        x.ctx.resynchronize().unwrap();

        assert!(x.ctx.is_synchronized());
    }

    #[test]
    fn resynchronize_leave_failure_keeps_old_group() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        let old_key = x.key("email");
        x.ctx.set_source_id("H").unwrap();
        authority.fail_unsubscribe("email", FaultMode::Once);

        let err = x.ctx.resynchronize().unwrap_err();

        assert_eq!(err.transition, Transition::Resynchronize);
        assert_eq!(err.step, TransitionStep::Unsubscribe);
        assert!(x.ctx.is_synchronized());
        assert!(authority.inner().is_subscribed(&old_key));
    }

    #[test]
    fn resynchronize_join_failure_ends_desynchronized() {
        let authority = Arc::new(FaultyAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        let old_key = x.key("name");
        x.ctx.set_source_id("H").unwrap();
        authority.fail_subscribe("age", FaultMode::Once);

        let err = x.ctx.resynchronize().unwrap_err();

        assert_eq!(err.step, TransitionStep::Subscribe);
        assert!(!x.ctx.is_synchronized());
        assert!(!authority.inner().is_subscribed(&old_key));
        assert!(!authority.inner().is_subscribed(&x.key("name")));
    }

    #[test]
    fn set_source_id_rejects_empty() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        assert!(x.ctx.set_source_id("").is_err());
        assert_eq!(x.ctx.source_id(), "G");
    }

    #[test]
    fn with_state_lock_sees_current_flag() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        assert!(!x.ctx.with_state_lock(|synced| synced));
        x.ctx.synchronize().unwrap();
        assert!(x.ctx.with_state_lock(|synced| synced));
    }

    #[test]
    fn drop_releases_subscriptions() {
        let authority = Arc::new(InMemoryAuthority::new());
        let x = Person::new(&authority, "x", "G");
        x.ctx.synchronize().unwrap();
        let key = x.key("name");
        assert!(authority.is_subscribed(&key));

        drop(x);

        assert!(!authority.is_subscribed(&key));
    }
}
