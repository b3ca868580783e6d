//! Fault-injecting authority for testing.
//!
//! Wraps an [`InMemoryAuthority`] and fails `subscribe`/`unsubscribe`
//! calls for chosen properties, so rollback paths can be exercised the way a
//! networked backend would trigger them.

use parking_lot::Mutex;
use propsync_types::SyncKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::authority::{Callback, SyncValue, SynchronizationAuthority};
use crate::error::{AuthorityError, AuthorityResult};
use crate::memory::InMemoryAuthority;

/// How long an injected fault stays armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Fail the next matching call only.
    Once,
    /// Fail every matching call until cleared.
    Always,
}

/// A call observed by the [`FaultyAuthority`], tagged with the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    /// `pull` for the property.
    Pull(String),
    /// `push` for the property.
    Push(String),
    /// `subscribe` for the property (recorded even when it failed).
    Subscribe(String),
    /// `unsubscribe` for the property (recorded even when it failed).
    Unsubscribe(String),
}

#[derive(Debug, Default)]
struct Faults {
    subscribe: HashMap<String, FaultMode>,
    unsubscribe: HashMap<String, FaultMode>,
    calls: Vec<AuthorityCall>,
}

fn take_fault(faults: &mut HashMap<String, FaultMode>, property: &str) -> bool {
    match faults.get(property) {
        Some(FaultMode::Once) => {
            faults.remove(property);
            true
        }
        Some(FaultMode::Always) => true,
        None => false,
    }
}

/// Runs against the wrapped authority each time a fault is injected.
pub type FaultHook = Arc<dyn Fn(&InMemoryAuthority) + Send + Sync>;

/// Authority that delegates to an in-memory authority but fails on demand.
#[derive(Default)]
pub struct FaultyAuthority {
    inner: InMemoryAuthority,
    faults: Mutex<Faults>,
    on_fault: Mutex<Option<FaultHook>>,
}

impl fmt::Debug for FaultyAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultyAuthority")
            .field("inner", &self.inner)
            .field("faults", &*self.faults.lock())
            .finish_non_exhaustive()
    }
}

impl FaultyAuthority {
    /// Create a faulty authority with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped authority, for inspecting subscriptions and values.
    pub fn inner(&self) -> &InMemoryAuthority {
        &self.inner
    }

    /// Fail `subscribe` calls for `property`.
    pub fn fail_subscribe(&self, property: &str, mode: FaultMode) {
        self.faults
            .lock()
            .subscribe
            .insert(property.to_string(), mode);
    }

    /// Fail `unsubscribe` calls for `property`.
    pub fn fail_unsubscribe(&self, property: &str, mode: FaultMode) {
        self.faults
            .lock()
            .unsubscribe
            .insert(property.to_string(), mode);
    }

    /// Run `hook` just before each injected failure is returned, e.g. to
    /// push from another participant while a transition is half done.
    pub fn on_fault(&self, hook: impl Fn(&InMemoryAuthority) + Send + Sync + 'static) {
        *self.on_fault.lock() = Some(Arc::new(hook));
    }

    fn fire_fault_hook(&self) {
        let hook = self.on_fault.lock().clone();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
    }

    /// Disarm every fault.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.subscribe.clear();
        faults.unsubscribe.clear();
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.faults.lock().calls.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.faults.lock().calls.clear();
    }
}

impl SynchronizationAuthority for FaultyAuthority {
    fn pull<T: SyncValue>(&self, key: &SyncKey) -> T {
        self.faults
            .lock()
            .calls
            .push(AuthorityCall::Pull(key.property().to_string()));
        self.inner.pull(key)
    }

    fn push<T: SyncValue>(&self, key: &SyncKey, value: T) -> AuthorityResult<()> {
        self.faults
            .lock()
            .calls
            .push(AuthorityCall::Push(key.property().to_string()));
        self.inner.push(key, value)
    }

    fn subscribe<T: SyncValue>(
        &self,
        key: &SyncKey,
        callback: Callback<T>,
    ) -> AuthorityResult<()> {
        let fail = {
            let mut faults = self.faults.lock();
            faults
                .calls
                .push(AuthorityCall::Subscribe(key.property().to_string()));
            take_fault(&mut faults.subscribe, key.property())
        };
        if fail {
            self.fire_fault_hook();
            return Err(AuthorityError::SubscriptionFailure {
                state_id: key.state_id(),
                participant: key.participant_id().clone(),
                reason: "injected fault".to_string(),
            });
        }
        self.inner.subscribe(key, callback)
    }

    fn unsubscribe(&self, key: &SyncKey) -> AuthorityResult<()> {
        let fail = {
            let mut faults = self.faults.lock();
            faults
                .calls
                .push(AuthorityCall::Unsubscribe(key.property().to_string()));
            take_fault(&mut faults.unsubscribe, key.property())
        };
        if fail {
            self.fire_fault_hook();
            return Err(AuthorityError::UnsubscriptionFailure {
                state_id: key.state_id(),
                participant: key.participant_id().clone(),
                reason: "injected fault".to_string(),
            });
        }
        self.inner.unsubscribe(key)
    }
}
