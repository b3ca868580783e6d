//! Local storage for synchronized fields.
//!
//! A [`SyncField`] is what a generated property accessor reads and writes.
//! Reads go straight to local storage; writes go through
//! [`SynchronizationContext::write`](crate::SynchronizationContext::write)
//! so they are pushed while the instance is synchronized.

use parking_lot::RwLock;
use propsync_types::SyncKey;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::authority::{self, Callback, SyncValue, SynchronizationAuthority};
use crate::error::AuthorityResult;

/// Hook fired after a value arrives from the authority.
pub type ChangeHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct FieldCell<T> {
    name: String,
    value: RwLock<T>,
    hook: RwLock<Option<ChangeHook<T>>>,
}

impl<T: SyncValue> FieldCell<T> {
    fn receive(&self, value: &T) {
        *self.value.write() = value.clone();
        self.fire(value);
    }

    /// Replace the local value with whatever `pull` returns, holding the
    /// write lock across the pull so a callback racing with it cannot be
    /// overwritten by an older pulled value.
    fn refresh(&self, pull: impl FnOnce() -> T) {
        let value = {
            let mut slot = self.value.write();
            *slot = pull();
            slot.clone()
        };
        self.fire(&value);
    }

    fn fire(&self, value: &T) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(value);
        }
    }
}

/// A tracked field's local storage. Clones share the same storage.
pub struct SyncField<T> {
    cell: Arc<FieldCell<T>>,
}

impl<T: SyncValue> SyncField<T> {
    /// Create a field holding `T::default()`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, T::default())
    }

    /// Create a field holding `value`.
    pub fn with_value(name: impl Into<String>, value: T) -> Self {
        Self {
            cell: Arc::new(FieldCell {
                name: name.into(),
                value: RwLock::new(value),
                hook: RwLock::new(None),
            }),
        }
    }

    /// The property name this field synchronizes under.
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Current local value.
    pub fn get(&self) -> T {
        self.cell.value.read().clone()
    }

    /// Install a hook fired whenever a value arrives from the authority,
    /// either pushed by another participant or pulled on synchronize.
    /// Local writes do not fire it. Replaces any previous hook.
    pub fn on_change(&self, hook: impl Fn(&T) + Send + Sync + 'static) {
        *self.cell.hook.write() = Some(Arc::new(hook));
    }

    pub(crate) fn store(&self, value: T) {
        *self.cell.value.write() = value;
    }

    /// Authority callback writing into this field.
    ///
    /// Holds the storage weakly so a subscription left behind never keeps
    /// a dropped instance's fields alive.
    pub(crate) fn callback(&self) -> Callback<T> {
        let cell: Weak<FieldCell<T>> = Arc::downgrade(&self.cell);
        authority::callback(move |value: &T| {
            if let Some(cell) = cell.upgrade() {
                cell.receive(value);
            }
            Ok(())
        })
    }

    pub(crate) fn ptr_eq(&self, other: &SyncField<T>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T> Clone for SyncField<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: SyncValue + fmt::Debug> fmt::Debug for SyncField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncField")
            .field("name", &self.cell.name)
            .field("value", &*self.cell.value.read())
            .finish()
    }
}

/// A context's type-erased view of one tracked field.
pub(crate) trait TrackedField<A: SynchronizationAuthority>: Send + Sync {
    fn name(&self) -> &str;

    /// Register this field's callback under `key`.
    fn subscribe(&self, authority: &A, key: &SyncKey) -> AuthorityResult<()>;

    /// Copy the authoritative value into local storage.
    fn pull_into(&self, authority: &A, key: &SyncKey);

    /// Type-erased handle used to match a `SyncField<T>` back to its slot.
    fn as_any(&self) -> &dyn std::any::Any;
}

impl<A: SynchronizationAuthority, T: SyncValue> TrackedField<A> for SyncField<T> {
    fn name(&self) -> &str {
        SyncField::name(self)
    }

    fn subscribe(&self, authority: &A, key: &SyncKey) -> AuthorityResult<()> {
        authority.subscribe(key, self.callback())
    }

    fn pull_into(&self, authority: &A, key: &SyncKey) {
        self.cell.refresh(|| authority.pull(key));
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
