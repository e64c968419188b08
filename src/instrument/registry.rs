use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use tracing::debug;

use crate::math::tensor::Tensor3;
use crate::network::classifier::LayerId;

/// Callback observing a layer's output (forward) or the gradient w.r.t. that
/// output (backward). Must not touch the registry it is registered on.
pub type HookFn = Box<dyn Fn(&Tensor3) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Forward,
    Backward,
}

/// Identifies one instrumentation session. Hooks only fire for evaluation
/// contexts bound to the session that registered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

struct HookEntry {
    session: SessionId,
    layer: LayerId,
    kind: HookKind,
    callback: HookFn,
}

/// Per-classifier hook table.
///
/// Hooks can only be added through an [`InstrumentationScope`], which holds
/// the registry's session lock for its whole lifetime and removes every hook
/// it added when dropped. At most one scope exists per registry at a time.
pub struct HookRegistry {
    entries: RwLock<Vec<HookEntry>>,
    next_session: AtomicU64,
    session_lock: Mutex<()>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry {
            entries: RwLock::new(Vec::new()),
            next_session: AtomicU64::new(1),
            session_lock: Mutex::new(()),
        }
    }

    /// Opens an instrumentation scope, blocking while another is open.
    pub fn instrument(&self) -> InstrumentationScope<'_> {
        let guard = self.session_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.open(guard)
    }

    /// Opens an instrumentation scope only if none is currently open.
    pub fn try_instrument(&self) -> Option<InstrumentationScope<'_>> {
        match self.session_lock.try_lock() {
            Ok(guard) => Some(self.open(guard)),
            Err(TryLockError::Poisoned(poisoned)) => Some(self.open(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn open<'a>(&'a self, guard: MutexGuard<'a, ()>) -> InstrumentationScope<'a> {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        debug!(?session, "instrumentation scope opened");
        InstrumentationScope { registry: self, session, _exclusive: guard }
    }

    /// Number of hooks currently registered.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every hook of `session` attached to `layer` for `kind`.
    /// Returns how many fired. Evaluations without a session fire nothing.
    pub fn fire(
        &self,
        session: Option<SessionId>,
        layer: LayerId,
        kind: HookKind,
        tensor: &Tensor3,
    ) -> usize {
        let Some(session) = session else { return 0 };
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut fired = 0;
        for entry in entries.iter() {
            if entry.session == session && entry.layer == layer && entry.kind == kind {
                (entry.callback)(tensor);
                fired += 1;
            }
        }
        fired
    }

    fn register(&self, session: SessionId, layer: LayerId, kind: HookKind, callback: HookFn) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push(HookEntry { session, layer, kind, callback });
    }

    fn remove_session(&self, session: SessionId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|entry| entry.session != session);
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        HookRegistry::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.len()).finish()
    }
}

/// Exclusive, scoped instrumentation of one classifier.
///
/// Dropping the scope deregisters its hooks before the session lock is
/// released, on normal return and on early `?` exits alike.
pub struct InstrumentationScope<'a> {
    registry: &'a HookRegistry,
    session: SessionId,
    _exclusive: MutexGuard<'a, ()>,
}

impl<'a> InstrumentationScope<'a> {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn on_forward<F>(&mut self, layer: LayerId, callback: F)
    where
        F: Fn(&Tensor3) + Send + Sync + 'static,
    {
        self.registry.register(self.session, layer, HookKind::Forward, Box::new(callback));
    }

    pub fn on_backward<F>(&mut self, layer: LayerId, callback: F)
    where
        F: Fn(&Tensor3) + Send + Sync + 'static,
    {
        self.registry.register(self.session, layer, HookKind::Backward, Box::new(callback));
    }
}

impl Drop for InstrumentationScope<'_> {
    fn drop(&mut self) {
        self.registry.remove_session(self.session);
        debug!(session = ?self.session, "instrumentation scope closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Shape;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter_hook(counter: &Arc<AtomicUsize>) -> impl Fn(&Tensor3) + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn scope_drop_removes_hooks() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tensor = Tensor3::zeros(Shape::new(1, 2, 2));

        let session = {
            let mut scope = registry.instrument();
            scope.on_forward(LayerId(0), counter_hook(&counter));
            scope.on_backward(LayerId(0), counter_hook(&counter));
            assert_eq!(registry.len(), 2);
            assert_eq!(registry.fire(Some(scope.session()), LayerId(0), HookKind::Forward, &tensor), 1);
            scope.session()
        };

        assert!(registry.is_empty());
        assert_eq!(registry.fire(Some(session), LayerId(0), HookKind::Forward, &tensor), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_ignore_other_sessions_and_layers() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tensor = Tensor3::zeros(Shape::new(1, 2, 2));

        let mut scope = registry.instrument();
        scope.on_forward(LayerId(3), counter_hook(&counter));

        assert_eq!(registry.fire(None, LayerId(3), HookKind::Forward, &tensor), 0);
        assert_eq!(registry.fire(Some(scope.session()), LayerId(2), HookKind::Forward, &tensor), 0);
        assert_eq!(registry.fire(Some(scope.session()), LayerId(3), HookKind::Backward, &tensor), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn only_one_scope_at_a_time() {
        let registry = HookRegistry::new();
        let scope = registry.instrument();
        assert!(registry.try_instrument().is_none());
        drop(scope);
        assert!(registry.try_instrument().is_some());
    }

    #[test]
    fn sessions_are_distinct() {
        let registry = HookRegistry::new();
        let first = registry.instrument().session();
        let second = registry.instrument().session();
        assert_ne!(first, second);
    }
}
