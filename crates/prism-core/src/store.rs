//! Canonical state holder.
//!
//! A [`StateStore`] owns the current snapshot of one client's state and is
//! the only place a new snapshot can come from. Every change arrives as a
//! [`Transition`] that reads the current snapshot and either builds the next
//! one or reports that nothing changed.
//!
//! # Invariants
//!
//! - Snapshot immutability: a snapshot handed out by [`StateStore::get_state`]
//!   is never modified. A transition builds a new root that shares unchanged
//!   subtrees with the old one.
//! - One notification per transition: every applied transition produces
//!   exactly one notification pass over the subscribers, in registration
//!   order, carrying the snapshot that transition produced.
//! - No-op identity: a transition that changes nothing (absent entity, value
//!   already set) leaves the root reference untouched and notifies nobody.
//! - Monotonic version: `version()` increases by one per applied transition.
//!
//! # Re-entrancy
//!
//! Subscribers may apply transitions. Those are queued and applied in order
//! once the current notification pass finishes, so a subscriber never sees
//! a snapshot newer than the one it was called with. Subscriber lists are
//! captured at the start of a pass: subscriptions made or removed inside a
//! handler take effect for the next transition.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
    sync::Arc,
};

/// A change to a snapshot.
///
/// `apply` must be pure: it reads `state` and returns the next snapshot, or
/// `None` if the change does not apply (target absent or already in the
/// requested state).
pub trait Transition<S> {
    /// Short name for logs.
    fn kind(&self) -> &'static str;

    /// Build the next snapshot, or `None` for a no-op.
    fn apply(&self, state: &S) -> Option<S>;
}

/// Ad-hoc transition built from a closure.
pub struct FnTransition<F> {
    kind: &'static str,
    func: F,
}

/// Wrap a closure as a named [`Transition`].
pub fn transition_fn<S, F>(kind: &'static str, func: F) -> FnTransition<F>
where
    F: Fn(&S) -> Option<S>,
{
    FnTransition { kind, func }
}

impl<S, F> Transition<S> for FnTransition<F>
where
    F: Fn(&S) -> Option<S>,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn apply(&self, state: &S) -> Option<S> {
        (self.func)(state)
    }
}

/// What [`StateStore::apply_transition`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TransitionOutcome {
    /// A new snapshot was published.
    Applied {
        /// Store version after the transition.
        version: u64,
    },
    /// Nothing changed; the root reference is the same as before.
    Unchanged,
    /// Issued from inside a subscriber; queued behind the current pass.
    Deferred,
}

impl TransitionOutcome {
    /// Whether a new snapshot was published.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Handle returned by [`StateStore::on_state_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<S> = Rc<RefCell<dyn FnMut(&Arc<S>)>>;

type Settled = Box<dyn FnOnce(TransitionOutcome)>;

struct Pending<S> {
    transition: Box<dyn Transition<S>>,
    settled: Option<Settled>,
}

struct Subscriber<S> {
    id: SubscriptionId,
    handler: Handler<S>,
}

struct Shared<S> {
    state: RefCell<Arc<S>>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<Subscriber<S>>>,
    next_subscription: Cell<u64>,
    pending: RefCell<VecDeque<Pending<S>>>,
    notifying: Cell<bool>,
    disposed: Cell<bool>,
}

/// Shared handle to one client's state.
///
/// Cloning the handle shares the store. The store is single-threaded: all
/// transitions, notifications and reads happen on the thread that owns it.
pub struct StateStore<S> {
    shared: Rc<Shared<S>>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self { shared: Rc::clone(&self.shared) }
    }
}

impl<S> fmt::Debug for StateStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("version", &self.shared.version.get())
            .field("subscribers", &self.shared.subscribers.borrow().len())
            .field("pending", &self.shared.pending.borrow().len())
            .field("disposed", &self.shared.disposed.get())
            .finish()
    }
}

impl<S: 'static> StateStore<S> {
    /// Create a store holding `initial` at version 0.
    pub fn new(initial: S) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(Arc::new(initial)),
                version: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                pending: RefCell::new(VecDeque::new()),
                notifying: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Current snapshot.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.shared.state.borrow())
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> u64 {
        self.shared.version.get()
    }

    /// Register a handler called with every new snapshot.
    pub fn on_state_change(&self, handler: impl FnMut(&Arc<S>) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_subscription.get());
        self.shared.next_subscription.set(id.0 + 1);
        if self.shared.disposed.get() {
            tracing::debug!(?id, "subscription on disposed store ignored");
            return id;
        }
        let handler: Handler<S> = Rc::new(RefCell::new(handler));
        self.shared.subscribers.borrow_mut().push(Subscriber { id, handler });
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off_state_change(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.borrow().len()
    }

    /// Apply a transition and notify subscribers if it changed the state.
    ///
    /// Stale transitions (target absent, value already set) return
    /// [`TransitionOutcome::Unchanged`] and keep the current root.
    pub fn apply_transition(&self, transition: impl Transition<S> + 'static) -> TransitionOutcome {
        self.submit(Box::new(transition), None)
    }

    /// Like [`Self::apply_transition`], then call `settled` with the outcome
    /// the transition finally had.
    ///
    /// For an immediate transition `settled` runs before this returns. For a
    /// deferred one it runs after the transition leaves the queue, with
    /// `Applied` or `Unchanged`. It never runs if the store is disposed
    /// while the transition is queued.
    pub fn apply_transition_then(
        &self,
        transition: impl Transition<S> + 'static,
        settled: impl FnOnce(TransitionOutcome) + 'static,
    ) -> TransitionOutcome {
        self.submit(Box::new(transition), Some(Box::new(settled)))
    }

    fn submit(
        &self,
        transition: Box<dyn Transition<S>>,
        settled: Option<Settled>,
    ) -> TransitionOutcome {
        if self.shared.disposed.get() {
            tracing::debug!(kind = transition.kind(), "transition on disposed store ignored");
            if let Some(settled) = settled {
                settled(TransitionOutcome::Unchanged);
            }
            return TransitionOutcome::Unchanged;
        }

        if self.shared.notifying.get() {
            tracing::warn!(kind = transition.kind(), "re-entrant transition deferred");
            self.shared.pending.borrow_mut().push_back(Pending { transition, settled });
            return TransitionOutcome::Deferred;
        }

        let outcome = self.apply_now(transition.as_ref());
        if let Some(settled) = settled {
            settled(outcome);
        }
        self.drain_pending();
        outcome
    }

    /// Drop all subscribers and pending transitions. Later transitions are
    /// ignored.
    pub fn dispose(&self) {
        if self.shared.disposed.replace(true) {
            return;
        }
        self.shared.subscribers.borrow_mut().clear();
        self.shared.pending.borrow_mut().clear();
        tracing::debug!(version = self.version(), "state store disposed");
    }

    /// Whether [`Self::dispose`] was called.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.get()
    }

    fn apply_now(&self, transition: &dyn Transition<S>) -> TransitionOutcome {
        let current = self.get_state();
        let Some(next) = transition.apply(&current) else {
            tracing::debug!(kind = transition.kind(), "no-op transition");
            return TransitionOutcome::Unchanged;
        };

        let next = Arc::new(next);
        *self.shared.state.borrow_mut() = Arc::clone(&next);
        let version = self.shared.version.get() + 1;
        self.shared.version.set(version);
        tracing::trace!(version, kind = transition.kind(), "transition applied");

        self.notify(&next);
        TransitionOutcome::Applied { version }
    }

    fn notify(&self, snapshot: &Arc<S>) {
        let handlers: Vec<Handler<S>> =
            self.shared.subscribers.borrow().iter().map(|s| Rc::clone(&s.handler)).collect();

        self.shared.notifying.set(true);
        for handler in handlers {
            if self.shared.disposed.get() {
                break;
            }
            (*handler.borrow_mut())(snapshot);
        }
        self.shared.notifying.set(false);
    }

    fn drain_pending(&self) {
        loop {
            let next = self.shared.pending.borrow_mut().pop_front();
            let Some(Pending { transition, settled }) = next else {
                break;
            };
            let outcome = self.apply_now(transition.as_ref());
            if let Some(settled) = settled {
                settled(outcome);
            }
        }
    }
}
