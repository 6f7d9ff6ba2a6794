//! Listener bookkeeping for simulated SDK objects.
//!
//! Every simulated object owns a [`SimEmitter`]. All emitters created from
//! the same [`ListenerLedger`] report into it, so one counter covers a whole
//! object graph. After any sequence of operations the ledger must equal the
//! bridge's tracked-object count; a surplus is a leaked listener.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use prism_core::sdk::{EventEmitter, Listener, ListenerId};

/// Shared count of attached listeners.
#[derive(Debug, Clone, Default)]
pub struct ListenerLedger {
    attached: Rc<Cell<usize>>,
    ever_attached: Rc<Cell<u64>>,
}

impl ListenerLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listeners currently attached across the graph.
    pub fn attached(&self) -> usize {
        self.attached.get()
    }

    /// Listeners attached since the ledger was created.
    pub fn ever_attached(&self) -> u64 {
        self.ever_attached.get()
    }

    fn attach(&self) {
        self.attached.set(self.attached.get() + 1);
        self.ever_attached.set(self.ever_attached.get() + 1);
    }

    fn detach(&self) {
        self.attached.set(self.attached.get().saturating_sub(1));
    }
}

type SharedListener<E> = Rc<RefCell<Listener<E>>>;

/// Listener list of one simulated object.
///
/// Emission iterates over a snapshot of the list, so listeners may attach or
/// detach listeners (including themselves) while an event is delivered. A
/// listener detached earlier in the same emission is skipped.
pub struct SimEmitter<E> {
    ledger: ListenerLedger,
    listeners: RefCell<Vec<(ListenerId, SharedListener<E>)>>,
    next_id: Cell<u64>,
}

impl<E> SimEmitter<E> {
    /// Emitter reporting into `ledger`.
    pub fn new(ledger: &ListenerLedger) -> Self {
        Self { ledger: ledger.clone(), listeners: RefCell::new(Vec::new()), next_id: Cell::new(0) }
    }

    /// Listeners attached to this object.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Deliver `event` to every attached listener. Returns the number of
    /// listeners invoked.
    pub fn emit(&self, event: &E) -> usize {
        let snapshot: Vec<(ListenerId, SharedListener<E>)> =
            self.listeners
                .borrow()
                .iter()
                .map(|(id, listener)| (*id, Rc::clone(listener)))
                .collect();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            if !self.is_attached(id) {
                continue;
            }
            match listener.try_borrow_mut() {
                Ok(mut listener) => {
                    (*listener)(event);
                    delivered += 1;
                },
                Err(_) => tracing::warn!(?id, "listener re-entered its own emitter, skipped"),
            }
        }
        delivered
    }

    fn is_attached(&self, id: ListenerId) -> bool {
        self.listeners.borrow().iter().any(|(attached, _)| *attached == id)
    }
}

impl<E> EventEmitter<E> for SimEmitter<E> {
    fn on(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(RefCell::new(listener))));
        self.ledger.attach();
        id
    }

    fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(index) = listeners.iter().position(|(attached, _)| *attached == id) else {
            return false;
        };
        listeners.remove(index);
        self.ledger.detach();
        true
    }
}

impl<E> fmt::Debug for SimEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEmitter").field("listeners", &self.listener_count()).finish()
    }
}

/// Implement [`EventEmitter`] for a simulated object by delegating to its
/// `emitter` field.
macro_rules! delegate_emitter {
    ($object:ty, $event:ty) => {
        impl ::prism_core::sdk::EventEmitter<$event> for $object {
            fn on(
                &self,
                listener: ::prism_core::sdk::Listener<$event>,
            ) -> ::prism_core::sdk::ListenerId {
                self.emitter.on(listener)
            }

            fn off(&self, id: ::prism_core::sdk::ListenerId) -> bool {
                self.emitter.off(id)
            }
        }
    };
}

pub(crate) use delegate_emitter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_counts_across_emitters() {
        let ledger = ListenerLedger::new();
        let a: SimEmitter<u8> = SimEmitter::new(&ledger);
        let b: SimEmitter<u8> = SimEmitter::new(&ledger);

        let first = a.on(Box::new(|_| {}));
        let _ = b.on(Box::new(|_| {}));
        assert_eq!(ledger.attached(), 2);

        assert!(a.off(first));
        assert!(!a.off(first));
        assert_eq!(ledger.attached(), 1);
        assert_eq!(ledger.ever_attached(), 2);
    }

    #[test]
    fn listener_detached_mid_emit_is_skipped() {
        let ledger = ListenerLedger::new();
        let emitter: Rc<SimEmitter<u8>> = Rc::new(SimEmitter::new(&ledger));
        let hits = Rc::new(Cell::new(0));

        let victim = Rc::new(Cell::new(None));
        let (handle, slot) = (Rc::clone(&emitter), Rc::clone(&victim));
        let _ = emitter.on(Box::new(move |_| {
            if let Some(id) = slot.get() {
                let _ = handle.off(id);
            }
        }));
        let counter = Rc::clone(&hits);
        victim.set(Some(emitter.on(Box::new(move |_| counter.set(counter.get() + 1)))));

        assert_eq!(emitter.emit(&1), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(ledger.attached(), 1);
    }

    #[test]
    fn reentrant_emit_skips_busy_listener() {
        let ledger = ListenerLedger::new();
        let emitter: Rc<SimEmitter<u8>> = Rc::new(SimEmitter::new(&ledger));
        let hits = Rc::new(Cell::new(0));
        let (handle, counter) = (Rc::clone(&emitter), Rc::clone(&hits));

        let _ = emitter.on(Box::new(move |depth| {
            counter.set(counter.get() + 1);
            if *depth == 0 {
                let _ = handle.emit(&1);
            }
        }));

        assert_eq!(emitter.emit(&0), 1);
        assert_eq!(hits.get(), 1);
    }
}
