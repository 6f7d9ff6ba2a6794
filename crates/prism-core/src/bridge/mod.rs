//! Event bridge
//!
//! Subscribes to SDK objects and turns each event into one targeted patch.
//!
//! ## Responsibilities
//!
//! - Tracking: attach exactly one listener per SDK object present in state
//! - Translation: map every event to the single patch describing it
//! - Teardown: detach listeners as soon as their object leaves state
//!
//! ## Design
//!
//! - Listeners hold a weak reference to the bridge, so a dropped client does
//!   not stay alive through the SDK objects it subscribed to
//! - Detachers run after the tracker borrow is released; an SDK that emits
//!   from inside `off` cannot observe a half-updated tracker
//! - Events for one object are applied in delivery order, with no coalescing

mod call;
mod chat;

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

pub use call::CallBridge;
pub use chat::ChatBridge;

use crate::{
    sdk::{EventEmitter, ListenerId},
    state::{CallId, ParticipantId, StreamId},
};

/// An SDK object the bridge listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedObject {
    /// The call agent.
    CallAgent,
    /// The device manager.
    DeviceManager,
    /// A call.
    Call(CallId),
    /// A remote participant of a call.
    Participant(CallId, ParticipantId),
    /// A remote video stream.
    Stream(CallId, ParticipantId, StreamId),
    /// The chat client.
    ChatClient,
}

impl TrackedObject {
    /// Whether `self` is `call_id` or one of its descendants.
    fn within_call(&self, call_id: &str) -> bool {
        match self {
            Self::Call(c) | Self::Participant(c, _) | Self::Stream(c, _, _) => c == call_id,
            Self::CallAgent | Self::DeviceManager | Self::ChatClient => false,
        }
    }

    /// Whether `self` is the participant or one of its streams.
    fn within_participant(&self, call_id: &str, participant_id: &str) -> bool {
        match self {
            Self::Participant(c, p) | Self::Stream(c, p, _) => c == call_id && p == participant_id,
            _ => false,
        }
    }
}

type Detacher = Box<dyn FnOnce()>;

/// Listener registrations keyed by tracked object.
#[derive(Default)]
struct Tracker {
    detachers: RefCell<BTreeMap<TrackedObject, Detacher>>,
}

impl Tracker {
    fn is_tracked(&self, object: &TrackedObject) -> bool {
        self.detachers.borrow().contains_key(object)
    }

    fn len(&self) -> usize {
        self.detachers.borrow().len()
    }

    fn objects(&self) -> Vec<TrackedObject> {
        self.detachers.borrow().keys().cloned().collect()
    }

    /// Record the listener `id` registered on `emitter`.
    fn insert<E, T>(&self, object: TrackedObject, emitter: Rc<T>, id: ListenerId)
    where
        E: 'static,
        T: EventEmitter<E> + ?Sized + 'static,
    {
        tracing::debug!(?object, ?id, "listener attached");
        let detach: Detacher = Box::new(move || {
            if !emitter.off(id) {
                tracing::debug!(?id, "listener already gone");
            }
        });
        let replaced = self.detachers.borrow_mut().insert(object, detach);
        if let Some(stale) = replaced {
            stale();
        }
    }

    /// Detach every tracked object matching `pred`.
    fn remove_where(&self, pred: impl Fn(&TrackedObject) -> bool) -> usize {
        let removed: Vec<(TrackedObject, Detacher)> = {
            let mut detachers = self.detachers.borrow_mut();
            let keys: Vec<TrackedObject> = detachers.keys().filter(|k| pred(k)).cloned().collect();
            keys.into_iter().filter_map(|k| detachers.remove_entry(&k)).collect()
        };
        let count = removed.len();
        for (object, detach) in removed {
            tracing::debug!(?object, "listener detached");
            detach();
        }
        count
    }

    fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::sdk::Listener;

    #[derive(Default)]
    struct CountingEmitter {
        attached: Cell<usize>,
    }

    impl EventEmitter<()> for CountingEmitter {
        fn on(&self, _listener: Listener<()>) -> ListenerId {
            self.attached.set(self.attached.get() + 1);
            ListenerId(self.attached.get() as u64)
        }

        fn off(&self, _id: ListenerId) -> bool {
            self.attached.set(self.attached.get() - 1);
            true
        }
    }

    #[test]
    fn removing_call_detaches_descendants_only() {
        let tracker = Tracker::default();
        let emitter = Rc::new(CountingEmitter::default());
        let objects = [
            TrackedObject::CallAgent,
            TrackedObject::Call("c1".to_string()),
            TrackedObject::Participant("c1".to_string(), "p1".to_string()),
            TrackedObject::Stream("c1".to_string(), "p1".to_string(), 1),
            TrackedObject::Call("c2".to_string()),
        ];
        for object in objects {
            let id = emitter.on(Box::new(|_: &()| {}));
            tracker.insert::<(), _>(object, Rc::clone(&emitter), id);
        }

        assert_eq!(tracker.remove_where(|o| o.within_call("c1")), 3);

        assert_eq!(emitter.attached.get(), 2);
        assert_eq!(
            tracker.objects(),
            vec![TrackedObject::CallAgent, TrackedObject::Call("c2".to_string())]
        );
    }

    #[test]
    fn reinserting_object_detaches_previous_listener() {
        let tracker = Tracker::default();
        let emitter = Rc::new(CountingEmitter::default());

        for _ in 0..3 {
            let id = emitter.on(Box::new(|_: &()| {}));
            tracker.insert::<(), _>(TrackedObject::DeviceManager, Rc::clone(&emitter), id);
        }

        assert_eq!(emitter.attached.get(), 1);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.clear(), 1);
        assert_eq!(emitter.attached.get(), 0);
        assert!(!tracker.is_tracked(&TrackedObject::DeviceManager));
    }
}
