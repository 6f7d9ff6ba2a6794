//! View binding.
//!
//! A [`ViewBinding`] is what a component holds: one selector instance, the
//! component's props, and the last view model it rendered. Feeding it a new
//! snapshot answers "does this component re-render", which is the question
//! the whole memoization pipeline exists to answer cheaply.

use std::{cell::RefCell, marker::PhantomData, rc::Rc, sync::Arc};

use prism_memo::{Identical, Selector, SelectorError};

use crate::store::{StateStore, SubscriptionId};

/// Selector, props and last rendered output of one component.
///
/// # Type Parameters
///
/// - `Sel`: selector producing the component's view model
/// - `S`: state the selector reads
/// - `P`: component props
pub struct ViewBinding<Sel, S, P>
where
    Sel: Selector<S, P>,
    S: ?Sized,
{
    /// Selector owned by this binding.
    selector: Sel,

    /// Current props.
    props: P,

    /// Last view model handed to the component.
    rendered: Option<Sel::Output>,

    /// Number of times the component was told to render.
    renders: u64,

    _state: PhantomData<fn(&S)>,
}

impl<Sel, S, P> ViewBinding<Sel, S, P>
where
    Sel: Selector<S, P>,
    Sel::Output: Identical + Clone,
    S: ?Sized,
{
    /// Bind `selector` with initial `props`. Nothing is rendered yet.
    pub fn new(selector: Sel, props: P) -> Self {
        Self { selector, props, rendered: None, renders: 0, _state: PhantomData }
    }

    /// Replace the props. The next [`Self::update`] re-evaluates the
    /// selector with them.
    pub fn set_props(&mut self, props: P) {
        self.props = props;
    }

    /// Current props.
    pub fn props(&self) -> &P {
        &self.props
    }

    /// Evaluate the selector against `state`.
    ///
    /// Returns `Some(view_model)` if the output is not identical to the last
    /// rendered one, `None` if the component can skip rendering.
    ///
    /// # Errors
    ///
    /// Propagates selector failures; the rendered output is left unchanged.
    pub fn update(&mut self, state: &S) -> Result<Option<Sel::Output>, SelectorError> {
        let output = self.selector.select(state, &self.props)?;
        if self.rendered.as_ref().is_some_and(|rendered| rendered.identical(&output)) {
            return Ok(None);
        }
        self.renders += 1;
        self.rendered = Some(output.clone());
        Ok(Some(output))
    }

    /// Last rendered view model.
    pub fn rendered(&self) -> Option<&Sel::Output> {
        self.rendered.as_ref()
    }

    /// Render count.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// The bound selector, for cache inspection.
    pub fn selector(&self) -> &Sel {
        &self.selector
    }
}

/// Drive `binding` from `store`: render once against the current snapshot,
/// then again on every snapshot whose view model changed identity.
///
/// Selector failures are logged and skipped. Returns the subscription, to be
/// passed to [`StateStore::off_state_change`], and a handle on the binding.
pub fn subscribe_binding<Sel, S, P>(
    store: &StateStore<S>,
    binding: ViewBinding<Sel, S, P>,
    mut on_render: impl FnMut(&Sel::Output) + 'static,
) -> (SubscriptionId, Rc<RefCell<ViewBinding<Sel, S, P>>>)
where
    Sel: Selector<S, P> + 'static,
    Sel::Output: Identical + Clone,
    S: 'static,
    P: 'static,
{
    let binding = Rc::new(RefCell::new(binding));

    let mut render = move |binding: &RefCell<ViewBinding<Sel, S, P>>, state: &Arc<S>| {
        let mut binding = binding.borrow_mut();
        match binding.update(state) {
            Ok(Some(output)) => on_render(&output),
            Ok(None) => {},
            Err(err) => {
                tracing::warn!(
                    selector = binding.selector.name(),
                    %err,
                    "selector failed, render skipped"
                );
            },
        }
    };

    render(&binding, &store.get_state());
    let handle = Rc::clone(&binding);
    let id = store.on_state_change(move |state| render(&handle, state));
    (id, binding)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{
        selectors::{ParticipantProps, is_muted_selector},
        state::{CallClientState, CallState, CallStatus, RemoteParticipantState},
        transition::CallPatch,
    };

    fn call_store() -> StateStore<CallClientState> {
        let store = StateStore::new(CallClientState::new("me"));
        let call = CallState::new("c1", CallStatus::Connected, 0);
        let _ = store.apply_transition(CallPatch::CallAdded { call });
        let _ = store.apply_transition(CallPatch::ParticipantsUpdated {
            call_id: "c1".to_string(),
            added: vec![RemoteParticipantState::new("s1"), RemoteParticipantState::new("s2")],
            removed: Vec::new(),
            max_ended: 4,
        });
        store
    }

    fn mute(store: &StateStore<CallClientState>, participant: &str, is_muted: bool) {
        let _ = store.apply_transition(CallPatch::ParticipantMutedChanged {
            call_id: "c1".to_string(),
            participant_id: participant.to_string(),
            is_muted,
        });
    }

    fn props(participant: &str) -> ParticipantProps {
        ParticipantProps { call_id: "c1".to_string(), participant_id: participant.to_string() }
    }

    #[test]
    fn renders_only_when_output_changes() {
        let store = call_store();
        let mut binding = ViewBinding::new(is_muted_selector(), props("s1"));

        assert_eq!(binding.update(&store.get_state()).unwrap(), Some(Some(false)));
        mute(&store, "s2", true);
        assert_eq!(binding.update(&store.get_state()).unwrap(), None);
        mute(&store, "s1", true);
        assert_eq!(binding.update(&store.get_state()).unwrap(), Some(Some(true)));

        assert_eq!(binding.renders(), 2);
        assert_eq!(binding.rendered(), Some(&Some(true)));
    }

    #[test]
    fn changing_props_rescopes_binding() {
        let store = call_store();
        mute(&store, "s2", true);
        let mut binding = ViewBinding::new(is_muted_selector(), props("s1"));
        let _ = binding.update(&store.get_state()).unwrap();

        binding.set_props(props("s2"));

        assert_eq!(binding.update(&store.get_state()).unwrap(), Some(Some(true)));
        assert_eq!(binding.props().participant_id, "s2");
    }

    #[test]
    fn subscribed_binding_follows_store() {
        let store = call_store();
        let renders = Rc::new(Cell::new(0));
        let counter = Rc::clone(&renders);
        let binding = ViewBinding::new(is_muted_selector(), props("s1"));

        let (id, handle) =
            subscribe_binding(&store, binding, move |_| counter.set(counter.get() + 1));
        mute(&store, "s2", true);
        mute(&store, "s1", true);
        mute(&store, "s1", false);

        assert_eq!(renders.get(), 3);
        assert_eq!(handle.borrow().rendered(), Some(&Some(false)));
        assert!(store.off_state_change(id));
    }
}
