//! Stateful call client.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use crate::{
    bridge::{CallBridge, TrackedObject},
    config::CallClientConfig,
    env::Environment,
    error::ClientError,
    sdk::{Call, CallAgent, CallClient, DeviceManager},
    state::{
        CallClientState, DeviceAccess, ParticipantId, StreamId, VideoDeviceInfo, VideoViewState,
    },
    store::{StateStore, SubscriptionId, TransitionOutcome},
    transition::CallPatch,
};

/// Call client whose state is mirrored into an immutable snapshot.
///
/// Wraps an SDK [`CallClient`]. Every SDK object obtained through this
/// client is tracked until it leaves the state tree; commands that only
/// change the local projection (views, camera selection) are applied as
/// transitions directly.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct StatefulCallClient<E: Environment> {
    /// Underlying SDK client.
    sdk: Rc<dyn CallClient>,

    /// Event bridge owning the state store.
    bridge: CallBridge<E>,

    /// Call agent, created on first use.
    agent: RefCell<Option<Rc<dyn CallAgent>>>,

    /// Device manager, obtained on first use.
    device_manager: RefCell<Option<Rc<dyn DeviceManager>>>,
}

/// Create a [`StatefulCallClient`] around `sdk`.
pub fn create_stateful_call_client<E: Environment>(
    sdk: Rc<dyn CallClient>,
    env: E,
    config: CallClientConfig,
) -> StatefulCallClient<E> {
    let user_id = sdk.user_id();
    tracing::info!(%user_id, "stateful call client created");
    let store = StateStore::new(CallClientState::new(user_id));
    StatefulCallClient {
        sdk,
        bridge: CallBridge::new(store, env, config),
        agent: RefCell::new(None),
        device_manager: RefCell::new(None),
    }
}

impl<E: Environment> StatefulCallClient<E> {
    /// Current snapshot.
    pub fn get_state(&self) -> Arc<CallClientState> {
        self.store().get_state()
    }

    /// Register a handler called with every new snapshot.
    pub fn on_state_change(
        &self,
        handler: impl FnMut(&Arc<CallClientState>) + 'static,
    ) -> SubscriptionId {
        self.store().on_state_change(handler)
    }

    /// Remove a handler.
    pub fn off_state_change(&self, id: SubscriptionId) -> bool {
        self.store().off_state_change(id)
    }

    /// Underlying store.
    pub fn store(&self) -> &StateStore<CallClientState> {
        self.bridge.store()
    }

    /// Create the call agent and start tracking it. Returns the existing
    /// agent on later calls.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after [`Self::dispose`]
    /// - `ClientError::Sdk` if the SDK refuses
    pub fn create_call_agent(
        &self,
        display_name: Option<String>,
    ) -> Result<Rc<dyn CallAgent>, ClientError> {
        self.ensure_live()?;
        if let Some(agent) = self.agent.borrow().as_ref() {
            return Ok(Rc::clone(agent));
        }
        let agent = self.sdk.create_call_agent(display_name)?;
        *self.agent.borrow_mut() = Some(Rc::clone(&agent));
        self.bridge.track_call_agent(Rc::clone(&agent));
        Ok(agent)
    }

    /// Obtain the device manager and start tracking it.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after [`Self::dispose`]
    /// - `ClientError::Sdk` if the SDK refuses
    pub fn get_device_manager(&self) -> Result<Rc<dyn DeviceManager>, ClientError> {
        self.ensure_live()?;
        if let Some(device_manager) = self.device_manager.borrow().as_ref() {
            return Ok(Rc::clone(device_manager));
        }
        let device_manager = self.sdk.get_device_manager()?;
        *self.device_manager.borrow_mut() = Some(Rc::clone(&device_manager));
        self.bridge.track_device_manager(Rc::clone(&device_manager));
        Ok(device_manager)
    }

    /// Start a call, creating the call agent if needed.
    ///
    /// The call is tracked immediately, whether or not the SDK also reports
    /// it through the agent.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after [`Self::dispose`]
    /// - `ClientError::Sdk` if the SDK refuses
    pub fn start_call(&self, participants: &[ParticipantId]) -> Result<Rc<dyn Call>, ClientError> {
        let agent = self.create_call_agent(None)?;
        let call = agent.start_call(participants)?;
        self.bridge.track_call(Rc::clone(&call));
        Ok(call)
    }

    /// Attach a view to a remote stream.
    ///
    /// # Errors
    ///
    /// - `ClientError::CallNotFound`, `ParticipantNotFound`, `StreamNotFound`
    ///   if the target is not in state
    /// - `ClientError::Disposed` after [`Self::dispose`]
    pub fn create_view(
        &self,
        call_id: &str,
        participant_id: &str,
        stream_id: StreamId,
        view: VideoViewState,
    ) -> Result<TransitionOutcome, ClientError> {
        self.ensure_live()?;
        self.check_stream(call_id, participant_id, stream_id)?;
        Ok(self.store().apply_transition(CallPatch::ViewCreated {
            call_id: call_id.to_string(),
            participant_id: participant_id.to_string(),
            stream_id,
            view,
        }))
    }

    /// Release a stream's view.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_view`].
    pub fn dispose_view(
        &self,
        call_id: &str,
        participant_id: &str,
        stream_id: StreamId,
    ) -> Result<TransitionOutcome, ClientError> {
        self.ensure_live()?;
        self.check_stream(call_id, participant_id, stream_id)?;
        Ok(self.store().apply_transition(CallPatch::ViewDisposed {
            call_id: call_id.to_string(),
            participant_id: participant_id.to_string(),
            stream_id,
        }))
    }

    /// Record the camera the user picked.
    ///
    /// # Errors
    ///
    /// `ClientError::Disposed` after [`Self::dispose`].
    pub fn select_camera(&self, camera: VideoDeviceInfo) -> Result<TransitionOutcome, ClientError> {
        self.ensure_live()?;
        Ok(self.store().apply_transition(CallPatch::SelectedCameraChanged { camera: Some(camera) }))
    }

    /// Ask for device permissions and record the answer.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after [`Self::dispose`]
    /// - `ClientError::Sdk` if the request fails
    pub fn ask_device_permission(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<DeviceAccess, ClientError> {
        let device_manager = self.get_device_manager()?;
        let access = device_manager.ask_device_permission(audio, video)?;
        let _ = self.store().apply_transition(CallPatch::DeviceAccessChanged { access });
        Ok(access)
    }

    /// Number of SDK objects with a listener attached.
    pub fn tracked_count(&self) -> usize {
        self.bridge.tracked_count()
    }

    /// SDK objects with a listener attached.
    pub fn tracked_objects(&self) -> Vec<TrackedObject> {
        self.bridge.tracked_objects()
    }

    /// Detach from the SDK and drop all subscribers. The last snapshot stays
    /// readable.
    pub fn dispose(&self) {
        if self.store().is_disposed() {
            return;
        }
        self.bridge.dispose();
        self.store().dispose();
        self.agent.borrow_mut().take();
        self.device_manager.borrow_mut().take();
        tracing::info!("stateful call client disposed");
    }

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.store().is_disposed() {
            return Err(ClientError::Disposed);
        }
        Ok(())
    }

    fn check_stream(
        &self,
        call_id: &str,
        participant_id: &str,
        stream_id: StreamId,
    ) -> Result<(), ClientError> {
        let state = self.get_state();
        let call = state
            .call(call_id)
            .ok_or_else(|| ClientError::CallNotFound { call_id: call_id.to_string() })?;
        let participant = call.remote_participants.get(participant_id).ok_or_else(|| {
            ClientError::ParticipantNotFound {
                call_id: call_id.to_string(),
                participant_id: participant_id.to_string(),
            }
        })?;
        if !participant.video_streams.contains_key(&stream_id) {
            return Err(ClientError::StreamNotFound {
                participant_id: participant_id.to_string(),
                stream_id,
            });
        }
        Ok(())
    }
}
