//! Call-side event bridge.

use std::{
    collections::BTreeMap,
    rc::{Rc, Weak},
    sync::Arc,
};

use super::{TrackedObject, Tracker};
use crate::{
    config::CallClientConfig,
    env::Environment,
    sdk::{
        Call, CallAgent, CallAgentEvent, CallEvent, DeviceManager, DeviceManagerEvent,
        ParticipantEvent, RemoteParticipant, RemoteVideoStream, StreamEvent,
    },
    state::{
        CallClientState, CallState, DeviceManagerState, LocalParticipantState, ParticipantId,
        RemoteParticipantState, RemoteVideoStreamState, StreamId,
    },
    store::{StateStore, TransitionOutcome},
    transition::CallPatch,
};

struct Inner<E> {
    store: StateStore<CallClientState>,
    env: E,
    config: CallClientConfig,
    tracker: Tracker,
}

/// Projects a call agent, its calls and the device manager into a
/// [`StateStore`].
pub struct CallBridge<E> {
    inner: Rc<Inner<E>>,
}

impl<E: Environment> CallBridge<E> {
    /// Bridge writing into `store`.
    pub fn new(store: StateStore<CallClientState>, env: E, config: CallClientConfig) -> Self {
        Self { inner: Rc::new(Inner { store, env, config, tracker: Tracker::default() }) }
    }

    /// Store the bridge writes into.
    pub fn store(&self) -> &StateStore<CallClientState> {
        &self.inner.store
    }

    /// Start tracking the call agent and every call it already has.
    pub fn track_call_agent(&self, agent: Rc<dyn CallAgent>) {
        if self.inner.tracker.is_tracked(&TrackedObject::CallAgent) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let id = agent.on(Box::new(move |event: &CallAgentEvent| {
            if let Some(inner) = weak.upgrade() {
                on_call_agent_event(&inner, event);
            }
        }));
        self.inner.tracker.insert::<CallAgentEvent, _>(
            TrackedObject::CallAgent,
            Rc::clone(&agent),
            id,
        );

        for call in agent.calls() {
            track_call(&self.inner, call);
        }
    }

    /// Start tracking one call. Idempotent.
    pub fn track_call(&self, call: Rc<dyn Call>) {
        track_call(&self.inner, call);
    }

    /// Start tracking the device manager and project its current devices.
    pub fn track_device_manager(&self, device_manager: Rc<dyn DeviceManager>) {
        if self.inner.tracker.is_tracked(&TrackedObject::DeviceManager) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let id = device_manager.on(Box::new(move |event: &DeviceManagerEvent| {
            if let Some(inner) = weak.upgrade() {
                on_device_manager_event(&inner, event);
            }
        }));
        self.inner.tracker.insert::<DeviceManagerEvent, _>(
            TrackedObject::DeviceManager,
            Rc::clone(&device_manager),
            id,
        );

        let current = self.inner.store.get_state();
        let devices = DeviceManagerState {
            is_speaker_selection_available: device_manager.is_speaker_selection_available(),
            cameras: Arc::new(device_manager.cameras()),
            microphones: Arc::new(device_manager.microphones()),
            speakers: Arc::new(device_manager.speakers()),
            selected_camera: current.device_manager.selected_camera.clone(),
            selected_microphone: device_manager.selected_microphone(),
            selected_speaker: device_manager.selected_speaker(),
            device_access: current.device_manager.device_access,
        };
        let _ = apply(&self.inner, CallPatch::DeviceManagerAttached { devices });
    }

    /// Number of SDK objects with a listener attached.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// SDK objects with a listener attached.
    pub fn tracked_objects(&self) -> Vec<TrackedObject> {
        self.inner.tracker.objects()
    }

    /// Detach every listener.
    pub fn dispose(&self) {
        let detached = self.inner.tracker.clear();
        tracing::debug!(detached, "call bridge disposed");
    }
}

fn apply<E>(inner: &Inner<E>, patch: CallPatch) -> TransitionOutcome {
    inner.store.apply_transition(patch)
}

fn track_call<E: Environment>(inner: &Rc<Inner<E>>, call: Rc<dyn Call>) {
    let call_id = call.id();
    let key = TrackedObject::Call(call_id.clone());
    if inner.tracker.is_tracked(&key) {
        return;
    }

    let weak: Weak<Inner<E>> = Rc::downgrade(inner);
    let listener_call_id = call_id.clone();
    let id = call.on(Box::new(move |event: &CallEvent| {
        if let Some(inner) = weak.upgrade() {
            on_call_event(&inner, &listener_call_id, event);
        }
    }));
    inner.tracker.insert::<CallEvent, _>(key, Rc::clone(&call), id);

    let participants = call.remote_participants();
    let mut projected = CallState::new(call_id.clone(), call.state(), inner.env.now_millis());
    projected.local_participant = Arc::new(LocalParticipantState {
        display_name: None,
        is_muted: call.is_muted(),
        is_screen_sharing_on: call.is_screen_sharing_on(),
    });
    projected.is_recording_active = call.is_recording_active();
    projected.dominant_speakers = Arc::new(call.dominant_speakers());
    projected.remote_participants = Arc::new(
        participants
            .iter()
            .map(|p| (p.identifier(), Arc::new(project_participant(p.as_ref()))))
            .collect::<BTreeMap<_, _>>(),
    );
    let _ = apply(inner, CallPatch::CallAdded { call: projected });

    for participant in participants {
        track_participant(inner, &call_id, participant);
    }
}

fn track_participant<E: Environment>(
    inner: &Rc<Inner<E>>,
    call_id: &str,
    participant: Rc<dyn RemoteParticipant>,
) {
    let participant_id = participant.identifier();
    let key = TrackedObject::Participant(call_id.to_string(), participant_id.clone());
    if inner.tracker.is_tracked(&key) {
        return;
    }

    let weak = Rc::downgrade(inner);
    let (listener_call_id, listener_participant_id) = (call_id.to_string(), participant_id.clone());
    let id = participant.on(Box::new(move |event: &ParticipantEvent| {
        if let Some(inner) = weak.upgrade() {
            on_participant_event(&inner, &listener_call_id, &listener_participant_id, event);
        }
    }));
    inner.tracker.insert::<ParticipantEvent, _>(key, Rc::clone(&participant), id);

    for stream in participant.video_streams() {
        track_stream(inner, call_id, &participant_id, stream);
    }
}

fn track_stream<E: Environment>(
    inner: &Rc<Inner<E>>,
    call_id: &str,
    participant_id: &str,
    stream: Rc<dyn RemoteVideoStream>,
) {
    let stream_id = stream.id();
    let key = TrackedObject::Stream(call_id.to_string(), participant_id.to_string(), stream_id);
    if inner.tracker.is_tracked(&key) {
        return;
    }

    let weak = Rc::downgrade(inner);
    let (listener_call_id, listener_participant_id) =
        (call_id.to_string(), participant_id.to_string());
    let id = stream.on(Box::new(move |event: &StreamEvent| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let StreamEvent::AvailabilityChanged { is_available } = event;
        let _ = apply(
            &inner,
            CallPatch::StreamAvailabilityChanged {
                call_id: listener_call_id.clone(),
                participant_id: listener_participant_id.clone(),
                stream_id,
                is_available: *is_available,
            },
        );
    }));
    inner.tracker.insert::<StreamEvent, _>(key, stream, id);
}

fn project_stream(stream: &dyn RemoteVideoStream) -> RemoteVideoStreamState {
    RemoteVideoStreamState::new(stream.id(), stream.media_stream_type(), stream.is_available())
}

fn project_participant(participant: &dyn RemoteParticipant) -> RemoteParticipantState {
    RemoteParticipantState {
        identifier: participant.identifier(),
        display_name: participant.display_name(),
        state: participant.state(),
        is_muted: participant.is_muted(),
        is_speaking: participant.is_speaking(),
        video_streams: Arc::new(
            participant
                .video_streams()
                .iter()
                .map(|s| (s.id(), Arc::new(project_stream(s.as_ref()))))
                .collect(),
        ),
    }
}

fn on_call_agent_event<E: Environment>(inner: &Rc<Inner<E>>, event: &CallAgentEvent) {
    let CallAgentEvent::CallsUpdated { added, removed } = event;
    for call_id in removed {
        inner.tracker.remove_where(|o| o.within_call(call_id));
        let _ = apply(
            inner,
            CallPatch::CallEnded {
                call_id: call_id.clone(),
                end_time: inner.env.now_millis(),
                max_ended: inner.config.max_ended_calls,
            },
        );
    }
    for call in added {
        track_call(inner, Rc::clone(call));
    }
}

fn on_call_event<E: Environment>(inner: &Rc<Inner<E>>, call_id: &str, event: &CallEvent) {
    let call_id = call_id.to_string();
    let patch = match event {
        CallEvent::StateChanged(status) => {
            CallPatch::CallStatusChanged { call_id, status: *status }
        },
        CallEvent::MutedChanged(is_muted) => {
            CallPatch::LocalMutedChanged { call_id, is_muted: *is_muted }
        },
        CallEvent::ScreenShareChanged(on) => {
            CallPatch::ScreenShareChanged { call_id, is_screen_sharing_on: *on }
        },
        CallEvent::RecordingChanged(on) => {
            CallPatch::RecordingChanged { call_id, is_recording_active: *on }
        },
        CallEvent::DominantSpeakersChanged(speakers) => {
            CallPatch::DominantSpeakersChanged { call_id, speakers: speakers.clone() }
        },
        CallEvent::RemoteParticipantsUpdated { added, removed } => {
            for participant_id in removed {
                inner.tracker.remove_where(|o| o.within_participant(&call_id, participant_id));
            }
            let patch = CallPatch::ParticipantsUpdated {
                call_id: call_id.clone(),
                added: added.iter().map(|p| project_participant(p.as_ref())).collect(),
                removed: removed.clone(),
                max_ended: inner.config.max_ended_participants,
            };
            let joined: Vec<ParticipantId> = added.iter().map(|p| p.identifier()).collect();
            let weak = Rc::downgrade(inner);
            let settled_call_id = call_id.clone();
            let outcome = inner.store.apply_transition_then(patch, move |_| {
                if let Some(inner) = weak.upgrade() {
                    detach_absent_participants(&inner, &settled_call_id, &joined);
                }
            });
            // Only participants that made it into state keep listeners. A
            // deferred patch is checked again once it settles.
            let state = inner.store.get_state();
            for participant in added {
                let present = state.participant(&call_id, &participant.identifier()).is_some();
                if present || outcome == TransitionOutcome::Deferred {
                    track_participant(inner, &call_id, Rc::clone(participant));
                }
            }
            return;
        },
    };
    let _ = apply(inner, patch);
}

fn on_participant_event<E: Environment>(
    inner: &Rc<Inner<E>>,
    call_id: &str,
    participant_id: &str,
    event: &ParticipantEvent,
) {
    let (call_id, participant_id) = (call_id.to_string(), participant_id.to_string());
    let patch = match event {
        ParticipantEvent::StateChanged(status) => {
            CallPatch::ParticipantStatusChanged { call_id, participant_id, status: *status }
        },
        ParticipantEvent::MutedChanged(is_muted) => {
            CallPatch::ParticipantMutedChanged { call_id, participant_id, is_muted: *is_muted }
        },
        ParticipantEvent::SpeakingChanged(is_speaking) => {
            CallPatch::ParticipantSpeakingChanged {
                call_id,
                participant_id,
                is_speaking: *is_speaking,
            }
        },
        ParticipantEvent::DisplayNameChanged(display_name) => {
            CallPatch::ParticipantDisplayNameChanged {
                call_id,
                participant_id,
                display_name: display_name.clone(),
            }
        },
        ParticipantEvent::VideoStreamsUpdated { added, removed } => {
            for stream_id in removed {
                let key =
                    TrackedObject::Stream(call_id.clone(), participant_id.clone(), *stream_id);
                inner.tracker.remove_where(|o| *o == key);
            }
            let patch = CallPatch::StreamsUpdated {
                call_id: call_id.clone(),
                participant_id: participant_id.clone(),
                added: added.iter().map(|s| project_stream(s.as_ref())).collect(),
                removed: removed.clone(),
            };
            let stream_ids: Vec<StreamId> = added.iter().map(|s| s.id()).collect();
            let weak = Rc::downgrade(inner);
            let (settled_call_id, settled_participant_id) =
                (call_id.clone(), participant_id.clone());
            let outcome = inner.store.apply_transition_then(patch, move |_| {
                if let Some(inner) = weak.upgrade() {
                    detach_absent_streams(
                        &inner,
                        &settled_call_id,
                        &settled_participant_id,
                        &stream_ids,
                    );
                }
            });
            let state = inner.store.get_state();
            for stream in added {
                let present = state.stream(&call_id, &participant_id, stream.id()).is_some();
                if present || outcome == TransitionOutcome::Deferred {
                    track_stream(inner, &call_id, &participant_id, Rc::clone(stream));
                }
            }
            return;
        },
    };
    let _ = apply(inner, patch);
}

/// Drop listeners of participants that a settled roster patch did not
/// leave in state.
fn detach_absent_participants<E>(
    inner: &Inner<E>,
    call_id: &str,
    participant_ids: &[ParticipantId],
) {
    let state = inner.store.get_state();
    for participant_id in participant_ids {
        if state.participant(call_id, participant_id).is_none() {
            let detached =
                inner.tracker.remove_where(|o| o.within_participant(call_id, participant_id));
            if detached > 0 {
                tracing::debug!(
                    %call_id,
                    %participant_id,
                    detached,
                    "participant never reached state"
                );
            }
        }
    }
}

fn detach_absent_streams<E>(
    inner: &Inner<E>,
    call_id: &str,
    participant_id: &str,
    stream_ids: &[StreamId],
) {
    let state = inner.store.get_state();
    for stream_id in stream_ids {
        if state.stream(call_id, participant_id, *stream_id).is_none() {
            let key = TrackedObject::Stream(
                call_id.to_string(),
                participant_id.to_string(),
                *stream_id,
            );
            let _ = inner.tracker.remove_where(|o| *o == key);
        }
    }
}

fn on_device_manager_event<E>(inner: &Inner<E>, event: &DeviceManagerEvent) {
    let patch = match event {
        DeviceManagerEvent::VideoDevicesUpdated(cameras) => {
            CallPatch::CamerasUpdated { cameras: cameras.clone() }
        },
        DeviceManagerEvent::MicrophonesUpdated(microphones) => {
            CallPatch::MicrophonesUpdated { microphones: microphones.clone() }
        },
        DeviceManagerEvent::SpeakersUpdated(speakers) => {
            CallPatch::SpeakersUpdated { speakers: speakers.clone() }
        },
        DeviceManagerEvent::SelectedMicrophoneChanged(microphone) => {
            CallPatch::SelectedMicrophoneChanged { microphone: microphone.clone() }
        },
        DeviceManagerEvent::SelectedSpeakerChanged(speaker) => {
            CallPatch::SelectedSpeakerChanged { speaker: speaker.clone() }
        },
    };
    let _ = apply(inner, patch);
}
