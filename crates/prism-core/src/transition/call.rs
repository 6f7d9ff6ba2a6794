//! Call-side patches.

use std::sync::Arc;

use super::push_bounded;
use crate::{
    state::{
        AudioDeviceInfo, CallClientState, CallId, CallState, CallStatus, DeviceAccess,
        DeviceManagerState, LocalParticipantState, ParticipantId, RemoteParticipantState,
        RemoteVideoStreamState, RenderStatus, StreamId, VideoDeviceInfo, VideoViewState,
    },
    store::Transition,
};

/// A targeted change to [`CallClientState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPatch {
    /// A call appeared on the call agent.
    CallAdded {
        /// Initial projection of the call.
        call: CallState,
    },
    /// A call left the call agent; moves it to `calls_ended`.
    CallEnded {
        /// Call that ended.
        call_id: CallId,
        /// End timestamp in milliseconds.
        end_time: u64,
        /// History bound for `calls_ended`.
        max_ended: usize,
    },
    /// Call lifecycle state changed.
    CallStatusChanged {
        /// Target call.
        call_id: CallId,
        /// New state.
        status: CallStatus,
    },
    /// Local microphone mute toggled.
    LocalMutedChanged {
        /// Target call.
        call_id: CallId,
        /// New mute flag.
        is_muted: bool,
    },
    /// Local screen share toggled.
    ScreenShareChanged {
        /// Target call.
        call_id: CallId,
        /// New screen share flag.
        is_screen_sharing_on: bool,
    },
    /// Recording started or stopped.
    RecordingChanged {
        /// Target call.
        call_id: CallId,
        /// New recording flag.
        is_recording_active: bool,
    },
    /// Dominant speaker list replaced.
    DominantSpeakersChanged {
        /// Target call.
        call_id: CallId,
        /// Speakers, most dominant first.
        speakers: Vec<ParticipantId>,
    },
    /// Remote participants joined and/or left.
    ParticipantsUpdated {
        /// Target call.
        call_id: CallId,
        /// Participants that joined.
        added: Vec<RemoteParticipantState>,
        /// Participants that left; moved to `remote_participants_ended`.
        removed: Vec<ParticipantId>,
        /// History bound for `remote_participants_ended`.
        max_ended: usize,
    },
    /// Remote participant lifecycle state changed.
    ParticipantStatusChanged {
        /// Target call.
        call_id: CallId,
        /// Target participant.
        participant_id: ParticipantId,
        /// New state.
        status: CallStatus,
    },
    /// Remote participant mute toggled.
    ParticipantMutedChanged {
        /// Target call.
        call_id: CallId,
        /// Target participant.
        participant_id: ParticipantId,
        /// New mute flag.
        is_muted: bool,
    },
    /// Remote participant started or stopped speaking.
    ParticipantSpeakingChanged {
        /// Target call.
        call_id: CallId,
        /// Target participant.
        participant_id: ParticipantId,
        /// New speaking flag.
        is_speaking: bool,
    },
    /// Remote participant display name changed.
    ParticipantDisplayNameChanged {
        /// Target call.
        call_id: CallId,
        /// Target participant.
        participant_id: ParticipantId,
        /// New display name.
        display_name: Option<String>,
    },
    /// Remote participant streams added and/or removed.
    StreamsUpdated {
        /// Target call.
        call_id: CallId,
        /// Owner of the streams.
        participant_id: ParticipantId,
        /// Streams that appeared.
        added: Vec<RemoteVideoStreamState>,
        /// Streams that disappeared.
        removed: Vec<StreamId>,
    },
    /// Stream availability changed. Unavailable streams lose their view.
    StreamAvailabilityChanged {
        /// Target call.
        call_id: CallId,
        /// Owner of the stream.
        participant_id: ParticipantId,
        /// Target stream.
        stream_id: StreamId,
        /// New availability.
        is_available: bool,
    },
    /// A view was attached to a stream.
    ViewCreated {
        /// Target call.
        call_id: CallId,
        /// Owner of the stream.
        participant_id: ParticipantId,
        /// Target stream.
        stream_id: StreamId,
        /// View options.
        view: VideoViewState,
    },
    /// A stream's view was released.
    ViewDisposed {
        /// Target call.
        call_id: CallId,
        /// Owner of the stream.
        participant_id: ParticipantId,
        /// Target stream.
        stream_id: StreamId,
    },
    /// Device manager obtained; replaces the whole device slice.
    DeviceManagerAttached {
        /// Initial device projection.
        devices: DeviceManagerState,
    },
    /// Camera list changed.
    CamerasUpdated {
        /// Current cameras.
        cameras: Vec<VideoDeviceInfo>,
    },
    /// Microphone list changed.
    MicrophonesUpdated {
        /// Current microphones.
        microphones: Vec<AudioDeviceInfo>,
    },
    /// Speaker list changed.
    SpeakersUpdated {
        /// Current speakers.
        speakers: Vec<AudioDeviceInfo>,
    },
    /// Camera selected by the user.
    SelectedCameraChanged {
        /// Selected camera.
        camera: Option<VideoDeviceInfo>,
    },
    /// Microphone selection changed.
    SelectedMicrophoneChanged {
        /// Selected microphone.
        microphone: Option<AudioDeviceInfo>,
    },
    /// Speaker selection changed.
    SelectedSpeakerChanged {
        /// Selected speaker.
        speaker: Option<AudioDeviceInfo>,
    },
    /// Permission request answered.
    DeviceAccessChanged {
        /// Granted permissions.
        access: DeviceAccess,
    },
}

impl Transition<CallClientState> for CallPatch {
    fn kind(&self) -> &'static str {
        match self {
            Self::CallAdded { .. } => "call_added",
            Self::CallEnded { .. } => "call_ended",
            Self::CallStatusChanged { .. } => "call_status_changed",
            Self::LocalMutedChanged { .. } => "local_muted_changed",
            Self::ScreenShareChanged { .. } => "screen_share_changed",
            Self::RecordingChanged { .. } => "recording_changed",
            Self::DominantSpeakersChanged { .. } => "dominant_speakers_changed",
            Self::ParticipantsUpdated { .. } => "participants_updated",
            Self::ParticipantStatusChanged { .. } => "participant_status_changed",
            Self::ParticipantMutedChanged { .. } => "participant_muted_changed",
            Self::ParticipantSpeakingChanged { .. } => "participant_speaking_changed",
            Self::ParticipantDisplayNameChanged { .. } => "participant_display_name_changed",
            Self::StreamsUpdated { .. } => "streams_updated",
            Self::StreamAvailabilityChanged { .. } => "stream_availability_changed",
            Self::ViewCreated { .. } => "view_created",
            Self::ViewDisposed { .. } => "view_disposed",
            Self::DeviceManagerAttached { .. } => "device_manager_attached",
            Self::CamerasUpdated { .. } => "cameras_updated",
            Self::MicrophonesUpdated { .. } => "microphones_updated",
            Self::SpeakersUpdated { .. } => "speakers_updated",
            Self::SelectedCameraChanged { .. } => "selected_camera_changed",
            Self::SelectedMicrophoneChanged { .. } => "selected_microphone_changed",
            Self::SelectedSpeakerChanged { .. } => "selected_speaker_changed",
            Self::DeviceAccessChanged { .. } => "device_access_changed",
        }
    }

    fn apply(&self, state: &CallClientState) -> Option<CallClientState> {
        match self {
            Self::CallAdded { call } => {
                if state.calls.contains_key(&call.id) {
                    return None;
                }
                let mut calls = (*state.calls).clone();
                calls.insert(call.id.clone(), Arc::new(call.clone()));
                Some(CallClientState { calls: Arc::new(calls), ..state.clone() })
            },
            Self::CallEnded { call_id, end_time, max_ended } => {
                let call = state.calls.get(call_id)?;
                let ended = CallState {
                    state: CallStatus::Disconnected,
                    end_time: Some(*end_time),
                    ..(**call).clone()
                };
                let mut calls = (*state.calls).clone();
                calls.remove(call_id);
                Some(CallClientState {
                    calls: Arc::new(calls),
                    calls_ended: push_bounded(&state.calls_ended, [Arc::new(ended)], *max_ended),
                    ..state.clone()
                })
            },
            Self::CallStatusChanged { call_id, status } => update_call(state, call_id, |call| {
                (call.state != *status).then(|| CallState { state: *status, ..call.clone() })
            }),
            Self::LocalMutedChanged { call_id, is_muted } => update_call(state, call_id, |call| {
                update_local(call, |local| {
                    (local.is_muted != *is_muted)
                        .then(|| LocalParticipantState { is_muted: *is_muted, ..local.clone() })
                })
            }),
            Self::ScreenShareChanged { call_id, is_screen_sharing_on } => {
                update_call(state, call_id, |call| {
                    update_local(call, |local| {
                        (local.is_screen_sharing_on != *is_screen_sharing_on).then(|| {
                            LocalParticipantState {
                                is_screen_sharing_on: *is_screen_sharing_on,
                                ..local.clone()
                            }
                        })
                    })
                })
            },
            Self::RecordingChanged { call_id, is_recording_active } => {
                update_call(state, call_id, |call| {
                    (call.is_recording_active != *is_recording_active).then(|| CallState {
                        is_recording_active: *is_recording_active,
                        ..call.clone()
                    })
                })
            },
            Self::DominantSpeakersChanged { call_id, speakers } => {
                update_call(state, call_id, |call| {
                    (*call.dominant_speakers != *speakers).then(|| CallState {
                        dominant_speakers: Arc::new(speakers.clone()),
                        ..call.clone()
                    })
                })
            },
            Self::ParticipantsUpdated { call_id, added, removed, max_ended } => {
                update_call(state, call_id, |call| {
                    let mut participants = (*call.remote_participants).clone();
                    let mut changed = false;
                    for participant in added {
                        if !participants.contains_key(&participant.identifier) {
                            let id = participant.identifier.clone();
                            participants.insert(id, Arc::new(participant.clone()));
                            changed = true;
                        }
                    }
                    let mut departed = Vec::new();
                    for id in removed {
                        if let Some(participant) = participants.remove(id) {
                            departed.push(participant);
                        }
                    }
                    if !changed && departed.is_empty() {
                        return None;
                    }
                    let remote_participants_ended = if departed.is_empty() {
                        Arc::clone(&call.remote_participants_ended)
                    } else {
                        push_bounded(&call.remote_participants_ended, departed, *max_ended)
                    };
                    Some(CallState {
                        remote_participants: Arc::new(participants),
                        remote_participants_ended,
                        ..call.clone()
                    })
                })
            },
            Self::ParticipantStatusChanged { call_id, participant_id, status } => {
                update_participant(state, call_id, participant_id, |p| {
                    (p.state != *status)
                        .then(|| RemoteParticipantState { state: *status, ..p.clone() })
                })
            },
            Self::ParticipantMutedChanged { call_id, participant_id, is_muted } => {
                update_participant(state, call_id, participant_id, |p| {
                    (p.is_muted != *is_muted)
                        .then(|| RemoteParticipantState { is_muted: *is_muted, ..p.clone() })
                })
            },
            Self::ParticipantSpeakingChanged { call_id, participant_id, is_speaking } => {
                update_participant(state, call_id, participant_id, |p| {
                    (p.is_speaking != *is_speaking)
                        .then(|| RemoteParticipantState { is_speaking: *is_speaking, ..p.clone() })
                })
            },
            Self::ParticipantDisplayNameChanged { call_id, participant_id, display_name } => {
                update_participant(state, call_id, participant_id, |p| {
                    (p.display_name != *display_name).then(|| RemoteParticipantState {
                        display_name: display_name.clone(),
                        ..p.clone()
                    })
                })
            },
            Self::StreamsUpdated { call_id, participant_id, added, removed } => {
                update_participant(state, call_id, participant_id, |p| {
                    let mut streams = (*p.video_streams).clone();
                    let mut changed = false;
                    for stream in added {
                        if !streams.contains_key(&stream.id) {
                            streams.insert(stream.id, Arc::new(stream.clone()));
                            changed = true;
                        }
                    }
                    for id in removed {
                        changed |= streams.remove(id).is_some();
                    }
                    changed.then(|| RemoteParticipantState {
                        video_streams: Arc::new(streams),
                        ..p.clone()
                    })
                })
            },
            Self::StreamAvailabilityChanged {
                call_id,
                participant_id,
                stream_id,
                is_available,
            } => {
                update_stream(state, call_id, participant_id, *stream_id, |stream| {
                    if stream.is_available == *is_available {
                        return None;
                    }
                    let (view, render_status) = if *is_available {
                        (stream.view, stream.render_status)
                    } else {
                        (None, RenderStatus::NotRendered)
                    };
                    Some(RemoteVideoStreamState {
                        is_available: *is_available,
                        view,
                        render_status,
                        ..stream.clone()
                    })
                })
            },
            Self::ViewCreated { call_id, participant_id, stream_id, view } => {
                update_stream(state, call_id, participant_id, *stream_id, |stream| {
                    let rendered = stream.view == Some(*view)
                        && stream.render_status == RenderStatus::Rendered;
                    (!rendered).then(|| RemoteVideoStreamState {
                        view: Some(*view),
                        render_status: RenderStatus::Rendered,
                        ..stream.clone()
                    })
                })
            },
            Self::ViewDisposed { call_id, participant_id, stream_id } => {
                update_stream(state, call_id, participant_id, *stream_id, |stream| {
                    stream.view.is_some().then(|| RemoteVideoStreamState {
                        view: None,
                        render_status: RenderStatus::NotRendered,
                        ..stream.clone()
                    })
                })
            },
            Self::DeviceManagerAttached { devices } => update_devices(state, |current| {
                (current != devices).then(|| devices.clone())
            }),
            Self::CamerasUpdated { cameras } => update_devices(state, |dm| {
                (*dm.cameras != *cameras).then(|| DeviceManagerState {
                    cameras: Arc::new(cameras.clone()),
                    ..dm.clone()
                })
            }),
            Self::MicrophonesUpdated { microphones } => update_devices(state, |dm| {
                (*dm.microphones != *microphones).then(|| DeviceManagerState {
                    microphones: Arc::new(microphones.clone()),
                    ..dm.clone()
                })
            }),
            Self::SpeakersUpdated { speakers } => update_devices(state, |dm| {
                (*dm.speakers != *speakers).then(|| DeviceManagerState {
                    speakers: Arc::new(speakers.clone()),
                    ..dm.clone()
                })
            }),
            Self::SelectedCameraChanged { camera } => update_devices(state, |dm| {
                (dm.selected_camera != *camera)
                    .then(|| DeviceManagerState { selected_camera: camera.clone(), ..dm.clone() })
            }),
            Self::SelectedMicrophoneChanged { microphone } => update_devices(state, |dm| {
                (dm.selected_microphone != *microphone).then(|| DeviceManagerState {
                    selected_microphone: microphone.clone(),
                    ..dm.clone()
                })
            }),
            Self::SelectedSpeakerChanged { speaker } => update_devices(state, |dm| {
                (dm.selected_speaker != *speaker)
                    .then(|| DeviceManagerState { selected_speaker: speaker.clone(), ..dm.clone() })
            }),
            Self::DeviceAccessChanged { access } => update_devices(state, |dm| {
                (dm.device_access != Some(*access))
                    .then(|| DeviceManagerState { device_access: Some(*access), ..dm.clone() })
            }),
        }
    }
}

fn update_call(
    state: &CallClientState,
    call_id: &str,
    f: impl FnOnce(&CallState) -> Option<CallState>,
) -> Option<CallClientState> {
    let next = f(&**state.calls.get(call_id)?)?;
    let mut calls = (*state.calls).clone();
    calls.insert(call_id.to_string(), Arc::new(next));
    Some(CallClientState { calls: Arc::new(calls), ..state.clone() })
}

fn update_local(
    call: &CallState,
    f: impl FnOnce(&LocalParticipantState) -> Option<LocalParticipantState>,
) -> Option<CallState> {
    let next = f(&call.local_participant)?;
    Some(CallState { local_participant: Arc::new(next), ..call.clone() })
}

fn update_participant(
    state: &CallClientState,
    call_id: &str,
    participant_id: &str,
    f: impl FnOnce(&RemoteParticipantState) -> Option<RemoteParticipantState>,
) -> Option<CallClientState> {
    update_call(state, call_id, |call| {
        let next = f(&**call.remote_participants.get(participant_id)?)?;
        let mut participants = (*call.remote_participants).clone();
        participants.insert(participant_id.to_string(), Arc::new(next));
        Some(CallState { remote_participants: Arc::new(participants), ..call.clone() })
    })
}

fn update_stream(
    state: &CallClientState,
    call_id: &str,
    participant_id: &str,
    stream_id: StreamId,
    f: impl FnOnce(&RemoteVideoStreamState) -> Option<RemoteVideoStreamState>,
) -> Option<CallClientState> {
    update_participant(state, call_id, participant_id, |participant| {
        let next = f(&**participant.video_streams.get(&stream_id)?)?;
        let mut streams = (*participant.video_streams).clone();
        streams.insert(stream_id, Arc::new(next));
        Some(RemoteParticipantState { video_streams: Arc::new(streams), ..participant.clone() })
    })
}

fn update_devices(
    state: &CallClientState,
    f: impl FnOnce(&DeviceManagerState) -> Option<DeviceManagerState>,
) -> Option<CallClientState> {
    let next = f(&state.device_manager)?;
    Some(CallClientState { device_manager: Arc::new(next), ..state.clone() })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::{MediaStreamType, ScalingMode};

    fn call_with(participants: &[&str]) -> CallClientState {
        let mut call = CallState::new("c1", CallStatus::Connected, 100);
        call.remote_participants = Arc::new(
            participants
                .iter()
                .map(|id| {
                    let mut p = RemoteParticipantState::new(*id);
                    let camera = RemoteVideoStreamState::new(1, MediaStreamType::Video, true);
                    p.video_streams = Arc::new([(1, Arc::new(camera))].into());
                    ((*id).to_string(), Arc::new(p))
                })
                .collect(),
        );
        CallPatch::CallAdded { call }.apply(&CallClientState::new("me")).unwrap()
    }

    fn muted(participant_id: &str, is_muted: bool) -> CallPatch {
        CallPatch::ParticipantMutedChanged {
            call_id: "c1".to_string(),
            participant_id: participant_id.to_string(),
            is_muted,
        }
    }

    #[test]
    fn mute_replaces_only_target_path() {
        let before = call_with(&["p1", "p2"]);

        let after = muted("p1", true).apply(&before).unwrap();

        let p1_before = before.participant("c1", "p1").unwrap();
        let p1_after = after.participant("c1", "p1").unwrap();
        assert!(!Arc::ptr_eq(p1_before, p1_after));
        assert!(p1_after.is_muted);
        assert!(Arc::ptr_eq(
            before.participant("c1", "p2").unwrap(),
            after.participant("c1", "p2").unwrap()
        ));
        assert!(Arc::ptr_eq(&p1_before.video_streams, &p1_after.video_streams));
        assert!(Arc::ptr_eq(&before.device_manager, &after.device_manager));
    }

    #[test]
    fn stale_or_redundant_patches_are_no_ops() {
        let state = call_with(&["p1"]);

        assert!(muted("ghost", true).apply(&state).is_none());
        assert!(muted("p1", false).apply(&state).is_none());
        let wrong_call =
            CallPatch::CallStatusChanged { call_id: "c9".to_string(), status: CallStatus::Hold };
        assert!(wrong_call.apply(&state).is_none());
    }

    #[test]
    fn removed_participants_move_to_bounded_history() {
        let mut state = call_with(&["p1", "p2", "p3"]);
        for id in ["p1", "p2", "p3"] {
            state = CallPatch::ParticipantsUpdated {
                call_id: "c1".to_string(),
                added: Vec::new(),
                removed: vec![id.to_string()],
                max_ended: 2,
            }
            .apply(&state)
            .unwrap();
        }

        let call = state.call("c1").unwrap();
        assert!(call.remote_participants.is_empty());
        let ended: Vec<_> =
            call.remote_participants_ended.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ended, vec!["p2", "p3"]);
    }

    #[test]
    fn unavailable_stream_drops_view() {
        let state = call_with(&["p1"]);
        let state = CallPatch::ViewCreated {
            call_id: "c1".to_string(),
            participant_id: "p1".to_string(),
            stream_id: 1,
            view: VideoViewState { scaling_mode: ScalingMode::Fit, is_mirrored: false },
        }
        .apply(&state)
        .unwrap();
        assert_eq!(state.stream("c1", "p1", 1).unwrap().render_status, RenderStatus::Rendered);

        let state = CallPatch::StreamAvailabilityChanged {
            call_id: "c1".to_string(),
            participant_id: "p1".to_string(),
            stream_id: 1,
            is_available: false,
        }
        .apply(&state)
        .unwrap();

        let stream = state.stream("c1", "p1", 1).unwrap();
        assert!(stream.view.is_none());
        assert_eq!(stream.render_status, RenderStatus::NotRendered);
    }

    #[test]
    fn ended_call_moves_to_history() {
        let state = call_with(&["p1"]);
        let state = CallPatch::CallEnded { call_id: "c1".to_string(), end_time: 500, max_ended: 10 }
            .apply(&state)
            .unwrap();

        assert!(state.calls.is_empty());
        let ended = &state.calls_ended[0];
        assert_eq!(ended.state, CallStatus::Disconnected);
        assert_eq!(ended.end_time, Some(500));
        assert_eq!(ended.remote_participants.len(), 1);
    }

    #[test]
    fn device_selection_is_idempotent() {
        let camera = VideoDeviceInfo {
            id: "cam".to_string(),
            name: "Camera".to_string(),
            device_type: crate::state::VideoDeviceType::Internal,
        };
        let patch = CallPatch::SelectedCameraChanged { camera: Some(camera) };

        let state = patch.apply(&CallClientState::new("me")).unwrap();
        assert!(patch.apply(&state).is_none());
    }
}
