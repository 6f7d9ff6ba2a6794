//! Call-side state slice.

use std::{collections::BTreeMap, sync::Arc};

use super::device::DeviceManagerState;

/// Call identifier.
pub type CallId = String;

/// Participant identifier (raw communication user id).
pub type ParticipantId = String;

/// Remote video stream identifier, unique within one participant.
pub type StreamId = u32;

/// Lifecycle state of a call or of a remote participant in it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallStatus {
    /// Not started.
    #[default]
    Idle,
    /// Outgoing connection in progress.
    Connecting,
    /// Ringing the remote side.
    Ringing,
    /// Media flowing.
    Connected,
    /// Put on hold.
    Hold,
    /// Waiting in the lobby for admission.
    InLobby,
    /// Early media before the call is answered.
    EarlyMedia,
    /// Terminal state.
    Disconnected,
}

/// Kind of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaStreamType {
    /// Camera video.
    Video,
    /// Screen share.
    ScreenSharing,
}

/// How a rendered view fits its container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ScalingMode {
    /// Fill the container, distorting the aspect ratio.
    Stretch,
    /// Fill the container, cropping the overflow.
    #[default]
    Crop,
    /// Fit inside the container, letterboxing the rest.
    Fit,
}

/// Options recorded for a rendered view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VideoViewState {
    /// Scaling mode the view was created with.
    pub scaling_mode: ScalingMode,
    /// Whether the view is mirrored.
    pub is_mirrored: bool,
}

/// Whether a stream currently has a view attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RenderStatus {
    /// No view.
    #[default]
    NotRendered,
    /// A view is attached.
    Rendered,
}

/// One remote video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVideoStreamState {
    /// Stream id.
    pub id: StreamId,
    /// Camera or screen share.
    pub media_stream_type: MediaStreamType,
    /// Whether the remote side is sending on this stream.
    pub is_available: bool,
    /// Attached view, if any.
    pub view: Option<VideoViewState>,
    /// Render status of the attached view.
    pub render_status: RenderStatus,
}

impl RemoteVideoStreamState {
    /// New stream with no view attached.
    pub fn new(id: StreamId, media_stream_type: MediaStreamType, is_available: bool) -> Self {
        Self {
            id,
            media_stream_type,
            is_available,
            view: None,
            render_status: RenderStatus::NotRendered,
        }
    }
}

/// One remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipantState {
    /// Participant identifier.
    pub identifier: ParticipantId,
    /// Display name, if the participant shared one.
    pub display_name: Option<String>,
    /// Participant lifecycle state.
    pub state: CallStatus,
    /// Whether the participant's microphone is muted.
    pub is_muted: bool,
    /// Whether the participant is currently speaking.
    pub is_speaking: bool,
    /// Video streams keyed by stream id.
    pub video_streams: Arc<BTreeMap<StreamId, Arc<RemoteVideoStreamState>>>,
}

impl RemoteParticipantState {
    /// Connected, unmuted, silent participant with no streams.
    pub fn new(identifier: impl Into<ParticipantId>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: None,
            state: CallStatus::Connected,
            is_muted: false,
            is_speaking: false,
            video_streams: Arc::default(),
        }
    }
}

/// Local participant's view of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalParticipantState {
    /// Local display name.
    pub display_name: Option<String>,
    /// Whether the local microphone is muted.
    pub is_muted: bool,
    /// Whether the local user is sharing their screen.
    pub is_screen_sharing_on: bool,
}

/// One active or ended call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallState {
    /// Call id.
    pub id: CallId,
    /// Call lifecycle state.
    pub state: CallStatus,
    /// Local participant.
    pub local_participant: Arc<LocalParticipantState>,
    /// Remote participants keyed by identifier.
    pub remote_participants: Arc<BTreeMap<ParticipantId, Arc<RemoteParticipantState>>>,
    /// Participants that left, oldest first, bounded by configuration.
    pub remote_participants_ended: Arc<Vec<Arc<RemoteParticipantState>>>,
    /// Dominant speakers, most dominant first.
    pub dominant_speakers: Arc<Vec<ParticipantId>>,
    /// Whether the call is being recorded.
    pub is_recording_active: bool,
    /// When the call entered the state, in milliseconds.
    pub start_time: u64,
    /// When the call ended, in milliseconds.
    pub end_time: Option<u64>,
}

impl CallState {
    /// New call with no participants.
    pub fn new(id: impl Into<CallId>, state: CallStatus, start_time: u64) -> Self {
        Self {
            id: id.into(),
            state,
            local_participant: Arc::default(),
            remote_participants: Arc::default(),
            remote_participants_ended: Arc::default(),
            dominant_speakers: Arc::default(),
            is_recording_active: false,
            start_time,
            end_time: None,
        }
    }
}

/// Root of the call-side state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallClientState {
    /// Local user id.
    pub user_id: ParticipantId,
    /// Active calls keyed by id.
    pub calls: Arc<BTreeMap<CallId, Arc<CallState>>>,
    /// Ended calls, oldest first, bounded by configuration.
    pub calls_ended: Arc<Vec<Arc<CallState>>>,
    /// Device enumeration and selection.
    pub device_manager: Arc<DeviceManagerState>,
}

impl CallClientState {
    /// Empty state for `user_id`.
    pub fn new(user_id: impl Into<ParticipantId>) -> Self {
        Self { user_id: user_id.into(), ..Self::default() }
    }

    /// Look up an active call.
    pub fn call(&self, call_id: &str) -> Option<&Arc<CallState>> {
        self.calls.get(call_id)
    }

    /// Look up a remote participant of an active call.
    pub fn participant(
        &self,
        call_id: &str,
        participant_id: &str,
    ) -> Option<&Arc<RemoteParticipantState>> {
        self.calls.get(call_id)?.remote_participants.get(participant_id)
    }

    /// Look up a remote video stream.
    pub fn stream(
        &self,
        call_id: &str,
        participant_id: &str,
        stream_id: StreamId,
    ) -> Option<&Arc<RemoteVideoStreamState>> {
        self.participant(call_id, participant_id)?.video_streams.get(&stream_id)
    }
}
