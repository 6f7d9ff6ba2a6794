//! Upstream SDK contract.
//!
//! The calling and chat SDKs are live object graphs: a call agent owns calls,
//! a call owns remote participants, a participant owns video streams. Each
//! object reports its own changes through an [`EventEmitter`]. The bridge
//! subscribes to every object it tracks and unsubscribes when the object
//! leaves the state tree.
//!
//! Objects are shared as `Rc<dyn Trait>` and mutate internally; every method
//! takes `&self`. Events are delivered synchronously on the thread that owns
//! the SDK.

use std::{fmt, rc::Rc};

use crate::{
    error::SdkError,
    state::{
        AudioDeviceInfo, CallId, CallStatus, ChatMessageKind, ChatMessageWithStatus,
        ChatParticipant, DeviceAccess, MediaStreamType, MessageId, MessageStatus, ParticipantId,
        StreamId, ThreadId, VideoDeviceInfo,
    },
};

/// Handle for one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Boxed event callback.
pub type Listener<E> = Box<dyn FnMut(&E)>;

/// Per-object event subscription.
pub trait EventEmitter<E> {
    /// Register a listener.
    fn on(&self, listener: Listener<E>) -> ListenerId;

    /// Unregister a listener. Returns false if it was not registered.
    fn off(&self, id: ListenerId) -> bool;
}

/// Events from a remote video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The remote side started or stopped sending.
    AvailabilityChanged {
        /// New availability.
        is_available: bool,
    },
}

/// A remote participant's video stream.
pub trait RemoteVideoStream: EventEmitter<StreamEvent> {
    /// Stream id, unique within its participant.
    fn id(&self) -> StreamId;

    /// Camera or screen share.
    fn media_stream_type(&self) -> MediaStreamType;

    /// Whether the remote side is sending.
    fn is_available(&self) -> bool;
}

/// Events from a remote participant.
#[derive(Clone)]
pub enum ParticipantEvent {
    /// Lifecycle state changed.
    StateChanged(CallStatus),
    /// Microphone muted or unmuted.
    MutedChanged(bool),
    /// Started or stopped speaking.
    SpeakingChanged(bool),
    /// Display name changed.
    DisplayNameChanged(Option<String>),
    /// Streams appeared or disappeared.
    VideoStreamsUpdated {
        /// New streams.
        added: Vec<Rc<dyn RemoteVideoStream>>,
        /// Ids of removed streams.
        removed: Vec<StreamId>,
    },
}

impl fmt::Debug for ParticipantEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
            Self::MutedChanged(muted) => f.debug_tuple("MutedChanged").field(muted).finish(),
            Self::SpeakingChanged(speaking) => {
                f.debug_tuple("SpeakingChanged").field(speaking).finish()
            },
            Self::DisplayNameChanged(name) => {
                f.debug_tuple("DisplayNameChanged").field(name).finish()
            },
            Self::VideoStreamsUpdated { added, removed } => f
                .debug_struct("VideoStreamsUpdated")
                .field("added", &added.iter().map(|s| s.id()).collect::<Vec<_>>())
                .field("removed", removed)
                .finish(),
        }
    }
}

/// A remote participant in a call.
pub trait RemoteParticipant: EventEmitter<ParticipantEvent> {
    /// Participant identifier.
    fn identifier(&self) -> ParticipantId;

    /// Display name, if shared.
    fn display_name(&self) -> Option<String>;

    /// Lifecycle state.
    fn state(&self) -> CallStatus;

    /// Microphone muted.
    fn is_muted(&self) -> bool;

    /// Currently speaking.
    fn is_speaking(&self) -> bool;

    /// Current video streams.
    fn video_streams(&self) -> Vec<Rc<dyn RemoteVideoStream>>;
}

/// Events from a call.
#[derive(Clone)]
pub enum CallEvent {
    /// Lifecycle state changed.
    StateChanged(CallStatus),
    /// Local microphone muted or unmuted.
    MutedChanged(bool),
    /// Local screen share toggled.
    ScreenShareChanged(bool),
    /// Recording toggled.
    RecordingChanged(bool),
    /// Dominant speakers changed, most dominant first.
    DominantSpeakersChanged(Vec<ParticipantId>),
    /// Participants joined or left.
    RemoteParticipantsUpdated {
        /// Joined participants.
        added: Vec<Rc<dyn RemoteParticipant>>,
        /// Ids of departed participants.
        removed: Vec<ParticipantId>,
    },
}

impl fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
            Self::MutedChanged(muted) => f.debug_tuple("MutedChanged").field(muted).finish(),
            Self::ScreenShareChanged(on) => f.debug_tuple("ScreenShareChanged").field(on).finish(),
            Self::RecordingChanged(on) => f.debug_tuple("RecordingChanged").field(on).finish(),
            Self::DominantSpeakersChanged(ids) => {
                f.debug_tuple("DominantSpeakersChanged").field(ids).finish()
            },
            Self::RemoteParticipantsUpdated { added, removed } => f
                .debug_struct("RemoteParticipantsUpdated")
                .field("added", &added.iter().map(|p| p.identifier()).collect::<Vec<_>>())
                .field("removed", removed)
                .finish(),
        }
    }
}

/// A call.
pub trait Call: EventEmitter<CallEvent> {
    /// Call id.
    fn id(&self) -> CallId;

    /// Lifecycle state.
    fn state(&self) -> CallStatus;

    /// Local microphone muted.
    fn is_muted(&self) -> bool;

    /// Local screen share on.
    fn is_screen_sharing_on(&self) -> bool;

    /// Recording active.
    fn is_recording_active(&self) -> bool;

    /// Dominant speakers, most dominant first.
    fn dominant_speakers(&self) -> Vec<ParticipantId>;

    /// Current remote participants.
    fn remote_participants(&self) -> Vec<Rc<dyn RemoteParticipant>>;
}

/// Events from a call agent.
#[derive(Clone)]
pub enum CallAgentEvent {
    /// Calls started or ended.
    CallsUpdated {
        /// New calls.
        added: Vec<Rc<dyn Call>>,
        /// Ids of ended calls.
        removed: Vec<CallId>,
    },
}

impl fmt::Debug for CallAgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallsUpdated { added, removed } => f
                .debug_struct("CallsUpdated")
                .field("added", &added.iter().map(|c| c.id()).collect::<Vec<_>>())
                .field("removed", removed)
                .finish(),
        }
    }
}

/// Owner of a user's calls.
pub trait CallAgent: EventEmitter<CallAgentEvent> {
    /// Current calls.
    fn calls(&self) -> Vec<Rc<dyn Call>>;

    /// Start an outgoing call.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn start_call(&self, participants: &[ParticipantId]) -> Result<Rc<dyn Call>, SdkError>;
}

/// Events from the device manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceManagerEvent {
    /// Camera list changed.
    VideoDevicesUpdated(Vec<VideoDeviceInfo>),
    /// Microphone list changed.
    MicrophonesUpdated(Vec<AudioDeviceInfo>),
    /// Speaker list changed.
    SpeakersUpdated(Vec<AudioDeviceInfo>),
    /// Selected microphone changed.
    SelectedMicrophoneChanged(Option<AudioDeviceInfo>),
    /// Selected speaker changed.
    SelectedSpeakerChanged(Option<AudioDeviceInfo>),
}

/// Device enumeration and permissions.
pub trait DeviceManager: EventEmitter<DeviceManagerEvent> {
    /// Cameras.
    fn cameras(&self) -> Vec<VideoDeviceInfo>;

    /// Microphones.
    fn microphones(&self) -> Vec<AudioDeviceInfo>;

    /// Speakers.
    fn speakers(&self) -> Vec<AudioDeviceInfo>;

    /// Selected microphone.
    fn selected_microphone(&self) -> Option<AudioDeviceInfo>;

    /// Selected speaker.
    fn selected_speaker(&self) -> Option<AudioDeviceInfo>;

    /// Whether the output device can be chosen.
    fn is_speaker_selection_available(&self) -> bool;

    /// Ask the user for device access.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn ask_device_permission(&self, audio: bool, video: bool) -> Result<DeviceAccess, SdkError>;
}

/// Entry point of the calling SDK.
pub trait CallClient {
    /// Local user id.
    fn user_id(&self) -> ParticipantId;

    /// Create the call agent.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn create_call_agent(
        &self,
        display_name: Option<String>,
    ) -> Result<Rc<dyn CallAgent>, SdkError>;

    /// Obtain the device manager.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn get_device_manager(&self) -> Result<Rc<dyn DeviceManager>, SdkError>;
}

/// A message as the chat service reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Service id.
    pub id: MessageId,
    /// Service sequence number.
    pub sequence_id: u64,
    /// Creation time in milliseconds.
    pub created_on: u64,
    /// Author.
    pub sender_id: Option<ParticipantId>,
    /// Author display name.
    pub sender_display_name: Option<String>,
    /// Content kind.
    pub kind: ChatMessageKind,
    /// Body.
    pub content: String,
    /// Client id the sender attached, if any.
    pub client_message_id: Option<String>,
    /// Last edit time.
    pub edited_on: Option<u64>,
    /// Deletion time.
    pub deleted_on: Option<u64>,
}

impl From<ChatMessage> for ChatMessageWithStatus {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            client_message_id: message.client_message_id,
            sequence_id: Some(message.sequence_id),
            created_on: message.created_on,
            sender_id: message.sender_id,
            sender_display_name: message.sender_display_name,
            kind: message.kind,
            content: message.content,
            status: MessageStatus::Delivered,
            edited_on: message.edited_on,
            deleted_on: message.deleted_on,
        }
    }
}

/// Real-time chat notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Thread created or joined.
    ThreadCreated {
        /// Thread.
        thread_id: ThreadId,
        /// Initial topic.
        topic: Option<String>,
    },
    /// Thread deleted.
    ThreadDeleted {
        /// Thread.
        thread_id: ThreadId,
    },
    /// Thread properties changed.
    ThreadPropertiesUpdated {
        /// Thread.
        thread_id: ThreadId,
        /// New topic.
        topic: Option<String>,
    },
    /// Message received.
    MessageReceived {
        /// Thread.
        thread_id: ThreadId,
        /// Message.
        message: ChatMessage,
    },
    /// Message edited.
    MessageEdited {
        /// Thread.
        thread_id: ThreadId,
        /// Message.
        message_id: MessageId,
        /// New content.
        content: String,
        /// Edit time.
        edited_on: u64,
    },
    /// Message deleted.
    MessageDeleted {
        /// Thread.
        thread_id: ThreadId,
        /// Message.
        message_id: MessageId,
        /// Deletion time.
        deleted_on: u64,
    },
    /// Read receipt.
    ReadReceiptReceived {
        /// Thread.
        thread_id: ThreadId,
        /// Reader.
        sender_id: ParticipantId,
        /// Message read.
        message_id: MessageId,
        /// Sequence of the message read.
        sequence_id: u64,
        /// Receipt time.
        read_on: u64,
    },
    /// Someone is typing.
    TypingIndicatorReceived {
        /// Thread.
        thread_id: ThreadId,
        /// Typist.
        sender_id: ParticipantId,
        /// Typist display name.
        sender_display_name: Option<String>,
        /// Receive time.
        received_on: u64,
    },
    /// Participants joined.
    ParticipantsAdded {
        /// Thread.
        thread_id: ThreadId,
        /// New participants.
        participants: Vec<ChatParticipant>,
    },
    /// Participants left.
    ParticipantsRemoved {
        /// Thread.
        thread_id: ThreadId,
        /// Departed participant ids.
        participant_ids: Vec<ParticipantId>,
    },
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Service id.
    pub id: MessageId,
    /// Service sequence number.
    pub sequence_id: u64,
}

/// Operations on one chat thread.
pub trait ChatThreadClient {
    /// Thread id.
    fn thread_id(&self) -> ThreadId;

    /// Send a text message tagged with `client_message_id`.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn send_message(&self, content: &str, client_message_id: &str) -> Result<SentMessage, SdkError>;

    /// Mark `message_id` as read by the local user.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn send_read_receipt(&self, message_id: &str) -> Result<(), SdkError>;

    /// Notify others that the local user is typing.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn send_typing_notification(&self) -> Result<(), SdkError>;

    /// Change the thread topic.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn update_topic(&self, topic: &str) -> Result<(), SdkError>;

    /// Message history.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn list_messages(&self) -> Result<Vec<ChatMessage>, SdkError>;

    /// Current participants.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn list_participants(&self) -> Result<Vec<ChatParticipant>, SdkError>;
}

/// Entry point of the chat SDK.
pub trait ChatClient: EventEmitter<ChatEvent> {
    /// Local user id.
    fn user_id(&self) -> ParticipantId;

    /// Client for one thread.
    ///
    /// # Errors
    ///
    /// Returns the SDK failure.
    fn get_chat_thread_client(&self, thread_id: &str) -> Result<Rc<dyn ChatThreadClient>, SdkError>;
}
