//! Operations for model-based testing.
//!
//! Targets are small indices rather than ids so that random sequences hit
//! the same calls, participants and streams often. The world maps them onto
//! whatever currently exists.

use arbitrary::Arbitrary;

/// Index into the active calls, modulo their count.
pub type CallSlot = u8;

/// Index into the participant roster, modulo its size.
pub type ParticipantSlot = u8;

/// Stream id, modulo the per-participant stream limit.
pub type StreamSlot = u8;

/// An action on the simulated SDK.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Place an outgoing call.
    StartCall,

    /// Receive an incoming call.
    ReceiveCall,

    /// End a call.
    EndCall {
        /// Target call.
        call: CallSlot,
    },

    /// Change a call's lifecycle state.
    SetCallConnected {
        /// Target call.
        call: CallSlot,
        /// Connected if true, on hold otherwise.
        connected: bool,
    },

    /// Toggle the local microphone.
    SetLocalMuted {
        /// Target call.
        call: CallSlot,
        /// New mute state.
        muted: bool,
    },

    /// Toggle the local screen share.
    SetScreenSharing {
        /// Target call.
        call: CallSlot,
        /// New share state.
        on: bool,
    },

    /// Toggle recording.
    SetRecording {
        /// Target call.
        call: CallSlot,
        /// New recording state.
        on: bool,
    },

    /// Replace the dominant speaker list.
    SetDominantSpeakers {
        /// Target call.
        call: CallSlot,
        /// Speakers, most dominant first.
        speakers: Vec<ParticipantSlot>,
    },

    /// A roster member joins.
    Join {
        /// Target call.
        call: CallSlot,
        /// Who joins.
        participant: ParticipantSlot,
    },

    /// A participant leaves.
    Leave {
        /// Target call.
        call: CallSlot,
        /// Who leaves.
        participant: ParticipantSlot,
    },

    /// Remote mute changes.
    SetMuted {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// New mute state.
        muted: bool,
    },

    /// Remote speaking flag changes.
    SetSpeaking {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// New speaking state.
        speaking: bool,
    },

    /// Remote participant goes on hold or comes back.
    SetOnHold {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// On hold if true, connected otherwise.
        on_hold: bool,
    },

    /// Remote participant renames.
    Rename {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// New name variant; `None` clears the name.
        name: Option<u8>,
    },

    /// Remote participant publishes a stream.
    AddStream {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// Stream id.
        stream: StreamSlot,
        /// Screen share if true, camera otherwise.
        screen_share: bool,
    },

    /// Remote participant unpublishes a stream.
    RemoveStream {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// Stream id.
        stream: StreamSlot,
    },

    /// A stream starts or stops sending.
    SetStreamAvailable {
        /// Target call.
        call: CallSlot,
        /// Target participant.
        participant: ParticipantSlot,
        /// Stream id.
        stream: StreamSlot,
        /// New availability.
        available: bool,
    },

    /// Advance the simulated clock.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// The operation changed the simulated graph.
    Applied,
    /// The target did not exist or already had the requested value.
    NoEffect,
    /// The client refused the operation.
    Rejected,
}
