//! Client error types.

use prism_memo::SelectorError;
use thiserror::Error;

use crate::state::StreamId;

/// Error returned by an upstream SDK call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SdkError {
    /// Description from the SDK.
    pub reason: String,
}

impl SdkError {
    /// Wrap an SDK failure description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Errors from stateful client commands.
///
/// SDK events never produce these: an event for an entity that is no longer
/// tracked is dropped as a no-op transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Call not present in state.
    #[error("call not found: {call_id}")]
    CallNotFound {
        /// The call ID that was not found.
        call_id: String,
    },

    /// Remote participant not present in the call.
    #[error("participant not found: {participant_id} in call {call_id}")]
    ParticipantNotFound {
        /// Call the participant was looked up in.
        call_id: String,
        /// The participant ID that was not found.
        participant_id: String,
    },

    /// Video stream not present on the participant.
    #[error("stream not found: {stream_id} of {participant_id}")]
    StreamNotFound {
        /// Owner of the stream.
        participant_id: String,
        /// The stream ID that was not found.
        stream_id: StreamId,
    },

    /// Chat thread not present in state.
    #[error("thread not found: {thread_id}")]
    ThreadNotFound {
        /// The thread ID that was not found.
        thread_id: String,
    },

    /// Message not present in the thread.
    #[error("message not found: {message_id} in thread {thread_id}")]
    MessageNotFound {
        /// Thread the message was looked up in.
        thread_id: String,
        /// The message ID that was not found.
        message_id: String,
    },

    /// Client was disposed.
    #[error("client disposed")]
    Disposed,

    /// Upstream SDK call failed.
    #[error("SDK error: {reason}")]
    Sdk {
        /// Description of the SDK failure.
        reason: String,
    },

    /// Selector evaluation failed.
    #[error("selector error: {0}")]
    Selector(#[from] SelectorError),
}

impl From<SdkError> for ClientError {
    fn from(err: SdkError) -> Self {
        Self::Sdk { reason: err.reason }
    }
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Entity lookups fail transiently while the SDK catches up with a
    /// command; disposal and SDK failures do not recover on retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Disposed | Self::Sdk { .. } => true,

            // Memo errors are programming errors; body failures may depend on
            // state that has not arrived yet.
            Self::Selector(e) => matches!(e, SelectorError::Memo(_)),

            Self::CallNotFound { .. }
            | Self::ParticipantNotFound { .. }
            | Self::StreamNotFound { .. }
            | Self::ThreadNotFound { .. }
            | Self::MessageNotFound { .. } => false,
        }
    }
}
