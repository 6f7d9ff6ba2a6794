//! Immutable state tree.
//!
//! Every node below the root is held behind an `Arc`. A transition rebuilds
//! the path from the root to the changed node and shares every other subtree
//! with the previous snapshot, so selectors can tell "changed" from
//! "unchanged" by pointer identity alone.
//!
//! Collections keyed by id use `BTreeMap`; insertion order carries no meaning.

mod call;
mod chat;
mod device;

use std::sync::Arc;

pub use call::{
    CallClientState, CallId, CallState, CallStatus, LocalParticipantState, MediaStreamType,
    ParticipantId, RemoteParticipantState, RemoteVideoStreamState, RenderStatus, ScalingMode,
    StreamId, VideoViewState,
};
pub use chat::{
    ChatClientState, ChatMessageKind, ChatMessageWithStatus, ChatParticipant,
    ChatThreadProperties, ChatThreadState, MessageId, MessageStatus, ReadMarker, ThreadId,
    TypingIndicator,
};
pub use device::{
    AudioDeviceInfo, DeviceAccess, DeviceManagerState, VideoDeviceInfo, VideoDeviceType,
};

/// Root snapshot handed to selectors.
///
/// Components that only need one side take that slice; composites that show
/// a call next to its chat take the merged form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Call-side snapshot only.
    Call(Arc<CallClientState>),
    /// Chat-side snapshot only.
    Chat(Arc<ChatClientState>),
    /// Both snapshots.
    Merged {
        /// Call-side snapshot.
        call: Arc<CallClientState>,
        /// Chat-side snapshot.
        chat: Arc<ChatClientState>,
    },
}

impl ClientState {
    /// Merge call and chat snapshots. Both are shared, not copied.
    pub fn merge(call: Arc<CallClientState>, chat: Arc<ChatClientState>) -> Self {
        Self::Merged { call, chat }
    }

    /// Call-side snapshot, if present.
    pub fn call(&self) -> Option<&Arc<CallClientState>> {
        match self {
            Self::Call(call) | Self::Merged { call, .. } => Some(call),
            Self::Chat(_) => None,
        }
    }

    /// Chat-side snapshot, if present.
    pub fn chat(&self) -> Option<&Arc<ChatClientState>> {
        match self {
            Self::Chat(chat) | Self::Merged { chat, .. } => Some(chat),
            Self::Call(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_state_shares_slices() {
        let call = Arc::new(CallClientState::new("me"));
        let chat = Arc::new(ChatClientState::new("me", None));

        let merged = ClientState::merge(Arc::clone(&call), Arc::clone(&chat));

        assert!(Arc::ptr_eq(merged.call().unwrap_or(&Arc::default()), &call));
        assert!(Arc::ptr_eq(merged.chat().unwrap_or(&Arc::default()), &chat));
        assert!(ClientState::Call(call).chat().is_none());
        assert!(ClientState::Chat(chat).call().is_none());
    }
}
