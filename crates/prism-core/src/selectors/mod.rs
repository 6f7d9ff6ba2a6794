//! View-model selectors
//!
//! Pure functions from a state snapshot and props to the view model one
//! component renders, built on the `prism-memo` caches.
//!
//! ## Responsibilities
//!
//! - Extraction: read only the `Arc` slices a view model depends on
//! - Derivation: build view models (tiles, message rows) from those slices
//! - Stability: return the previous `Arc` when nothing the view reads changed
//!
//! ## Design
//!
//! - Props are part of every cache input, so one selector instance serving
//!   another thread or participant recomputes instead of reusing a stale entry
//! - List selectors memoize per item with a [`prism_memo::BulkMemoizer`]; a
//!   change to one participant or message rebuilds the list but keeps every
//!   other row's `Arc`
//! - A selector instance belongs to one binding. Sharing an instance between
//!   bindings with different props thrashes its single-slot cache

mod call;
mod chat;
mod composite;
mod device;

pub use call::{
    CallStatusView, LocalTile, ParticipantListSelector, ParticipantView, RemoteTile,
    ScreenShareTile, VideoGallerySelector, VideoGalleryView, call_status_selector,
    is_muted_selector,
};
pub use chat::{
    MessageThreadSelector, MessageView, MessageViewStatus, TypingUser, typing_indicator_selector,
};
pub use composite::{CallWithChatView, call_with_chat_selector};
pub use device::{DevicesView, devices_selector};
use prism_memo::Identical;

use crate::state::{CallId, CallStatus, MessageStatus, ParticipantId, ThreadId};

/// Props for call-scoped selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallProps {
    /// Call the view belongs to.
    pub call_id: CallId,
}

/// Props for participant-scoped selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParticipantProps {
    /// Call the participant is in.
    pub call_id: CallId,
    /// Remote participant.
    pub participant_id: ParticipantId,
}

/// Props for thread-scoped selectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadProps {
    /// Thread the view belongs to.
    pub thread_id: ThreadId,
}

/// Props for the typing indicator selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypingProps {
    /// Thread the view belongs to.
    pub thread_id: ThreadId,
    /// Render time; indicators older than the TTL at this instant are hidden.
    pub now_millis: u64,
}

/// Props for the call-with-chat composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallWithChatProps {
    /// Call half of the composite.
    pub call_id: CallId,
    /// Chat thread attached to the call.
    pub thread_id: ThreadId,
}

impl Identical for CallStatus {
    fn identical(&self, other: &Self) -> bool {
        self == other
    }
}

impl Identical for MessageStatus {
    fn identical(&self, other: &Self) -> bool {
        self == other
    }
}
