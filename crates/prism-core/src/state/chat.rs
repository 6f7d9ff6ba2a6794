//! Chat-side state slice.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use super::call::ParticipantId;

/// Chat thread identifier.
pub type ThreadId = String;

/// Chat message identifier.
pub type MessageId = String;

/// Delivery state of a stored message.
///
/// `Seen` is not stored; it is derived from read markers by selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Sent locally, not acknowledged yet.
    Sending,
    /// Acknowledged by the service (or received from it).
    Delivered,
    /// Send failed.
    Failed,
}

/// Message content kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChatMessageKind {
    /// Plain text.
    #[default]
    Text,
    /// HTML.
    Html,
    /// System message: topic changed.
    TopicUpdated,
    /// System message: participants joined.
    ParticipantAdded,
    /// System message: participants left.
    ParticipantRemoved,
}

/// A message with its local delivery status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessageWithStatus {
    /// Service id, or the client message id while `Sending`/`Failed`.
    pub id: MessageId,
    /// Locally generated id for messages sent from this client.
    pub client_message_id: Option<String>,
    /// Service sequence number, unknown until delivered.
    pub sequence_id: Option<u64>,
    /// Creation time in milliseconds.
    pub created_on: u64,
    /// Author.
    pub sender_id: Option<ParticipantId>,
    /// Author display name.
    pub sender_display_name: Option<String>,
    /// Content kind.
    pub kind: ChatMessageKind,
    /// Message body. Cleared on deletion.
    pub content: String,
    /// Delivery status.
    pub status: MessageStatus,
    /// Last edit time.
    pub edited_on: Option<u64>,
    /// Deletion time.
    pub deleted_on: Option<u64>,
}

impl ChatMessageWithStatus {
    /// Ordering key inside a thread: creation time, then sequence, then id.
    /// Messages without a sequence sort after delivered ones created at the
    /// same millisecond.
    pub fn order_key(&self) -> (u64, u64, &str) {
        (self.created_on, self.sequence_id.unwrap_or(u64::MAX), self.id.as_str())
    }
}

/// A thread participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatParticipant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Display name.
    pub display_name: Option<String>,
}

/// Last message a participant has read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMarker {
    /// Message the receipt points at.
    pub message_id: MessageId,
    /// Sequence of that message.
    pub sequence_id: u64,
    /// When the receipt was sent.
    pub read_on: u64,
}

/// Someone is typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator {
    /// Who is typing.
    pub sender_id: ParticipantId,
    /// Their display name.
    pub sender_display_name: Option<String>,
    /// When the indicator arrived, in milliseconds.
    pub received_on: u64,
}

/// Thread properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatThreadProperties {
    /// Thread topic.
    pub topic: Option<String>,
}

/// One chat thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatThreadState {
    /// Thread id.
    pub thread_id: ThreadId,
    /// Thread properties.
    pub properties: Arc<ChatThreadProperties>,
    /// Messages ordered by [`ChatMessageWithStatus::order_key`].
    pub messages: Arc<Vec<Arc<ChatMessageWithStatus>>>,
    /// Participants keyed by id.
    pub participants: Arc<BTreeMap<ParticipantId, Arc<ChatParticipant>>>,
    /// Latest read marker per participant.
    pub read_markers: Arc<BTreeMap<ParticipantId, ReadMarker>>,
    /// Recent typing indicators, oldest first, bounded by configuration.
    pub typing_indicators: Arc<Vec<TypingIndicator>>,
}

impl ChatThreadState {
    /// Empty thread.
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            properties: Arc::default(),
            messages: Arc::default(),
            participants: Arc::default(),
            read_markers: Arc::default(),
            typing_indicators: Arc::default(),
        }
    }

    /// Find a message by service id.
    pub fn message(&self, message_id: &str) -> Option<&Arc<ChatMessageWithStatus>> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

/// Root of the chat-side state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatClientState {
    /// Local user id.
    pub user_id: ParticipantId,
    /// Local display name.
    pub display_name: Option<String>,
    /// Threads keyed by id.
    pub threads: Arc<BTreeMap<ThreadId, Arc<ChatThreadState>>>,
    /// Threads deleted since the client started. Late messages for these
    /// are dropped until the thread is added again.
    pub deleted_threads: Arc<BTreeSet<ThreadId>>,
}

impl ChatClientState {
    /// Empty state for `user_id`.
    pub fn new(user_id: impl Into<ParticipantId>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
            threads: Arc::default(),
            deleted_threads: Arc::default(),
        }
    }

    /// Look up a thread.
    pub fn thread(&self, thread_id: &str) -> Option<&Arc<ChatThreadState>> {
        self.threads.get(thread_id)
    }
}
