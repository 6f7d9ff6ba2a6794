//! Chat-side patches.

use std::sync::Arc;

use super::push_bounded;
use crate::{
    state::{
        ChatClientState, ChatMessageWithStatus, ChatParticipant, ChatThreadProperties,
        ChatThreadState, MessageId, MessageStatus, ParticipantId, ReadMarker, ThreadId,
        TypingIndicator,
    },
    store::Transition,
};

/// A targeted change to [`ChatClientState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatPatch {
    /// Thread created or joined.
    ThreadAdded {
        /// New thread.
        thread_id: ThreadId,
        /// Initial topic.
        topic: Option<String>,
    },
    /// Thread deleted.
    ThreadDeleted {
        /// Deleted thread.
        thread_id: ThreadId,
    },
    /// Topic changed.
    TopicUpdated {
        /// Target thread.
        thread_id: ThreadId,
        /// New topic.
        topic: Option<String>,
    },
    /// Message arrived from the service. Creates the thread if unknown and
    /// not deleted.
    MessageReceived {
        /// Target thread.
        thread_id: ThreadId,
        /// Delivered message.
        message: ChatMessageWithStatus,
    },
    /// Message content edited.
    MessageEdited {
        /// Target thread.
        thread_id: ThreadId,
        /// Edited message.
        message_id: MessageId,
        /// New content.
        content: String,
        /// Edit timestamp.
        edited_on: u64,
    },
    /// Message deleted; content is cleared and the tombstone kept.
    MessageDeleted {
        /// Target thread.
        thread_id: ThreadId,
        /// Deleted message.
        message_id: MessageId,
        /// Deletion timestamp.
        deleted_on: u64,
    },
    /// Local send started; adds the optimistic `Sending` message.
    MessageSending {
        /// Target thread.
        thread_id: ThreadId,
        /// Placeholder keyed by its client message id.
        message: ChatMessageWithStatus,
    },
    /// Local send acknowledged.
    MessageSent {
        /// Target thread.
        thread_id: ThreadId,
        /// Client id of the placeholder.
        client_message_id: String,
        /// Service id.
        message_id: MessageId,
        /// Service sequence number.
        sequence_id: u64,
    },
    /// Local send failed.
    MessageFailed {
        /// Target thread.
        thread_id: ThreadId,
        /// Client id of the placeholder.
        client_message_id: String,
    },
    /// Read receipt; only moves a participant's marker forward.
    ReadReceiptReceived {
        /// Target thread.
        thread_id: ThreadId,
        /// Reader.
        sender_id: ParticipantId,
        /// Message read.
        message_id: MessageId,
        /// Sequence of the message read.
        sequence_id: u64,
        /// Receipt timestamp.
        read_on: u64,
    },
    /// Participants joined.
    ParticipantsAdded {
        /// Target thread.
        thread_id: ThreadId,
        /// New participants.
        participants: Vec<ChatParticipant>,
    },
    /// Participants left.
    ParticipantsRemoved {
        /// Target thread.
        thread_id: ThreadId,
        /// Departed participant ids.
        participant_ids: Vec<ParticipantId>,
    },
    /// Typing notification; replaces the sender's previous indicator.
    TypingIndicatorReceived {
        /// Target thread.
        thread_id: ThreadId,
        /// Indicator.
        indicator: TypingIndicator,
        /// History bound for `typing_indicators`.
        max_indicators: usize,
    },
    /// History page loaded. Creates the thread if unknown and not deleted.
    MessagesFetched {
        /// Target thread.
        thread_id: ThreadId,
        /// Fetched messages in any order.
        messages: Vec<ChatMessageWithStatus>,
    },
}

impl Transition<ChatClientState> for ChatPatch {
    fn kind(&self) -> &'static str {
        match self {
            Self::ThreadAdded { .. } => "thread_added",
            Self::ThreadDeleted { .. } => "thread_deleted",
            Self::TopicUpdated { .. } => "topic_updated",
            Self::MessageReceived { .. } => "message_received",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::MessageSending { .. } => "message_sending",
            Self::MessageSent { .. } => "message_sent",
            Self::MessageFailed { .. } => "message_failed",
            Self::ReadReceiptReceived { .. } => "read_receipt_received",
            Self::ParticipantsAdded { .. } => "participants_added",
            Self::ParticipantsRemoved { .. } => "participants_removed",
            Self::TypingIndicatorReceived { .. } => "typing_indicator_received",
            Self::MessagesFetched { .. } => "messages_fetched",
        }
    }

    fn apply(&self, state: &ChatClientState) -> Option<ChatClientState> {
        match self {
            Self::ThreadAdded { thread_id, topic } => {
                if state.threads.contains_key(thread_id) {
                    return None;
                }
                let mut thread = ChatThreadState::new(thread_id.clone());
                thread.properties = Arc::new(ChatThreadProperties { topic: topic.clone() });
                let mut threads = (*state.threads).clone();
                threads.insert(thread_id.clone(), Arc::new(thread));
                let deleted_threads = if state.deleted_threads.contains(thread_id) {
                    let mut deleted = (*state.deleted_threads).clone();
                    deleted.remove(thread_id);
                    Arc::new(deleted)
                } else {
                    Arc::clone(&state.deleted_threads)
                };
                Some(ChatClientState {
                    threads: Arc::new(threads),
                    deleted_threads,
                    ..state.clone()
                })
            },
            Self::ThreadDeleted { thread_id } => {
                if !state.threads.contains_key(thread_id) {
                    return None;
                }
                let mut threads = (*state.threads).clone();
                threads.remove(thread_id);
                let mut deleted = (*state.deleted_threads).clone();
                deleted.insert(thread_id.clone());
                Some(ChatClientState {
                    threads: Arc::new(threads),
                    deleted_threads: Arc::new(deleted),
                    ..state.clone()
                })
            },
            Self::TopicUpdated { thread_id, topic } => update_thread(state, thread_id, |thread| {
                (thread.properties.topic != *topic).then(|| ChatThreadState {
                    properties: Arc::new(ChatThreadProperties { topic: topic.clone() }),
                    ..thread.clone()
                })
            }),
            Self::MessageReceived { thread_id, message } => {
                upsert_thread(state, thread_id, |thread| {
                    let mut messages = (*thread.messages).clone();
                    merge_message(&mut messages, message).then(|| with_messages(thread, messages))
                })
            },
            Self::MessageEdited { thread_id, message_id, content, edited_on } => {
                update_thread(state, thread_id, |thread| {
                    update_message(thread, |m| m.id == *message_id, |m| {
                        (m.content != *content || m.edited_on != Some(*edited_on)).then(|| {
                            ChatMessageWithStatus {
                                content: content.clone(),
                                edited_on: Some(*edited_on),
                                ..m.clone()
                            }
                        })
                    })
                })
            },
            Self::MessageDeleted { thread_id, message_id, deleted_on } => {
                update_thread(state, thread_id, |thread| {
                    update_message(thread, |m| m.id == *message_id, |m| {
                        m.deleted_on.is_none().then(|| ChatMessageWithStatus {
                            content: String::new(),
                            deleted_on: Some(*deleted_on),
                            ..m.clone()
                        })
                    })
                })
            },
            Self::MessageSending { thread_id, message } => {
                upsert_thread(state, thread_id, |thread| {
                    let duplicate = thread.messages.iter().any(|m| {
                        m.client_message_id.is_some()
                            && m.client_message_id == message.client_message_id
                    });
                    if duplicate {
                        return None;
                    }
                    let mut messages = (*thread.messages).clone();
                    insert_sorted(&mut messages, Arc::new(message.clone()));
                    Some(with_messages(thread, messages))
                })
            },
            Self::MessageSent { thread_id, client_message_id, message_id, sequence_id } => {
                update_thread(state, thread_id, |thread| {
                    let index = thread
                        .messages
                        .iter()
                        .position(|m| {
                            m.client_message_id.as_deref() == Some(client_message_id.as_str())
                        })?;
                    let placeholder = &thread.messages[index];
                    if placeholder.status == MessageStatus::Delivered {
                        return None;
                    }
                    let mut messages = (*thread.messages).clone();
                    messages.remove(index);
                    // The service echo may have arrived first under the real id.
                    if !messages.iter().any(|m| m.id == *message_id) {
                        insert_sorted(
                            &mut messages,
                            Arc::new(ChatMessageWithStatus {
                                id: message_id.clone(),
                                sequence_id: Some(*sequence_id),
                                status: MessageStatus::Delivered,
                                ..(**placeholder).clone()
                            }),
                        );
                    }
                    Some(with_messages(thread, messages))
                })
            },
            Self::MessageFailed { thread_id, client_message_id } => {
                update_thread(state, thread_id, |thread| {
                    update_message(
                        thread,
                        |m| m.client_message_id.as_deref() == Some(client_message_id.as_str()),
                        |m| {
                            (m.status == MessageStatus::Sending).then(|| ChatMessageWithStatus {
                                status: MessageStatus::Failed,
                                ..m.clone()
                            })
                        },
                    )
                })
            },
            Self::ReadReceiptReceived {
                thread_id,
                sender_id,
                message_id,
                sequence_id,
                read_on,
            } => {
                update_thread(state, thread_id, |thread| {
                    let marker = thread.read_markers.get(sender_id);
                    if marker.is_some_and(|m| m.sequence_id >= *sequence_id) {
                        return None;
                    }
                    let mut markers = (*thread.read_markers).clone();
                    markers.insert(
                        sender_id.clone(),
                        ReadMarker {
                            message_id: message_id.clone(),
                            sequence_id: *sequence_id,
                            read_on: *read_on,
                        },
                    );
                    Some(ChatThreadState { read_markers: Arc::new(markers), ..thread.clone() })
                })
            },
            Self::ParticipantsAdded { thread_id, participants } => {
                update_thread(state, thread_id, |thread| {
                    let mut next = (*thread.participants).clone();
                    let mut changed = false;
                    for participant in participants {
                        if next.get(&participant.id).is_none_or(|p| **p != *participant) {
                            next.insert(participant.id.clone(), Arc::new(participant.clone()));
                            changed = true;
                        }
                    }
                    changed.then(|| ChatThreadState {
                        participants: Arc::new(next),
                        ..thread.clone()
                    })
                })
            },
            Self::ParticipantsRemoved { thread_id, participant_ids } => {
                update_thread(state, thread_id, |thread| {
                    let mut next = (*thread.participants).clone();
                    let mut changed = false;
                    for id in participant_ids {
                        changed |= next.remove(id).is_some();
                    }
                    changed.then(|| ChatThreadState {
                        participants: Arc::new(next),
                        ..thread.clone()
                    })
                })
            },
            Self::TypingIndicatorReceived { thread_id, indicator, max_indicators } => {
                update_thread(state, thread_id, |thread| {
                    if thread.typing_indicators.contains(indicator) {
                        return None;
                    }
                    let others: Vec<TypingIndicator> = thread
                        .typing_indicators
                        .iter()
                        .filter(|t| t.sender_id != indicator.sender_id)
                        .cloned()
                        .collect();
                    Some(ChatThreadState {
                        typing_indicators: push_bounded(
                            &others,
                            [indicator.clone()],
                            *max_indicators,
                        ),
                        ..thread.clone()
                    })
                })
            },
            Self::MessagesFetched { thread_id, messages } => {
                upsert_thread(state, thread_id, |thread| {
                    let mut next = (*thread.messages).clone();
                    let mut changed = false;
                    for message in messages {
                        changed |= merge_message(&mut next, message);
                    }
                    changed.then(|| with_messages(thread, next))
                })
            },
        }
    }
}

fn update_thread(
    state: &ChatClientState,
    thread_id: &str,
    f: impl FnOnce(&ChatThreadState) -> Option<ChatThreadState>,
) -> Option<ChatClientState> {
    let next = f(&**state.threads.get(thread_id)?)?;
    let mut threads = (*state.threads).clone();
    threads.insert(thread_id.to_string(), Arc::new(next));
    Some(ChatClientState { threads: Arc::new(threads), ..state.clone() })
}

/// Like [`update_thread`], starting from an empty thread if none exists.
/// An empty thread is only created when `f` changes it, and never for a
/// deleted thread.
fn upsert_thread(
    state: &ChatClientState,
    thread_id: &str,
    f: impl FnOnce(&ChatThreadState) -> Option<ChatThreadState>,
) -> Option<ChatClientState> {
    let next = match state.threads.get(thread_id) {
        Some(thread) => f(&**thread)?,
        None if state.deleted_threads.contains(thread_id) => return None,
        None => f(&ChatThreadState::new(thread_id))?,
    };
    let mut threads = (*state.threads).clone();
    threads.insert(thread_id.to_string(), Arc::new(next));
    Some(ChatClientState { threads: Arc::new(threads), ..state.clone() })
}

fn update_message(
    thread: &ChatThreadState,
    find: impl Fn(&ChatMessageWithStatus) -> bool,
    f: impl FnOnce(&ChatMessageWithStatus) -> Option<ChatMessageWithStatus>,
) -> Option<ChatThreadState> {
    let index = thread.messages.iter().position(|m| find(&**m))?;
    let next = f(&*thread.messages[index])?;
    let mut messages = (*thread.messages).clone();
    messages[index] = Arc::new(next);
    Some(with_messages(thread, messages))
}

fn with_messages(
    thread: &ChatThreadState,
    messages: Vec<Arc<ChatMessageWithStatus>>,
) -> ChatThreadState {
    ChatThreadState { messages: Arc::new(messages), ..thread.clone() }
}

fn insert_sorted(
    messages: &mut Vec<Arc<ChatMessageWithStatus>>,
    message: Arc<ChatMessageWithStatus>,
) {
    let index = messages.partition_point(|m| m.order_key() < message.order_key());
    messages.insert(index, message);
}

/// Insert or replace a delivered message. A message matches an existing one
/// by service id, or by client message id when replacing the local
/// placeholder. Returns false if an identical message is already stored.
fn merge_message(
    messages: &mut Vec<Arc<ChatMessageWithStatus>>,
    message: &ChatMessageWithStatus,
) -> bool {
    let existing = messages.iter().position(|m| {
        m.id == message.id
            || (message.client_message_id.is_some()
                && m.client_message_id == message.client_message_id)
    });
    if let Some(index) = existing {
        if *messages[index] == *message {
            return false;
        }
        messages.remove(index);
    }
    insert_sorted(messages, Arc::new(message.clone()));
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::ChatMessageKind;

    fn message(id: &str, sequence_id: Option<u64>, created_on: u64) -> ChatMessageWithStatus {
        ChatMessageWithStatus {
            id: id.to_string(),
            client_message_id: None,
            sequence_id,
            created_on,
            sender_id: Some("p2".to_string()),
            sender_display_name: None,
            kind: ChatMessageKind::Text,
            content: format!("message {id}"),
            status: MessageStatus::Delivered,
            edited_on: None,
            deleted_on: None,
        }
    }

    fn received(m: ChatMessageWithStatus) -> ChatPatch {
        ChatPatch::MessageReceived { thread_id: "t1".to_string(), message: m }
    }

    fn ids(state: &ChatClientState) -> Vec<String> {
        state.thread("t1").unwrap().messages.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn received_messages_are_ordered_and_deduplicated() {
        let state = ChatClientState::new("me", None);
        let state = received(message("m2", Some(2), 20)).apply(&state).unwrap();
        let state = received(message("m1", Some(1), 10)).apply(&state).unwrap();
        let state = received(message("m3", Some(3), 30)).apply(&state).unwrap();

        assert_eq!(ids(&state), vec!["m1", "m2", "m3"]);
        assert!(received(message("m2", Some(2), 20)).apply(&state).is_none());
    }

    #[test]
    fn optimistic_send_resolves_to_delivered() {
        let state = ChatClientState::new("me", None);
        let mut placeholder = message("local-1", None, 50);
        placeholder.client_message_id = Some("local-1".to_string());
        placeholder.status = MessageStatus::Sending;
        let state = ChatPatch::MessageSending { thread_id: "t1".to_string(), message: placeholder }
            .apply(&state)
            .unwrap();

        let state = ChatPatch::MessageSent {
            thread_id: "t1".to_string(),
            client_message_id: "local-1".to_string(),
            message_id: "m9".to_string(),
            sequence_id: 9,
        }
        .apply(&state)
        .unwrap();

        let thread = state.thread("t1").unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].id, "m9");
        assert_eq!(thread.messages[0].status, MessageStatus::Delivered);
    }

    #[test]
    fn echo_before_ack_keeps_single_copy() {
        let state = ChatClientState::new("me", None);
        let mut placeholder = message("local-1", None, 50);
        placeholder.client_message_id = Some("local-1".to_string());
        placeholder.status = MessageStatus::Sending;
        let state = ChatPatch::MessageSending { thread_id: "t1".to_string(), message: placeholder }
            .apply(&state)
            .unwrap();

        // Echo without a client id arrives before the ack.
        let state = received(message("m9", Some(9), 50)).apply(&state).unwrap();
        let state = ChatPatch::MessageSent {
            thread_id: "t1".to_string(),
            client_message_id: "local-1".to_string(),
            message_id: "m9".to_string(),
            sequence_id: 9,
        }
        .apply(&state)
        .unwrap();

        assert_eq!(ids(&state), vec!["m9"]);
    }

    #[test]
    fn read_markers_only_advance() {
        let state = received(message("m1", Some(1), 10))
            .apply(&ChatClientState::new("me", None))
            .unwrap();
        let receipt = |sequence_id| ChatPatch::ReadReceiptReceived {
            thread_id: "t1".to_string(),
            sender_id: "p2".to_string(),
            message_id: format!("m{sequence_id}"),
            sequence_id,
            read_on: 100,
        };

        let state = receipt(5).apply(&state).unwrap();
        assert!(receipt(3).apply(&state).is_none());
        assert!(receipt(5).apply(&state).is_none());
        assert_eq!(state.thread("t1").unwrap().read_markers["p2"].sequence_id, 5);
    }

    #[test]
    fn typing_indicator_replaces_sender_and_is_bounded() {
        let state = ChatPatch::ThreadAdded { thread_id: "t1".to_string(), topic: None }
            .apply(&ChatClientState::new("me", None))
            .unwrap();
        let typing = |sender: &str, received_on| ChatPatch::TypingIndicatorReceived {
            thread_id: "t1".to_string(),
            indicator: TypingIndicator {
                sender_id: sender.to_string(),
                sender_display_name: None,
                received_on,
            },
            max_indicators: 2,
        };

        let state = typing("a", 1).apply(&state).unwrap();
        let state = typing("b", 2).apply(&state).unwrap();
        let state = typing("a", 3).apply(&state).unwrap();
        let state = typing("c", 4).apply(&state).unwrap();

        let indicators = &state.thread("t1").unwrap().typing_indicators;
        let senders: Vec<_> = indicators.iter().map(|t| t.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["a", "c"]);
    }

    #[test]
    fn deletion_clears_content_once() {
        let state = received(message("m1", Some(1), 10))
            .apply(&ChatClientState::new("me", None))
            .unwrap();
        let delete = ChatPatch::MessageDeleted {
            thread_id: "t1".to_string(),
            message_id: "m1".to_string(),
            deleted_on: 99,
        };

        let state = delete.apply(&state).unwrap();
        let m = state.thread("t1").unwrap().message("m1").unwrap();
        assert!(m.content.is_empty());
        assert_eq!(m.deleted_on, Some(99));
        assert!(delete.apply(&state).is_none());
    }

    #[test]
    fn stale_thread_patch_is_no_op() {
        let state = ChatClientState::new("me", None);
        let patch =
            ChatPatch::TopicUpdated { thread_id: "gone".to_string(), topic: Some("x".to_string()) };
        assert!(patch.apply(&state).is_none());
    }

    #[test]
    fn late_message_does_not_revive_deleted_thread() {
        let state = received(message("m1", Some(1), 10))
            .apply(&ChatClientState::new("me", None))
            .unwrap();
        let deleted =
            ChatPatch::ThreadDeleted { thread_id: "t1".to_string() }.apply(&state).unwrap();

        assert!(deleted.thread("t1").is_none());
        assert!(received(message("m2", Some(2), 20)).apply(&deleted).is_none());
        let fetched = ChatPatch::MessagesFetched {
            thread_id: "t1".to_string(),
            messages: vec![message("m3", Some(3), 30)],
        };
        assert!(fetched.apply(&deleted).is_none());

        let readded = ChatPatch::ThreadAdded { thread_id: "t1".to_string(), topic: None }
            .apply(&deleted)
            .unwrap();
        assert!(readded.deleted_threads.is_empty());
        let state = received(message("m2", Some(2), 20)).apply(&readded).unwrap();
        assert_eq!(ids(&state), vec!["m2"]);
    }
}
