//! Chat-side event bridge.

use std::rc::Rc;

use super::{TrackedObject, Tracker};
use crate::{
    config::ChatClientConfig,
    sdk::{ChatClient, ChatEvent},
    state::{ChatClientState, TypingIndicator},
    store::StateStore,
    transition::ChatPatch,
};

struct Inner {
    store: StateStore<ChatClientState>,
    config: ChatClientConfig,
    tracker: Tracker,
}

/// Projects chat notifications into a [`StateStore`].
///
/// The chat SDK reports every thread through one client-level emitter, so
/// there is a single tracked object.
pub struct ChatBridge {
    inner: Rc<Inner>,
}

impl ChatBridge {
    /// Bridge writing into `store`.
    pub fn new(store: StateStore<ChatClientState>, config: ChatClientConfig) -> Self {
        Self { inner: Rc::new(Inner { store, config, tracker: Tracker::default() }) }
    }

    /// Store the bridge writes into.
    pub fn store(&self) -> &StateStore<ChatClientState> {
        &self.inner.store
    }

    /// Start listening to `client`. Idempotent.
    pub fn track_chat_client(&self, client: &Rc<dyn ChatClient>) {
        if self.inner.tracker.is_tracked(&TrackedObject::ChatClient) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        let id = client.on(Box::new(move |event: &ChatEvent| {
            if let Some(inner) = weak.upgrade() {
                on_chat_event(&inner, event);
            }
        }));
        self.inner.tracker.insert::<ChatEvent, _>(TrackedObject::ChatClient, Rc::clone(client), id);
    }

    /// Number of SDK objects with a listener attached.
    pub fn tracked_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Detach every listener.
    pub fn dispose(&self) {
        let detached = self.inner.tracker.clear();
        tracing::debug!(detached, "chat bridge disposed");
    }
}

/// Map a chat notification to its patch.
pub(crate) fn chat_patch(event: &ChatEvent, config: &ChatClientConfig) -> ChatPatch {
    match event.clone() {
        ChatEvent::ThreadCreated { thread_id, topic } => {
            ChatPatch::ThreadAdded { thread_id, topic }
        },
        ChatEvent::ThreadDeleted { thread_id } => ChatPatch::ThreadDeleted { thread_id },
        ChatEvent::ThreadPropertiesUpdated { thread_id, topic } => {
            ChatPatch::TopicUpdated { thread_id, topic }
        },
        ChatEvent::MessageReceived { thread_id, message } => {
            ChatPatch::MessageReceived { thread_id, message: message.into() }
        },
        ChatEvent::MessageEdited { thread_id, message_id, content, edited_on } => {
            ChatPatch::MessageEdited { thread_id, message_id, content, edited_on }
        },
        ChatEvent::MessageDeleted { thread_id, message_id, deleted_on } => {
            ChatPatch::MessageDeleted { thread_id, message_id, deleted_on }
        },
        ChatEvent::ReadReceiptReceived {
            thread_id,
            sender_id,
            message_id,
            sequence_id,
            read_on,
        } => ChatPatch::ReadReceiptReceived {
            thread_id,
            sender_id,
            message_id,
            sequence_id,
            read_on,
        },
        ChatEvent::TypingIndicatorReceived {
            thread_id,
            sender_id,
            sender_display_name,
            received_on,
        } => {
            ChatPatch::TypingIndicatorReceived {
                thread_id,
                indicator: TypingIndicator { sender_id, sender_display_name, received_on },
                max_indicators: config.max_typing_indicators,
            }
        },
        ChatEvent::ParticipantsAdded { thread_id, participants } => {
            ChatPatch::ParticipantsAdded { thread_id, participants }
        },
        ChatEvent::ParticipantsRemoved { thread_id, participant_ids } => {
            ChatPatch::ParticipantsRemoved { thread_id, participant_ids }
        },
    }
}

fn on_chat_event(inner: &Inner, event: &ChatEvent) {
    let _ = inner.store.apply_transition(chat_patch(event, &inner.config));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{sdk::ChatMessage, state::ChatMessageKind};

    #[test]
    fn received_message_maps_to_delivered_patch() {
        let event = ChatEvent::MessageReceived {
            thread_id: "t1".to_string(),
            message: ChatMessage {
                id: "m1".to_string(),
                sequence_id: 4,
                created_on: 10,
                sender_id: Some("p2".to_string()),
                sender_display_name: Some("Bo".to_string()),
                kind: ChatMessageKind::Text,
                content: "hi".to_string(),
                client_message_id: None,
                edited_on: None,
                deleted_on: None,
            },
        };

        let patch = chat_patch(&event, &ChatClientConfig::default());
        let ChatPatch::MessageReceived { message, .. } = patch else {
            panic!("wrong patch");
        };
        assert_eq!(message.sequence_id, Some(4));
        assert_eq!(message.status, crate::state::MessageStatus::Delivered);
    }

    #[test]
    fn typing_patch_carries_configured_bound() {
        let event = ChatEvent::TypingIndicatorReceived {
            thread_id: "t1".to_string(),
            sender_id: "p2".to_string(),
            sender_display_name: None,
            received_on: 5,
        };
        let config = ChatClientConfig { max_typing_indicators: 3, ..ChatClientConfig::default() };

        let patch = chat_patch(&event, &config);
        let ChatPatch::TypingIndicatorReceived { max_indicators, .. } = patch else {
            panic!("wrong patch");
        };
        assert_eq!(max_indicators, 3);
    }
}
