//! Stateful chat client.

use std::{cell::Cell, rc::Rc, sync::Arc};

use crate::{
    bridge::ChatBridge,
    config::ChatClientConfig,
    env::Environment,
    error::ClientError,
    sdk::{ChatClient, ChatThreadClient},
    state::{
        ChatClientState, ChatMessageKind, ChatMessageWithStatus, MessageId, MessageStatus,
        ThreadId,
    },
    store::{StateStore, SubscriptionId},
    transition::ChatPatch,
};

/// Chat client whose state is mirrored into an immutable snapshot.
pub struct StatefulChatClient<E: Environment> {
    sdk: Rc<dyn ChatClient>,
    bridge: ChatBridge,
    env: E,
    /// Suffix for client message ids; unique even if randomness repeats.
    next_local_id: Rc<Cell<u64>>,
}

/// Create a [`StatefulChatClient`] around `sdk` and start listening to its
/// notifications.
pub fn create_stateful_chat_client<E: Environment>(
    sdk: Rc<dyn ChatClient>,
    display_name: Option<String>,
    env: E,
    config: ChatClientConfig,
) -> StatefulChatClient<E> {
    let user_id = sdk.user_id();
    tracing::info!(%user_id, "stateful chat client created");
    let store = StateStore::new(ChatClientState::new(user_id, display_name));
    let bridge = ChatBridge::new(store, config);
    bridge.track_chat_client(&sdk);
    StatefulChatClient { sdk, bridge, env, next_local_id: Rc::new(Cell::new(0)) }
}

impl<E: Environment> StatefulChatClient<E> {
    /// Current snapshot.
    pub fn get_state(&self) -> Arc<ChatClientState> {
        self.store().get_state()
    }

    /// Register a handler called with every new snapshot.
    pub fn on_state_change(
        &self,
        handler: impl FnMut(&Arc<ChatClientState>) + 'static,
    ) -> SubscriptionId {
        self.store().on_state_change(handler)
    }

    /// Remove a handler.
    pub fn off_state_change(&self, id: SubscriptionId) -> bool {
        self.store().off_state_change(id)
    }

    /// Underlying store.
    pub fn store(&self) -> &StateStore<ChatClientState> {
        self.bridge.store()
    }

    /// Stateful client for one thread.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after [`Self::dispose`]
    /// - `ClientError::Sdk` if the SDK refuses
    pub fn get_chat_thread_client(
        &self,
        thread_id: &str,
    ) -> Result<StatefulChatThreadClient<E>, ClientError> {
        if self.store().is_disposed() {
            return Err(ClientError::Disposed);
        }
        let sdk = self.sdk.get_chat_thread_client(thread_id)?;
        Ok(StatefulChatThreadClient {
            sdk,
            store: self.store().clone(),
            env: self.env.clone(),
            next_local_id: Rc::clone(&self.next_local_id),
        })
    }

    /// Number of SDK objects with a listener attached.
    pub fn tracked_count(&self) -> usize {
        self.bridge.tracked_count()
    }

    /// Stop listening and drop all subscribers.
    pub fn dispose(&self) {
        if self.store().is_disposed() {
            return;
        }
        self.bridge.dispose();
        self.store().dispose();
        tracing::info!("stateful chat client disposed");
    }
}

/// Thread client that records its own commands in state.
///
/// Sends are optimistic: the message appears as `Sending` before the SDK is
/// called and resolves to `Delivered` or `Failed`.
pub struct StatefulChatThreadClient<E: Environment> {
    sdk: Rc<dyn ChatThreadClient>,
    store: StateStore<ChatClientState>,
    env: E,
    next_local_id: Rc<Cell<u64>>,
}

impl<E: Environment> StatefulChatThreadClient<E> {
    /// Thread id.
    pub fn thread_id(&self) -> ThreadId {
        self.sdk.thread_id()
    }

    /// Send a text message.
    ///
    /// Returns the service id of the delivered message.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disposed` after the owning client was disposed
    /// - `ClientError::Sdk` if the send failed; the message stays in state
    ///   as `Failed`
    pub fn send_message(&self, content: &str) -> Result<MessageId, ClientError> {
        self.ensure_live()?;
        let thread_id = self.thread_id();
        let client_message_id = self.next_client_message_id();
        let state = self.store.get_state();
        let placeholder = ChatMessageWithStatus {
            id: client_message_id.clone(),
            client_message_id: Some(client_message_id.clone()),
            sequence_id: None,
            created_on: self.env.now_millis(),
            sender_id: Some(state.user_id.clone()),
            sender_display_name: state.display_name.clone(),
            kind: ChatMessageKind::Text,
            content: content.to_string(),
            status: MessageStatus::Sending,
            edited_on: None,
            deleted_on: None,
        };
        let _ = self.store.apply_transition(ChatPatch::MessageSending {
            thread_id: thread_id.clone(),
            message: placeholder,
        });

        match self.sdk.send_message(content, &client_message_id) {
            Ok(sent) => {
                let _ = self.store.apply_transition(ChatPatch::MessageSent {
                    thread_id,
                    client_message_id,
                    message_id: sent.id.clone(),
                    sequence_id: sent.sequence_id,
                });
                Ok(sent.id)
            },
            Err(err) => {
                tracing::warn!(%thread_id, %client_message_id, %err, "send failed");
                let _ = self
                    .store
                    .apply_transition(ChatPatch::MessageFailed { thread_id, client_message_id });
                Err(err.into())
            },
        }
    }

    /// Mark a message as read.
    ///
    /// # Errors
    ///
    /// - `ClientError::ThreadNotFound`, `MessageNotFound` if the message is
    ///   not in state
    /// - `ClientError::Sdk` if the receipt could not be sent
    pub fn send_read_receipt(&self, message_id: &str) -> Result<(), ClientError> {
        self.ensure_live()?;
        let thread_id = self.thread_id();
        let state = self.store.get_state();
        let thread = state
            .thread(&thread_id)
            .ok_or_else(|| ClientError::ThreadNotFound { thread_id: thread_id.clone() })?;
        if thread.message(message_id).is_none() {
            return Err(ClientError::MessageNotFound {
                thread_id,
                message_id: message_id.to_string(),
            });
        }
        Ok(self.sdk.send_read_receipt(message_id)?)
    }

    /// Tell the other participants the local user is typing.
    ///
    /// # Errors
    ///
    /// `ClientError::Sdk` if the notification could not be sent.
    pub fn send_typing_notification(&self) -> Result<(), ClientError> {
        self.ensure_live()?;
        Ok(self.sdk.send_typing_notification()?)
    }

    /// Change the topic. State follows the service notification.
    ///
    /// # Errors
    ///
    /// `ClientError::Sdk` if the update failed.
    pub fn update_topic(&self, topic: &str) -> Result<(), ClientError> {
        self.ensure_live()?;
        Ok(self.sdk.update_topic(topic)?)
    }

    /// Load message history and participants into state.
    ///
    /// # Errors
    ///
    /// `ClientError::Sdk` if either listing failed.
    pub fn fetch_messages(&self) -> Result<usize, ClientError> {
        self.ensure_live()?;
        let thread_id = self.thread_id();
        let messages: Vec<ChatMessageWithStatus> =
            self.sdk.list_messages()?.into_iter().map(ChatMessageWithStatus::from).collect();
        let participants = self.sdk.list_participants()?;
        let count = messages.len();
        tracing::debug!(%thread_id, count, "history fetched");

        let _ = self.store.apply_transition(ChatPatch::MessagesFetched {
            thread_id: thread_id.clone(),
            messages,
        });
        let _ =
            self.store.apply_transition(ChatPatch::ParticipantsAdded { thread_id, participants });
        Ok(count)
    }

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.store.is_disposed() {
            return Err(ClientError::Disposed);
        }
        Ok(())
    }

    fn next_client_message_id(&self) -> String {
        let counter = self.next_local_id.get();
        self.next_local_id.set(counter + 1);
        format!("{:016x}-{counter}", self.env.random_u64())
    }
}
