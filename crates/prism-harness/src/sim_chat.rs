//! Simulated chat service.
//!
//! One [`SimChatClient`] plays both the service and the local user's
//! connection to it. Test code injects remote activity through its methods
//! (`receive_message`, `read_receipt`, `typing`, ...); the stateful client
//! talks to it through the SDK traits. Sends are echoed back as
//! `MessageReceived` notifications, as the real service does.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

use prism_core::{
    Environment, SdkError,
    sdk::{
        ChatClient, ChatEvent, ChatMessage, ChatThreadClient, EventEmitter, Listener, ListenerId,
        SentMessage,
    },
    state::{ChatMessageKind, ChatParticipant, MessageId, ParticipantId, ThreadId},
};

use crate::{
    emitter::{ListenerLedger, SimEmitter},
    sim_env::SimEnv,
};

/// Service-side thread.
#[derive(Debug)]
struct SimThread {
    topic: RefCell<Option<String>>,
    messages: RefCell<Vec<ChatMessage>>,
    participants: RefCell<Vec<ChatParticipant>>,
    next_sequence: Cell<u64>,
    fail_sends: Cell<bool>,
}

impl SimThread {
    fn new(topic: Option<String>) -> Self {
        Self {
            topic: RefCell::new(topic),
            messages: RefCell::new(Vec::new()),
            participants: RefCell::new(Vec::new()),
            next_sequence: Cell::new(1),
            fail_sends: Cell::new(false),
        }
    }

    fn next_sequence(&self) -> u64 {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        sequence
    }

    fn sequence_of(&self, message_id: &str) -> Option<u64> {
        self.messages
            .borrow()
            .iter()
            .find(|message| message.id == message_id)
            .map(|message| message.sequence_id)
    }
}

/// State shared by the chat client and its thread clients.
#[derive(Debug)]
struct Service {
    user_id: ParticipantId,
    display_name: Option<String>,
    env: SimEnv,
    threads: RefCell<BTreeMap<ThreadId, Rc<SimThread>>>,
    emitter: SimEmitter<ChatEvent>,
}

impl Service {
    fn thread(&self, thread_id: &str) -> Result<Rc<SimThread>, SdkError> {
        self.threads
            .borrow()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| SdkError::new(format!("thread {thread_id} does not exist")))
    }

    fn post(
        &self,
        thread_id: &str,
        sender_id: &str,
        sender_display_name: Option<String>,
        content: &str,
        client_message_id: Option<String>,
    ) -> Result<ChatMessage, SdkError> {
        let thread = self.thread(thread_id)?;
        let sequence_id = thread.next_sequence();
        let message = ChatMessage {
            id: format!("{thread_id}-msg-{sequence_id}"),
            sequence_id,
            created_on: self.env.now_millis(),
            sender_id: Some(sender_id.to_string()),
            sender_display_name,
            kind: ChatMessageKind::Text,
            content: content.to_string(),
            client_message_id,
            edited_on: None,
            deleted_on: None,
        };
        thread.messages.borrow_mut().push(message.clone());
        let event = ChatEvent::MessageReceived {
            thread_id: thread_id.to_string(),
            message: message.clone(),
        };
        let _ = self.emitter.emit(&event);
        Ok(message)
    }
}

/// Simulated chat client and service.
#[derive(Debug)]
pub struct SimChatClient {
    service: Rc<Service>,
    ledger: ListenerLedger,
}

impl SimChatClient {
    /// Client for `user_id`, timestamping with `env`.
    pub fn new(
        user_id: impl Into<ParticipantId>,
        display_name: Option<String>,
        env: SimEnv,
    ) -> Rc<Self> {
        let ledger = ListenerLedger::new();
        let service = Service {
            user_id: user_id.into(),
            display_name,
            env,
            threads: RefCell::new(BTreeMap::new()),
            emitter: SimEmitter::new(&ledger),
        };
        Rc::new(Self { service: Rc::new(service), ledger })
    }

    /// Ledger of the notification listeners.
    pub fn ledger(&self) -> &ListenerLedger {
        &self.ledger
    }

    /// Create a thread with the local user as its only participant.
    /// Returns false if it already exists.
    pub fn create_thread(&self, thread_id: &str, topic: Option<String>) -> bool {
        if self.service.threads.borrow().contains_key(thread_id) {
            return false;
        }
        let thread = SimThread::new(topic.clone());
        thread.participants.borrow_mut().push(ChatParticipant {
            id: self.service.user_id.clone(),
            display_name: self.service.display_name.clone(),
        });
        self.service.threads.borrow_mut().insert(thread_id.to_string(), Rc::new(thread));
        let event = ChatEvent::ThreadCreated { thread_id: thread_id.to_string(), topic };
        let _ = self.service.emitter.emit(&event);
        true
    }

    /// Delete a thread. Returns false if it does not exist.
    pub fn delete_thread(&self, thread_id: &str) -> bool {
        if self.service.threads.borrow_mut().remove(thread_id).is_none() {
            return false;
        }
        let event = ChatEvent::ThreadDeleted { thread_id: thread_id.to_string() };
        let _ = self.service.emitter.emit(&event);
        true
    }

    /// A remote participant posts a message.
    pub fn receive_message(
        &self,
        thread_id: &str,
        sender_id: &str,
        sender_display_name: Option<String>,
        content: &str,
    ) -> Result<MessageId, SdkError> {
        self.service
            .post(thread_id, sender_id, sender_display_name, content, None)
            .map(|message| message.id)
    }

    /// A message is edited. Returns false if it does not exist.
    pub fn edit_message(&self, thread_id: &str, message_id: &str, content: &str) -> bool {
        let edited_on = self.service.env.now_millis();
        let Ok(thread) = self.service.thread(thread_id) else {
            return false;
        };
        let found = thread
            .messages
            .borrow_mut()
            .iter_mut()
            .find(|message| message.id == message_id)
            .map(|message| {
                message.content = content.to_string();
                message.edited_on = Some(edited_on);
            })
            .is_some();
        if found {
            let _ = self.service.emitter.emit(&ChatEvent::MessageEdited {
                thread_id: thread_id.to_string(),
                message_id: message_id.to_string(),
                content: content.to_string(),
                edited_on,
            });
        }
        found
    }

    /// A message is deleted. Returns false if it does not exist.
    pub fn delete_message(&self, thread_id: &str, message_id: &str) -> bool {
        let deleted_on = self.service.env.now_millis();
        let Ok(thread) = self.service.thread(thread_id) else {
            return false;
        };
        let found = thread
            .messages
            .borrow_mut()
            .iter_mut()
            .find(|message| message.id == message_id)
            .map(|message| message.deleted_on = Some(deleted_on))
            .is_some();
        if found {
            let _ = self.service.emitter.emit(&ChatEvent::MessageDeleted {
                thread_id: thread_id.to_string(),
                message_id: message_id.to_string(),
                deleted_on,
            });
        }
        found
    }

    /// A remote participant reads up to `message_id`.
    pub fn read_receipt(
        &self,
        thread_id: &str,
        reader_id: &str,
        message_id: &str,
    ) -> Result<(), SdkError> {
        let thread = self.service.thread(thread_id)?;
        let sequence_id = thread
            .sequence_of(message_id)
            .ok_or_else(|| SdkError::new(format!("message {message_id} does not exist")))?;
        let _ = self.service.emitter.emit(&ChatEvent::ReadReceiptReceived {
            thread_id: thread_id.to_string(),
            sender_id: reader_id.to_string(),
            message_id: message_id.to_string(),
            sequence_id,
            read_on: self.service.env.now_millis(),
        });
        Ok(())
    }

    /// A remote participant is typing.
    pub fn typing(&self, thread_id: &str, sender_id: &str, sender_display_name: Option<String>) {
        let _ = self.service.emitter.emit(&ChatEvent::TypingIndicatorReceived {
            thread_id: thread_id.to_string(),
            sender_id: sender_id.to_string(),
            sender_display_name,
            received_on: self.service.env.now_millis(),
        });
    }

    /// Participants join.
    pub fn add_participants(
        &self,
        thread_id: &str,
        participants: Vec<ChatParticipant>,
    ) -> Result<(), SdkError> {
        let thread = self.service.thread(thread_id)?;
        thread.participants.borrow_mut().extend(participants.iter().cloned());
        let _ = self
            .service
            .emitter
            .emit(&ChatEvent::ParticipantsAdded { thread_id: thread_id.to_string(), participants });
        Ok(())
    }

    /// Participants leave.
    pub fn remove_participants(
        &self,
        thread_id: &str,
        participant_ids: Vec<ParticipantId>,
    ) -> Result<(), SdkError> {
        let thread = self.service.thread(thread_id)?;
        thread
            .participants
            .borrow_mut()
            .retain(|participant| !participant_ids.contains(&participant.id));
        let event =
            ChatEvent::ParticipantsRemoved { thread_id: thread_id.to_string(), participant_ids };
        let _ = self.service.emitter.emit(&event);
        Ok(())
    }

    /// Make sends to `thread_id` fail until switched back.
    pub fn fail_sends(&self, thread_id: &str, fail: bool) -> Result<(), SdkError> {
        self.service.thread(thread_id)?.fail_sends.set(fail);
        Ok(())
    }

    /// Messages the service holds for `thread_id`.
    pub fn messages(&self, thread_id: &str) -> Vec<ChatMessage> {
        self.service
            .thread(thread_id)
            .map(|thread| thread.messages.borrow().clone())
            .unwrap_or_default()
    }
}

impl EventEmitter<ChatEvent> for SimChatClient {
    fn on(&self, listener: Listener<ChatEvent>) -> ListenerId {
        self.service.emitter.on(listener)
    }

    fn off(&self, id: ListenerId) -> bool {
        self.service.emitter.off(id)
    }
}

impl ChatClient for SimChatClient {
    fn user_id(&self) -> ParticipantId {
        self.service.user_id.clone()
    }

    fn get_chat_thread_client(
        &self,
        thread_id: &str,
    ) -> Result<Rc<dyn ChatThreadClient>, SdkError> {
        let _ = self.service.thread(thread_id)?;
        let client = SimChatThreadClient {
            service: Rc::clone(&self.service),
            thread_id: thread_id.to_string(),
        };
        Ok(Rc::new(client) as Rc<dyn ChatThreadClient>)
    }
}

/// Local user's handle on one simulated thread.
#[derive(Debug)]
pub struct SimChatThreadClient {
    service: Rc<Service>,
    thread_id: ThreadId,
}

impl ChatThreadClient for SimChatThreadClient {
    fn thread_id(&self) -> ThreadId {
        self.thread_id.clone()
    }

    fn send_message(
        &self,
        content: &str,
        client_message_id: &str,
    ) -> Result<SentMessage, SdkError> {
        if self.service.thread(&self.thread_id)?.fail_sends.get() {
            return Err(SdkError::new("send rejected by service"));
        }
        let message = self.service.post(
            &self.thread_id,
            &self.service.user_id,
            self.service.display_name.clone(),
            content,
            Some(client_message_id.to_string()),
        )?;
        Ok(SentMessage { id: message.id, sequence_id: message.sequence_id })
    }

    fn send_read_receipt(&self, message_id: &str) -> Result<(), SdkError> {
        let thread = self.service.thread(&self.thread_id)?;
        let sequence_id = thread
            .sequence_of(message_id)
            .ok_or_else(|| SdkError::new(format!("message {message_id} does not exist")))?;
        let _ = self.service.emitter.emit(&ChatEvent::ReadReceiptReceived {
            thread_id: self.thread_id.clone(),
            sender_id: self.service.user_id.clone(),
            message_id: message_id.to_string(),
            sequence_id,
            read_on: self.service.env.now_millis(),
        });
        Ok(())
    }

    fn send_typing_notification(&self) -> Result<(), SdkError> {
        let _ = self.service.thread(&self.thread_id)?;
        let _ = self.service.emitter.emit(&ChatEvent::TypingIndicatorReceived {
            thread_id: self.thread_id.clone(),
            sender_id: self.service.user_id.clone(),
            sender_display_name: self.service.display_name.clone(),
            received_on: self.service.env.now_millis(),
        });
        Ok(())
    }

    fn update_topic(&self, topic: &str) -> Result<(), SdkError> {
        let thread = self.service.thread(&self.thread_id)?;
        thread.topic.replace(Some(topic.to_string()));
        let _ = self.service.emitter.emit(&ChatEvent::ThreadPropertiesUpdated {
            thread_id: self.thread_id.clone(),
            topic: Some(topic.to_string()),
        });
        Ok(())
    }

    fn list_messages(&self) -> Result<Vec<ChatMessage>, SdkError> {
        Ok(self.service.thread(&self.thread_id)?.messages.borrow().clone())
    }

    fn list_participants(&self) -> Result<Vec<ChatParticipant>, SdkError> {
        Ok(self.service.thread(&self.thread_id)?.participants.borrow().clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn recording(client: &SimChatClient) -> Rc<RefCell<Vec<ChatEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let _ = client.on(Box::new(move |event: &ChatEvent| sink.borrow_mut().push(event.clone())));
        events
    }

    #[test]
    fn send_is_echoed_with_client_id() {
        let client = SimChatClient::new("me", Some("Me".to_string()), SimEnv::with_seed(1));
        assert!(client.create_thread("t1", None));
        let events = recording(&client);
        let thread = client.get_chat_thread_client("t1").unwrap();

        let sent = thread.send_message("hi", "local-1").unwrap();

        assert_eq!(sent.sequence_id, 1);
        let events = events.borrow();
        let [ChatEvent::MessageReceived { message, .. }] = events.as_slice() else {
            panic!("expected one echo, got {events:?}");
        };
        assert_eq!(message.id, sent.id);
        assert_eq!(message.client_message_id.as_deref(), Some("local-1"));
    }

    #[test]
    fn failing_thread_rejects_sends() {
        let client = SimChatClient::new("me", None, SimEnv::with_seed(1));
        let _ = client.create_thread("t1", None);
        client.fail_sends("t1", true).unwrap();
        let thread = client.get_chat_thread_client("t1").unwrap();

        assert!(thread.send_message("hi", "local-1").is_err());
        assert!(client.messages("t1").is_empty());
    }

    #[test]
    fn unknown_thread_is_an_error() {
        let client = SimChatClient::new("me", None, SimEnv::with_seed(1));

        assert!(client.get_chat_thread_client("nope").is_err());
        assert!(client.read_receipt("nope", "bo", "m1").is_err());
    }
}
