//! Stateful chat client against the simulated service.

use std::{rc::Rc, sync::Arc};

use prism_core::{
    ChatClientConfig, ClientError, Environment, StatefulChatClient, create_stateful_chat_client,
    sdk::ChatClient,
    selectors::{
        MessageThreadSelector, MessageViewStatus, ThreadProps, TypingProps,
        typing_indicator_selector,
    },
    state::{ChatParticipant, MessageStatus},
};
use prism_harness::{SimChatClient, SimEnv};
use prism_memo::Selector;

const TTL_MS: u64 = 5_000;

fn setup() -> (Rc<SimChatClient>, StatefulChatClient<SimEnv>, SimEnv) {
    let env = SimEnv::with_seed(5);
    let service = SimChatClient::new("me", Some("Me".to_string()), env.clone());
    let client = create_stateful_chat_client(
        Rc::clone(&service) as Rc<dyn ChatClient>,
        Some("Me".to_string()),
        env.clone(),
        ChatClientConfig { typing_indicator_ttl_ms: TTL_MS, ..ChatClientConfig::default() },
    );
    assert!(service.create_thread("t1", Some("standup".to_string())));
    (service, client, env)
}

fn thread_props() -> ThreadProps {
    ThreadProps { thread_id: "t1".to_string() }
}

#[test]
fn created_thread_appears_in_state() {
    let (_service, client, _env) = setup();

    let state = client.get_state();
    let thread = state.thread("t1").unwrap();

    assert_eq!(thread.properties.topic.as_deref(), Some("standup"));
}

#[test]
fn send_resolves_to_single_delivered_message() {
    let (service, client, _env) = setup();
    let thread = client.get_chat_thread_client("t1").unwrap();

    let id = thread.send_message("hello").unwrap();

    let state = client.get_state();
    let messages = &state.thread("t1").unwrap().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].status, MessageStatus::Delivered);
    assert_eq!(service.messages("t1").len(), 1);
}

#[test]
fn failed_send_keeps_failed_placeholder() {
    let (service, client, _env) = setup();
    service.fail_sends("t1", true).unwrap();
    let thread = client.get_chat_thread_client("t1").unwrap();

    let err = thread.send_message("lost").unwrap_err();

    assert!(matches!(err, ClientError::Sdk { .. }));
    let state = client.get_state();
    let messages = &state.thread("t1").unwrap().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, MessageStatus::Failed);
    assert_eq!(messages[0].content, "lost");
}

#[test]
fn client_message_ids_are_unique() {
    let (service, client, _env) = setup();
    let thread = client.get_chat_thread_client("t1").unwrap();

    for n in 0..5 {
        let _ = thread.send_message(&format!("message {n}")).unwrap();
    }

    let mut ids: Vec<_> =
        service.messages("t1").into_iter().filter_map(|m| m.client_message_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[test]
fn remote_read_receipt_marks_message_seen() {
    let (service, client, _env) = setup();
    let thread = client.get_chat_thread_client("t1").unwrap();
    let mine = thread.send_message("did you see this").unwrap();
    let _ = service.receive_message("t1", "bo", Some("Bo".to_string()), "reply").unwrap();
    let mut selector = MessageThreadSelector::new();

    let before = selector.select(&client.get_state(), &thread_props()).unwrap().unwrap();
    service.read_receipt("t1", "bo", &mine).unwrap();
    let after = selector.select(&client.get_state(), &thread_props()).unwrap().unwrap();

    assert_eq!(before[0].status, Some(MessageViewStatus::Delivered));
    assert_eq!(after[0].status, Some(MessageViewStatus::Seen));
    assert_eq!(after[1].status, None);
    assert!(Arc::ptr_eq(&before[1], &after[1]));
}

#[test]
fn own_read_receipt_requires_known_message() {
    let (_service, client, _env) = setup();
    let thread = client.get_chat_thread_client("t1").unwrap();

    let err = thread.send_read_receipt("nope").unwrap_err();

    assert!(matches!(err, ClientError::MessageNotFound { .. }));
}

#[test]
fn typing_indicator_expires() {
    let (service, client, env) = setup();
    service.typing("t1", "bo", Some("Bo".to_string()));
    client.get_chat_thread_client("t1").unwrap().send_typing_notification().unwrap();
    let mut selector = typing_indicator_selector(TTL_MS);
    let props = |now_millis| TypingProps { thread_id: "t1".to_string(), now_millis };

    let typing = selector.select(&client.get_state(), &props(env.now_millis())).unwrap();
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].display_name.as_deref(), Some("Bo"));

    env.advance(TTL_MS + 1);
    let typing = selector.select(&client.get_state(), &props(env.now_millis())).unwrap();
    assert!(typing.is_empty());
}

#[test]
fn fetch_loads_history_and_participants() {
    let (service, client, _env) = setup();
    let bo = ChatParticipant { id: "bo".to_string(), display_name: Some("Bo".to_string()) };
    service.add_participants("t1", vec![bo]).unwrap();
    for n in 0..3 {
        let _ = service.receive_message("t1", "bo", None, &format!("old {n}")).unwrap();
    }

    let count = client.get_chat_thread_client("t1").unwrap().fetch_messages().unwrap();

    assert_eq!(count, 3);
    let state = client.get_state();
    let thread = state.thread("t1").unwrap();
    assert_eq!(thread.messages.len(), 3);
    assert!(thread.participants.contains_key("bo"));
    assert!(thread.participants.contains_key("me"));
}

#[test]
fn edits_and_deletes_are_projected() {
    let (service, client, _env) = setup();
    let id = service.receive_message("t1", "bo", None, "typo").unwrap();

    assert!(service.edit_message("t1", &id, "fixed"));
    let edited = client.get_state().thread("t1").unwrap().message(&id).unwrap().clone();
    assert_eq!(edited.content, "fixed");
    assert!(edited.edited_on.is_some());

    assert!(service.delete_message("t1", &id));
    let deleted = client.get_state().thread("t1").unwrap().message(&id).unwrap().clone();
    assert!(deleted.content.is_empty());
    assert!(deleted.deleted_on.is_some());
}

#[test]
fn dispose_detaches_and_rejects_commands() {
    let (service, client, _env) = setup();
    assert_eq!(service.ledger().attached(), client.tracked_count());

    client.dispose();

    assert_eq!(service.ledger().attached(), 0);
    assert!(matches!(client.get_chat_thread_client("t1"), Err(ClientError::Disposed)));
}
