//! Selectors over the merged call and chat state.

use std::sync::Arc;

use prism_memo::{Selector, SelectorError, combine_selectors, selector_fn};

use super::CallWithChatProps;
use crate::state::{CallState, CallStatus, ChatThreadState, ClientState};

/// Header of a call with an attached chat thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallWithChatView {
    /// Call status; `None` once the call ended.
    pub status: Option<CallStatus>,
    /// Remote participants in the call.
    pub call_participant_count: usize,
    /// Thread topic.
    pub topic: Option<String>,
    /// Messages loaded in the thread.
    pub message_count: usize,
    /// Participants of the thread.
    pub chat_participant_count: usize,
}

const NAME: &str = "call_with_chat";

/// Call status and chat summary side by side.
///
/// The combiner only reruns when the call or the thread was replaced.
///
/// # Errors
///
/// Selecting against a [`ClientState`] that lacks the call or chat slice
/// fails with `SelectorError::Failed`.
pub fn call_with_chat_selector()
-> impl Selector<ClientState, CallWithChatProps, Output = Arc<CallWithChatView>> {
    let call = selector_fn("call_slice", |state: &ClientState, props: &CallWithChatProps| {
        let calls =
            state.call().ok_or_else(|| SelectorError::failed(NAME, "state has no call slice"))?;
        Ok(calls.call(&props.call_id).cloned())
    });
    let thread = selector_fn("thread_slice", |state: &ClientState, props: &CallWithChatProps| {
        let chat =
            state.chat().ok_or_else(|| SelectorError::failed(NAME, "state has no chat slice"))?;
        Ok(chat.thread(&props.thread_id).cloned())
    });

    combine_selectors(
        NAME,
        (call, thread),
        |(call, thread): &(Option<Arc<CallState>>, Option<Arc<ChatThreadState>>)| {
            Ok(Arc::new(CallWithChatView {
                status: call.as_ref().map(|call| call.state),
                call_participant_count: call
                    .as_ref()
                    .map_or(0, |call| call.remote_participants.len()),
                topic: thread.as_ref().and_then(|thread| thread.properties.topic.clone()),
                message_count: thread.as_ref().map_or(0, |thread| thread.messages.len()),
                chat_participant_count: thread
                    .as_ref()
                    .map_or(0, |thread| thread.participants.len()),
            }))
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        state::{CallClientState, ChatClientState},
        store::StateStore,
        transition::{CallPatch, ChatPatch},
    };

    fn props() -> CallWithChatProps {
        CallWithChatProps { call_id: "c1".to_string(), thread_id: "t1".to_string() }
    }

    #[test]
    fn combiner_skips_unrelated_changes() {
        let calls = StateStore::new(CallClientState::new("me"));
        let chats = StateStore::new(ChatClientState::new("me", None));
        let _ = calls.apply_transition(CallPatch::CallAdded {
            call: CallState::new("c1", CallStatus::Connected, 0),
        });
        let _ = chats.apply_transition(ChatPatch::ThreadAdded {
            thread_id: "t1".to_string(),
            topic: Some("standup".to_string()),
        });
        let mut selector = call_with_chat_selector();

        let merged = || ClientState::merge(calls.get_state(), chats.get_state());

        let first = selector.select(&merged(), &props()).unwrap();
        let _ = chats
            .apply_transition(ChatPatch::ThreadAdded { thread_id: "t2".to_string(), topic: None });
        let second = selector.select(&merged(), &props()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.topic.as_deref(), Some("standup"));
        assert_eq!(second.status, Some(CallStatus::Connected));
    }

    #[test]
    fn missing_slice_is_an_error() {
        let mut selector = call_with_chat_selector();
        let state = ClientState::Call(Arc::new(CallClientState::new("me")));

        let err = selector.select(&state, &props()).unwrap_err();

        assert!(matches!(err, SelectorError::Failed { selector: NAME, .. }));
    }
}
