//! Chat selectors.

use std::{collections::BTreeMap, sync::Arc};

use prism_memo::{
    BulkMemoizer, CacheStats, MemoError, Selector, SelectorCache, SelectorError, create_selector,
};

use super::{ThreadProps, TypingProps};
use crate::state::{
    ChatClientState, ChatMessageKind, ChatMessageWithStatus, ChatParticipant, MessageId,
    MessageStatus, ParticipantId, ReadMarker, ThreadId, TypingIndicator,
};

/// Delivery state shown next to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageViewStatus {
    /// Waiting for the service.
    Sending,
    /// Accepted by the service.
    Delivered,
    /// Read by at least one other participant.
    Seen,
    /// Send failed.
    Failed,
}

/// Row of the message thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    /// Message id; the client message id while sending.
    pub id: MessageId,
    /// Message kind.
    pub kind: ChatMessageKind,
    /// Text; empty once deleted.
    pub content: String,
    /// Author name.
    pub sender_display_name: Option<String>,
    /// Creation time in milliseconds.
    pub created_on: u64,
    /// Authored by the local user.
    pub mine: bool,
    /// Delivery state. `None` for other people's messages.
    pub status: Option<MessageViewStatus>,
    /// Edited at least once.
    pub edited: bool,
    /// Deleted.
    pub deleted: bool,
}

type MessageArgs = (Arc<ChatMessageWithStatus>, bool, bool);
type MessageViewFn = fn(&MessageId, &MessageArgs) -> Arc<MessageView>;
type Messages = Arc<Vec<Arc<ChatMessageWithStatus>>>;
type ReadMarkers = Arc<BTreeMap<ParticipantId, ReadMarker>>;
type ThreadInput = (ThreadId, ParticipantId, Option<(Messages, ReadMarkers)>);

fn message_view(id: &MessageId, (message, mine, seen): &MessageArgs) -> Arc<MessageView> {
    let status = mine.then(|| match message.status {
        MessageStatus::Sending => MessageViewStatus::Sending,
        MessageStatus::Failed => MessageViewStatus::Failed,
        MessageStatus::Delivered if *seen => MessageViewStatus::Seen,
        MessageStatus::Delivered => MessageViewStatus::Delivered,
    });
    Arc::new(MessageView {
        id: id.clone(),
        kind: message.kind,
        content: message.content.clone(),
        sender_display_name: message.sender_display_name.clone(),
        created_on: message.created_on,
        mine: *mine,
        status,
        edited: message.edited_on.is_some(),
        deleted: message.deleted_on.is_some(),
    })
}

/// Highest sequence id read by anyone but `user_id`.
fn others_read_up_to(markers: &BTreeMap<ParticipantId, ReadMarker>, user_id: &str) -> Option<u64> {
    markers
        .iter()
        .filter(|(reader, _)| reader.as_str() != user_id)
        .map(|(_, marker)| marker.sequence_id)
        .max()
}

/// Message list of one thread in display order.
///
/// Rows are memoized per message id on `(message, mine, seen)`: a new read
/// receipt rebuilds only the rows whose seen flag flips.
pub struct MessageThreadSelector {
    thread: SelectorCache<ThreadInput, Option<Arc<Vec<Arc<MessageView>>>>>,
    rows: BulkMemoizer<MessageId, MessageArgs, Arc<MessageView>, MessageViewFn>,
}

impl Default for MessageThreadSelector {
    fn default() -> Self {
        Self {
            thread: SelectorCache::new(),
            rows: BulkMemoizer::new(message_view as MessageViewFn),
        }
    }
}

impl MessageThreadSelector {
    /// Fresh selector with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of the per-row memoizer.
    pub fn row_stats(&self) -> CacheStats {
        self.rows.stats()
    }
}

impl Selector<ChatClientState, ThreadProps> for MessageThreadSelector {
    type Output = Option<Arc<Vec<Arc<MessageView>>>>;

    fn select(
        &mut self,
        state: &ChatClientState,
        props: &ThreadProps,
    ) -> Result<Self::Output, SelectorError> {
        let slice = state
            .thread(&props.thread_id)
            .map(|thread| (Arc::clone(&thread.messages), Arc::clone(&thread.read_markers)));
        let rows = &mut self.rows;
        self.thread.try_get_or_compute(
            (props.thread_id.clone(), state.user_id.clone(), slice),
            |(_, user_id, slice): &ThreadInput| -> Result<Self::Output, SelectorError> {
                let Some((messages, markers)) = slice else {
                    rows.run_round(|_| Ok::<_, MemoError>(()))?;
                    return Ok(None);
                };
                let read_up_to = others_read_up_to(markers, user_id);

                let views = rows.run_round(|round| {
                    messages
                        .iter()
                        .map(|message| {
                            let mine = message.sender_id.as_deref() == Some(user_id.as_str());
                            let seen = matches!(
                                (message.sequence_id, read_up_to),
                                (Some(seq), Some(read)) if read >= seq
                            );
                            round.call(message.id.clone(), (Arc::clone(message), mine, seen))
                        })
                        .collect::<Result<Vec<_>, MemoError>>()
                })?;
                Ok(Some(Arc::new(views)))
            },
        )
    }

    fn name(&self) -> &'static str {
        "message_thread"
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(self.thread.stats())
    }
}

/// Someone currently typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    /// Participant id.
    pub id: ParticipantId,
    /// Name, from the notification or the participant list.
    pub display_name: Option<String>,
}

type TypingInput = (
    ThreadId,
    u64,
    ParticipantId,
    Option<(Arc<Vec<TypingIndicator>>, Arc<BTreeMap<ParticipantId, Arc<ChatParticipant>>>)>,
);

/// Participants typing in a thread, most recent first.
///
/// Indicators older than `ttl_ms` at `props.now_millis` and the local user's
/// own echo are dropped.
pub fn typing_indicator_selector(
    ttl_ms: u64,
) -> impl Selector<ChatClientState, TypingProps, Output = Arc<Vec<TypingUser>>> {
    create_selector(
        "typing_indicators",
        |state: &ChatClientState, props: &TypingProps| -> TypingInput {
            let slice = state
                .thread(&props.thread_id)
                .map(|thread| {
                    (Arc::clone(&thread.typing_indicators), Arc::clone(&thread.participants))
                });
            (props.thread_id.clone(), props.now_millis, state.user_id.clone(), slice)
        },
        move |(_, now, user_id, slice): &TypingInput| {
            let Some((indicators, participants)) = slice else {
                return Ok(Arc::default());
            };
            let mut live: Vec<&TypingIndicator> = indicators
                .iter()
                .filter(|indicator| &indicator.sender_id != user_id)
                .filter(|indicator| indicator.received_on.saturating_add(ttl_ms) >= *now)
                .collect();
            live.sort_by(|a, b| b.received_on.cmp(&a.received_on));

            Ok(Arc::new(
                live.into_iter()
                    .map(|indicator| TypingUser {
                        id: indicator.sender_id.clone(),
                        display_name: indicator.sender_display_name.clone().or_else(|| {
                            participants
                                .get(&indicator.sender_id)
                                .and_then(|participant| participant.display_name.clone())
                        }),
                    })
                    .collect::<Vec<_>>(),
            ))
        },
    )
}
