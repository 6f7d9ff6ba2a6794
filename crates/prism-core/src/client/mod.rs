//! Stateful client facades.
//!
//! A stateful client wraps an SDK client, owns the [`StateStore`] mirroring
//! it and the bridge feeding that store. Commands that only affect the local
//! projection (video views, camera choice, optimistic sends) are applied as
//! transitions here; everything else arrives through SDK events.
//!
//! [`StateStore`]: crate::store::StateStore

mod call;
mod chat;

pub use call::{StatefulCallClient, create_stateful_call_client};
pub use chat::{StatefulChatClient, StatefulChatThreadClient, create_stateful_chat_client};
