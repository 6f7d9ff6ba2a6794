//! Immutable state projection of event-driven calling and chat SDKs.
//!
//! SDK objects mutate in place and report changes through callbacks. This
//! crate mirrors them into snapshots that never change after they are
//! published, so view models can be derived by memoized selectors that
//! detect change by pointer identity.
//!
//! ## Architecture
//!
//! ```text
//! SDK objects ──events──▶ EventBridge ──patch──▶ StateStore ──snapshot──▶ subscribers
//!                                                                 │
//!                                              ViewBinding ◀──────┘
//!                                                  │
//!                                                  └─ Selector (SelectorCache / BulkMemoizer)
//! ```
//!
//! - [`client`]: stateful call and chat clients wrapping the SDK
//! - [`bridge`]: listener tracking and event to patch translation
//! - [`store`]: snapshot holder, transitions, subscriptions
//! - [`transition`]: the patches that build new snapshots
//! - [`selectors`]: view-model selectors
//! - [`binding`]: component-side re-render decisions
//!
//! Everything runs on one thread. Snapshots are `Arc`-shared so they can be
//! handed to other threads for reading, but stores, bridges and clients are
//! `!Send`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binding;
pub mod bridge;
pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod sdk;
pub mod selectors;
pub mod state;
pub mod store;
pub mod transition;

pub use binding::{ViewBinding, subscribe_binding};
pub use bridge::{CallBridge, ChatBridge, TrackedObject};
pub use client::{
    StatefulCallClient, StatefulChatClient, StatefulChatThreadClient, create_stateful_call_client,
    create_stateful_chat_client,
};
pub use config::{CallClientConfig, ChatClientConfig};
pub use env::{Environment, SystemEnv};
pub use error::{ClientError, SdkError};
pub use state::ClientState;
pub use store::{StateStore, SubscriptionId, Transition, TransitionOutcome, transition_fn};
pub use transition::{CallPatch, ChatPatch};
