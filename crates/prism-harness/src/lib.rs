//! Deterministic simulation harness for the prism state projection.
//!
//! In-memory implementations of the calling and chat SDK traits, driven by a
//! seeded clock and RNG so every run is reproducible. The simulated objects
//! count their registered listeners in a shared [`ListenerLedger`], which
//! lets tests check that the bridge detaches exactly what it attached.
//!
//! # Model-Based Testing
//!
//! The `model` module drives a simulated call graph and a stateful client
//! with the same operations, then compares the graph's observable state with
//! the projected snapshot.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod emitter;
pub mod model;
pub mod sim_call;
pub mod sim_chat;
pub mod sim_env;

pub use emitter::{ListenerLedger, SimEmitter};
pub use model::{
    CallWorld, ObservableCall, ObservableCalls, ObservableParticipant, Operation, OperationResult,
    WorldConfig,
};
pub use sim_call::{
    SimCall, SimCallAgent, SimCallClient, SimDeviceManager, SimParticipant, SimStream,
};
pub use sim_chat::{SimChatClient, SimChatThreadClient};
pub use sim_env::SimEnv;
