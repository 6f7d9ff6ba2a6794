//! Model-based testing of the call projection.
//!
//! The simulated SDK graph is the reference: after every [`Operation`] the
//! projected snapshot must describe exactly what the graph holds.
//!
//! ## Components
//!
//! - [`Operation`]: actions on the simulated call graph
//! - [`CallWorld`]: the graph plus a stateful client observing it
//! - [`ObservableCalls`]: the comparable subset of both sides

mod operation;
mod world;

pub use operation::{Operation, OperationResult};
pub use world::{CallWorld, ObservableCall, ObservableCalls, ObservableParticipant, WorldConfig};
