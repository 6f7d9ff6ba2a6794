//! Fuzz target for the call event bridge
//!
//! Keep the projected snapshot and the listener set in lockstep with the SDK
//! object graph under arbitrary churn
//!
//! # Strategy
//!
//! - Operation sequences: calls, participants and streams appearing and
//!   disappearing in any order
//! - Redundant operations: setters that do not change anything, leaves of
//!   absent participants, removals of absent streams
//! - Disposal: optionally dispose the client midway and keep mutating
//!
//! # Invariants
//!
//! - Projected active calls equal the simulated graph after every operation
//! - Attached listeners equal tracked objects after every operation
//! - A no-op operation never replaces the snapshot
//! - After dispose: zero listeners, snapshot frozen
//! - NEVER panic on any operation order

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prism_harness::{CallWorld, Operation, OperationResult, WorldConfig};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    seed: u64,
    roster: u8,
    dispose_after: Option<u8>,
    operations: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let config =
        WorldConfig { seed: input.seed, roster: input.roster % 8 + 1, ..WorldConfig::default() };
    let Ok(mut world) = CallWorld::new(config) else {
        return;
    };
    let mut disposed = false;

    for (i, op) in input.operations.iter().enumerate() {
        if input.dispose_after.is_some_and(|n| usize::from(n) == i) {
            world.client().dispose();
            disposed = true;
            assert_eq!(world.attached_listeners(), 0);
        }

        let before = world.client().get_state();
        let result = world.apply(op);
        let after = world.client().get_state();

        if disposed {
            assert!(Arc::ptr_eq(&before, &after));
            assert_eq!(world.attached_listeners(), 0);
            continue;
        }

        if result == OperationResult::NoEffect {
            assert!(Arc::ptr_eq(&before, &after), "{op:?} replaced the snapshot");
        }
        assert_eq!(world.projected_view(), world.sdk_view(), "diverged after {op:?}");
        assert_eq!(world.attached_listeners(), world.client().tracked_count());
    }
});
