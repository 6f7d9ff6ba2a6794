//! Property tests for snapshot sharing and selector invalidation.
//!
//! Random sequences of participant patches are applied to a call with a
//! fixed roster. After every patch the new snapshot is compared with the
//! previous one by pointer identity.

use std::sync::Arc;

use prism_core::{
    CallPatch, StateStore, TransitionOutcome,
    selectors::{ParticipantProps, is_muted_selector},
    state::{CallClientState, CallState, CallStatus, RemoteParticipantState},
};
use prism_memo::Selector;
use proptest::{prelude::*, test_runner::TestCaseError};

const ROSTER: u8 = 4;

#[derive(Debug, Clone)]
enum Change {
    Mute(u8, bool),
    Speak(u8, bool),
    Rename(u8, Option<u8>),
    Status(u8, bool),
}

impl Change {
    fn target(&self) -> u8 {
        match self {
            Self::Mute(p, _) | Self::Speak(p, _) | Self::Rename(p, _) | Self::Status(p, _) => *p,
        }
    }

    fn into_patch(self) -> CallPatch {
        let call_id = "c1".to_string();
        match self {
            Self::Mute(p, is_muted) => {
                CallPatch::ParticipantMutedChanged { call_id, participant_id: pid(p), is_muted }
            },
            Self::Speak(p, is_speaking) => {
                CallPatch::ParticipantSpeakingChanged {
                    call_id,
                    participant_id: pid(p),
                    is_speaking,
                }
            },
            Self::Rename(p, name) => CallPatch::ParticipantDisplayNameChanged {
                call_id,
                participant_id: pid(p),
                display_name: name.map(|n| format!("name-{n}")),
            },
            Self::Status(p, on_hold) => CallPatch::ParticipantStatusChanged {
                call_id,
                participant_id: pid(p),
                status: if on_hold { CallStatus::Hold } else { CallStatus::Connected },
            },
        }
    }
}

fn pid(p: u8) -> String {
    format!("p{p}")
}

/// Participant ids past the roster exercise the absent-target path.
fn change_strategy() -> impl Strategy<Value = Change> {
    let target = 0..ROSTER + 2;
    prop_oneof![
        (target.clone(), any::<bool>()).prop_map(|(p, v)| Change::Mute(p, v)),
        (target.clone(), any::<bool>()).prop_map(|(p, v)| Change::Speak(p, v)),
        (target.clone(), prop::option::of(0u8..2)).prop_map(|(p, v)| Change::Rename(p, v)),
        (target, any::<bool>()).prop_map(|(p, v)| Change::Status(p, v)),
    ]
}

fn call_store() -> StateStore<CallClientState> {
    let store = StateStore::new(CallClientState::new("me"));
    let call = CallState::new("c1", CallStatus::Connected, 0);
    let _ = store.apply_transition(CallPatch::CallAdded { call });
    let _ = store.apply_transition(CallPatch::ParticipantsUpdated {
        call_id: "c1".to_string(),
        added: (0..ROSTER).map(|p| RemoteParticipantState::new(pid(p))).collect(),
        removed: Vec::new(),
        max_ended: 4,
    });
    store
}

fn participant(state: &CallClientState, p: u8) -> Option<Arc<RemoteParticipantState>> {
    state.participant("c1", &pid(p)).cloned()
}

proptest! {
    /// PROPERTY: a patch replaces exactly the participant it targets, and
    /// only when it changes something; the root is replaced iff the patch
    /// applied, and the version counts applied patches.
    #[test]
    fn prop_patch_replaces_only_its_target(
        changes in prop::collection::vec(change_strategy(), 1..40),
    ) {
        let store = call_store();

        for change in changes {
            let before = store.get_state();
            let version = store.version();
            let target = change.target();

            let outcome = store.apply_transition(change.into_patch());
            let after = store.get_state();

            match outcome {
                TransitionOutcome::Applied { version: applied } => {
                    prop_assert!(!Arc::ptr_eq(&before, &after));
                    prop_assert_eq!(applied, version + 1);
                    prop_assert!(target < ROSTER);
                },
                TransitionOutcome::Unchanged => {
                    prop_assert!(Arc::ptr_eq(&before, &after));
                    prop_assert_eq!(store.version(), version);
                },
                TransitionOutcome::Deferred => prop_assert!(false, "no subscriber can defer"),
            }

            for p in 0..ROSTER {
                let (old, new) = (participant(&before, p), participant(&after, p));
                let same = matches!((&old, &new), (Some(a), Some(b)) if Arc::ptr_eq(a, b));
                if p == target && outcome.is_applied() {
                    prop_assert!(!same);
                } else {
                    prop_assert!(same);
                }
            }
        }
    }

    /// PROPERTY: a selector reading one participant recomputes exactly when
    /// that participant's node was replaced.
    #[test]
    fn prop_selector_recomputes_only_for_its_participant(
        changes in prop::collection::vec(change_strategy(), 1..40),
    ) {
        let store = call_store();
        let mut selector = is_muted_selector();
        let props = ParticipantProps { call_id: "c1".to_string(), participant_id: pid(0) };

        let _ = selector.select(&store.get_state(), &props);
        let mut expected_misses = 1;

        for change in changes {
            let before = participant(&store.get_state(), 0);
            let _ = store.apply_transition(change.into_patch());
            let after = participant(&store.get_state(), 0);

            if !matches!((&before, &after), (Some(a), Some(b)) if Arc::ptr_eq(a, b)) {
                expected_misses += 1;
            }
            let muted = selector
                .select(&store.get_state(), &props)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(muted, after.map(|p| p.is_muted));
        }

        let stats = selector
            .stats()
            .ok_or_else(|| TestCaseError::fail("cached selector has stats"))?;
        prop_assert_eq!(stats.misses, expected_misses);
    }
}

#[test]
fn patch_for_absent_participant_keeps_root() {
    let store = call_store();
    let before = store.get_state();

    let outcome = store.apply_transition(CallPatch::ParticipantMutedChanged {
        call_id: "c1".to_string(),
        participant_id: "ghost".to_string(),
        is_muted: true,
    });

    assert_eq!(outcome, TransitionOutcome::Unchanged);
    assert!(Arc::ptr_eq(&before, &store.get_state()));
}

#[test]
fn muting_one_participant_shares_the_other() {
    let store = call_store();
    let before = store.get_state();

    let _ = store.apply_transition(CallPatch::ParticipantMutedChanged {
        call_id: "c1".to_string(),
        participant_id: pid(1),
        is_muted: true,
    });
    let after = store.get_state();

    let (Some(p1_before), Some(p1_after)) = (participant(&before, 1), participant(&after, 1)) else {
        panic!("p1 missing");
    };
    let (Some(p2_before), Some(p2_after)) = (participant(&before, 2), participant(&after, 2)) else {
        panic!("p2 missing");
    };
    assert!(!Arc::ptr_eq(&p1_before, &p1_after));
    assert!(p1_after.is_muted);
    assert!(Arc::ptr_eq(&p2_before, &p2_after));
    assert!(Arc::ptr_eq(&before.device_manager, &after.device_manager));
}
