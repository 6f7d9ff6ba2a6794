//! Call world: a simulated SDK graph and the client projecting it.
//!
//! The graph is the oracle. Operations mutate it through the simulated
//! objects' setters; the client only learns about changes through the
//! events those setters emit. Comparing [`CallWorld::sdk_view`] with
//! [`CallWorld::projected_view`] checks the whole event bridge.

use std::{collections::BTreeMap, rc::Rc};

use prism_core::{
    CallClientConfig, ClientError, SdkError, StatefulCallClient, create_stateful_call_client,
    sdk::{Call, CallClient, RemoteParticipant, RemoteVideoStream},
    state::{CallClientState, CallId, CallStatus, MediaStreamType, ParticipantId, StreamId},
};

use super::operation::{CallSlot, Operation, OperationResult, ParticipantSlot, StreamSlot};
use crate::{
    sim_call::{SimCall, SimCallAgent, SimCallClient, SimParticipant, SimStream},
    sim_env::SimEnv,
};

/// Parameters of a [`CallWorld`].
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    /// Seed of the simulated environment.
    pub seed: u64,
    /// Distinct remote participants that can join a call.
    pub roster: u8,
    /// Active calls allowed at once.
    pub max_calls: usize,
    /// Distinct stream ids per participant.
    pub max_streams: u8,
    /// Configuration of the stateful client.
    pub client: CallClientConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            roster: 6,
            max_calls: 3,
            max_streams: 3,
            client: CallClientConfig::default(),
        }
    }
}

/// Comparable state of a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableParticipant {
    /// Display name.
    pub display_name: Option<String>,
    /// Lifecycle state.
    pub state: CallStatus,
    /// Microphone muted.
    pub is_muted: bool,
    /// Speaking.
    pub is_speaking: bool,
    /// Streams by id: kind and availability.
    pub streams: BTreeMap<StreamId, (MediaStreamType, bool)>,
}

/// Comparable state of an active call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableCall {
    /// Lifecycle state.
    pub status: CallStatus,
    /// Local microphone muted.
    pub is_muted: bool,
    /// Local screen share on.
    pub is_screen_sharing_on: bool,
    /// Recording on.
    pub is_recording_active: bool,
    /// Dominant speakers, most dominant first.
    pub dominant_speakers: Vec<ParticipantId>,
    /// Remote participants by id.
    pub participants: BTreeMap<ParticipantId, ObservableParticipant>,
}

/// Active calls by id.
pub type ObservableCalls = BTreeMap<CallId, ObservableCall>;

/// Simulated call graph observed by a [`StatefulCallClient`].
pub struct CallWorld {
    config: WorldConfig,
    env: SimEnv,
    sdk: Rc<SimCallClient>,
    agent: Rc<SimCallAgent>,
    client: StatefulCallClient<SimEnv>,
}

impl CallWorld {
    /// Build the graph and a client tracking its agent and device manager.
    pub fn new(config: WorldConfig) -> Result<Self, ClientError> {
        let env = SimEnv::with_seed(config.seed);
        let sdk = SimCallClient::new("local-user");
        let client = create_stateful_call_client(
            Rc::clone(&sdk) as Rc<dyn CallClient>,
            env.clone(),
            config.client,
        );
        let _ = client.create_call_agent(Some("Local User".to_string()))?;
        let _ = client.get_device_manager()?;
        let agent = sdk.agent().ok_or_else(|| SdkError::new("call agent was not created"))?;
        Ok(Self { config, env, sdk, agent, client })
    }

    /// The stateful client under test.
    pub fn client(&self) -> &StatefulCallClient<SimEnv> {
        &self.client
    }

    /// The simulated agent.
    pub fn agent(&self) -> &Rc<SimCallAgent> {
        &self.agent
    }

    /// The simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Listeners attached across the simulated graph.
    pub fn attached_listeners(&self) -> usize {
        self.sdk.ledger().attached()
    }

    /// Apply an operation to the graph.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::StartCall => self.apply_start_call(),
            Operation::ReceiveCall => {
                if self.agent.sim_calls().len() >= self.config.max_calls {
                    return OperationResult::NoEffect;
                }
                let _ = self.agent.receive_call();
                OperationResult::Applied
            },
            Operation::EndCall { call } => {
                self.with_call(*call, |agent, call| outcome(agent.end_call(&call.id())))
            },
            Operation::SetCallConnected { call, connected } => self.with_call(*call, |_, call| {
                let status = if *connected { CallStatus::Connected } else { CallStatus::Hold };
                let changed = call.state() != status;
                call.set_state(status);
                outcome(changed)
            }),
            Operation::SetLocalMuted { call, muted } => self.with_call(*call, |_, call| {
                let changed = call.is_muted() != *muted;
                call.set_muted(*muted);
                outcome(changed)
            }),
            Operation::SetScreenSharing { call, on } => self.with_call(*call, |_, call| {
                let changed = call.is_screen_sharing_on() != *on;
                call.set_screen_sharing(*on);
                outcome(changed)
            }),
            Operation::SetRecording { call, on } => self.with_call(*call, |_, call| {
                let changed = call.is_recording_active() != *on;
                call.set_recording(*on);
                outcome(changed)
            }),
            Operation::SetDominantSpeakers { call, speakers } => {
                let mut ids: Vec<ParticipantId> = Vec::new();
                for slot in speakers.iter().take(4) {
                    let id = self.participant_id(*slot);
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                self.with_call(*call, |_, call| {
                    let changed = call.dominant_speakers() != ids;
                    call.set_dominant_speakers(ids);
                    outcome(changed)
                })
            },
            Operation::Join { call, participant } => {
                let id = self.participant_id(*participant);
                self.with_call(*call, |_, call| outcome(call.join(id).is_some()))
            },
            Operation::Leave { call, participant } => {
                let id = self.participant_id(*participant);
                self.with_call(*call, |_, call| outcome(call.leave(&id)))
            },
            Operation::SetMuted { call, participant, muted } => {
                self.with_participant(*call, *participant, |participant| {
                    let changed = participant.is_muted() != *muted;
                    participant.set_muted(*muted);
                    outcome(changed)
                })
            },
            Operation::SetSpeaking { call, participant, speaking } => {
                self.with_participant(*call, *participant, |participant| {
                    let changed = participant.is_speaking() != *speaking;
                    participant.set_speaking(*speaking);
                    outcome(changed)
                })
            },
            Operation::SetOnHold { call, participant, on_hold } => {
                self.with_participant(*call, *participant, |participant| {
                    let status = if *on_hold { CallStatus::Hold } else { CallStatus::Connected };
                    let changed = participant.state() != status;
                    participant.set_state(status);
                    outcome(changed)
                })
            },
            Operation::Rename { call, participant, name } => {
                let name = name.map(|n| format!("Guest {}", n % 3));
                self.with_participant(*call, *participant, |participant| {
                    let changed = participant.display_name() != name;
                    participant.set_display_name(name);
                    outcome(changed)
                })
            },
            Operation::AddStream { call, participant, stream, screen_share } => {
                let id = self.stream_id(*stream);
                let kind = if *screen_share {
                    MediaStreamType::ScreenSharing
                } else {
                    MediaStreamType::Video
                };
                self.with_participant(*call, *participant, |participant| {
                    outcome(participant.add_stream(id, kind).is_some())
                })
            },
            Operation::RemoveStream { call, participant, stream } => {
                let id = self.stream_id(*stream);
                self.with_participant(*call, *participant, |participant| {
                    outcome(participant.remove_stream(id))
                })
            },
            Operation::SetStreamAvailable { call, participant, stream, available } => {
                let Some(stream) = self.stream(*call, *participant, *stream) else {
                    return OperationResult::NoEffect;
                };
                let changed = stream.is_available() != *available;
                stream.set_available(*available);
                outcome(changed)
            },
            Operation::AdvanceTime { millis } => {
                self.env.advance(u64::from(*millis));
                OperationResult::Applied
            },
        }
    }

    /// What the simulated graph holds.
    pub fn sdk_view(&self) -> ObservableCalls {
        self.agent
            .sim_calls()
            .iter()
            .map(|call| {
                let participants = call
                    .participants()
                    .iter()
                    .map(|participant| {
                        let streams = participant
                            .streams()
                            .iter()
                            .map(|stream| {
                                (stream.id(), (stream.media_stream_type(), stream.is_available()))
                            })
                            .collect();
                        let observed = ObservableParticipant {
                            display_name: participant.display_name(),
                            state: participant.state(),
                            is_muted: participant.is_muted(),
                            is_speaking: participant.is_speaking(),
                            streams,
                        };
                        (participant.identifier(), observed)
                    })
                    .collect();
                let observed = ObservableCall {
                    status: call.state(),
                    is_muted: call.is_muted(),
                    is_screen_sharing_on: call.is_screen_sharing_on(),
                    is_recording_active: call.is_recording_active(),
                    dominant_speakers: call.dominant_speakers(),
                    participants,
                };
                (call.id(), observed)
            })
            .collect()
    }

    /// What the client's snapshot says.
    pub fn projected_view(&self) -> ObservableCalls {
        project(&self.client.get_state())
    }

    fn apply_start_call(&self) -> OperationResult {
        if self.agent.sim_calls().len() >= self.config.max_calls {
            return OperationResult::NoEffect;
        }
        match self.client.start_call(&[]) {
            Ok(_) => OperationResult::Applied,
            Err(err) => {
                tracing::debug!(%err, "start_call rejected");
                OperationResult::Rejected
            },
        }
    }

    fn participant_id(&self, slot: ParticipantSlot) -> ParticipantId {
        format!("p{}", slot % self.config.roster.max(1))
    }

    fn stream_id(&self, slot: StreamSlot) -> StreamId {
        u32::from(slot % self.config.max_streams.max(1))
    }

    fn call(&self, slot: CallSlot) -> Option<Rc<SimCall>> {
        let calls = self.agent.sim_calls();
        if calls.is_empty() {
            return None;
        }
        calls.get(usize::from(slot) % calls.len()).cloned()
    }

    fn participant(&self, call: CallSlot, slot: ParticipantSlot) -> Option<Rc<SimParticipant>> {
        self.call(call)?.participant(&self.participant_id(slot))
    }

    fn stream(
        &self,
        call: CallSlot,
        participant: ParticipantSlot,
        slot: StreamSlot,
    ) -> Option<Rc<SimStream>> {
        self.participant(call, participant)?.stream(self.stream_id(slot))
    }

    fn with_call(
        &self,
        slot: CallSlot,
        f: impl FnOnce(&SimCallAgent, &SimCall) -> OperationResult,
    ) -> OperationResult {
        self.call(slot).map_or(OperationResult::NoEffect, |call| f(&self.agent, &call))
    }

    fn with_participant(
        &self,
        call: CallSlot,
        slot: ParticipantSlot,
        f: impl FnOnce(&SimParticipant) -> OperationResult,
    ) -> OperationResult {
        self.participant(call, slot)
            .map_or(OperationResult::NoEffect, |participant| f(&participant))
    }
}

fn outcome(changed: bool) -> OperationResult {
    if changed { OperationResult::Applied } else { OperationResult::NoEffect }
}

fn project(state: &CallClientState) -> ObservableCalls {
    state
        .calls
        .iter()
        .map(|(id, call)| {
            let participants = call
                .remote_participants
                .iter()
                .map(|(participant_id, participant)| {
                    let streams = participant
                        .video_streams
                        .iter()
                        .map(|(stream_id, stream)| {
                            (*stream_id, (stream.media_stream_type, stream.is_available))
                        })
                        .collect();
                    let observed = ObservableParticipant {
                        display_name: participant.display_name.clone(),
                        state: participant.state,
                        is_muted: participant.is_muted,
                        is_speaking: participant.is_speaking,
                        streams,
                    };
                    (participant_id.clone(), observed)
                })
                .collect();
            let observed = ObservableCall {
                status: call.state,
                is_muted: call.local_participant.is_muted,
                is_screen_sharing_on: call.local_participant.is_screen_sharing_on,
                is_recording_active: call.is_recording_active,
                dominant_speakers: call.dominant_speakers.as_ref().clone(),
                participants,
            };
            (id.clone(), observed)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn operations_without_calls_have_no_effect() {
        let mut world = CallWorld::new(WorldConfig::default()).unwrap();

        let result = world.apply(&Operation::Join { call: 0, participant: 1 });

        assert_eq!(result, OperationResult::NoEffect);
        assert!(world.projected_view().is_empty());
    }

    #[test]
    fn call_limit_is_enforced() {
        let config = WorldConfig { max_calls: 1, ..WorldConfig::default() };
        let mut world = CallWorld::new(config).unwrap();

        assert_eq!(world.apply(&Operation::StartCall), OperationResult::Applied);
        assert_eq!(world.apply(&Operation::ReceiveCall), OperationResult::NoEffect);
        assert_eq!(world.agent().sim_calls().len(), 1);
    }

    #[test]
    fn join_and_mute_are_projected() {
        let mut world = CallWorld::new(WorldConfig::default()).unwrap();
        let _ = world.apply(&Operation::StartCall);
        let _ = world.apply(&Operation::Join { call: 0, participant: 2 });
        let _ = world.apply(&Operation::SetMuted { call: 0, participant: 2, muted: true });

        let projected = world.projected_view();

        assert_eq!(projected, world.sdk_view());
        let call = projected.values().next().unwrap();
        assert!(call.participants["p2"].is_muted);
    }
}
