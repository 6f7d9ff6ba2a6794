//! Simulated calling SDK.
//!
//! Objects hold their state in cells and emit an event from every setter
//! that changes something, mirroring how the real SDK reports changes. Test
//! code drives them directly through the setters; the stateful client only
//! sees the SDK traits.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use prism_core::{
    SdkError,
    sdk::{
        Call, CallAgent, CallAgentEvent, CallClient, CallEvent, DeviceManager, DeviceManagerEvent,
        ParticipantEvent, RemoteParticipant, RemoteVideoStream, StreamEvent,
    },
    state::{
        AudioDeviceInfo, CallId, CallStatus, DeviceAccess, MediaStreamType, ParticipantId, StreamId,
        VideoDeviceInfo, VideoDeviceType,
    },
};

use crate::emitter::{ListenerLedger, SimEmitter, delegate_emitter};

/// Simulated remote video stream.
#[derive(Debug)]
pub struct SimStream {
    id: StreamId,
    kind: MediaStreamType,
    available: Cell<bool>,
    emitter: SimEmitter<StreamEvent>,
}

impl SimStream {
    /// New stream.
    pub fn new(
        ledger: &ListenerLedger,
        id: StreamId,
        kind: MediaStreamType,
        available: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            kind,
            available: Cell::new(available),
            emitter: SimEmitter::new(ledger),
        })
    }

    /// Start or stop sending. Emits on change.
    pub fn set_available(&self, is_available: bool) {
        if self.available.replace(is_available) != is_available {
            let _ = self.emitter.emit(&StreamEvent::AvailabilityChanged { is_available });
        }
    }

    /// Listeners attached to this stream.
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

delegate_emitter!(SimStream, StreamEvent);

impl RemoteVideoStream for SimStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn media_stream_type(&self) -> MediaStreamType {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available.get()
    }
}

/// Simulated remote participant.
#[derive(Debug)]
pub struct SimParticipant {
    identifier: ParticipantId,
    display_name: RefCell<Option<String>>,
    state: Cell<CallStatus>,
    muted: Cell<bool>,
    speaking: Cell<bool>,
    streams: RefCell<Vec<Rc<SimStream>>>,
    ledger: ListenerLedger,
    emitter: SimEmitter<ParticipantEvent>,
}

impl SimParticipant {
    /// Connected participant with no streams.
    pub fn new(ledger: &ListenerLedger, identifier: impl Into<ParticipantId>) -> Rc<Self> {
        Rc::new(Self {
            identifier: identifier.into(),
            display_name: RefCell::new(None),
            state: Cell::new(CallStatus::Connected),
            muted: Cell::new(false),
            speaking: Cell::new(false),
            streams: RefCell::new(Vec::new()),
            ledger: ledger.clone(),
            emitter: SimEmitter::new(ledger),
        })
    }

    /// Change lifecycle state. Emits on change.
    pub fn set_state(&self, state: CallStatus) {
        if self.state.replace(state) != state {
            let _ = self.emitter.emit(&ParticipantEvent::StateChanged(state));
        }
    }

    /// Mute or unmute. Emits on change.
    pub fn set_muted(&self, is_muted: bool) {
        if self.muted.replace(is_muted) != is_muted {
            let _ = self.emitter.emit(&ParticipantEvent::MutedChanged(is_muted));
        }
    }

    /// Start or stop speaking. Emits on change.
    pub fn set_speaking(&self, is_speaking: bool) {
        if self.speaking.replace(is_speaking) != is_speaking {
            let _ = self.emitter.emit(&ParticipantEvent::SpeakingChanged(is_speaking));
        }
    }

    /// Rename. Emits on change.
    pub fn set_display_name(&self, display_name: Option<String>) {
        if *self.display_name.borrow() == display_name {
            return;
        }
        self.display_name.replace(display_name.clone());
        let _ = self.emitter.emit(&ParticipantEvent::DisplayNameChanged(display_name));
    }

    /// Publish a new stream. Returns `None` if the id is taken.
    pub fn add_stream(&self, id: StreamId, kind: MediaStreamType) -> Option<Rc<SimStream>> {
        if self.stream(id).is_some() {
            return None;
        }
        let stream = SimStream::new(&self.ledger, id, kind, true);
        self.streams.borrow_mut().push(Rc::clone(&stream));
        let added: Rc<dyn RemoteVideoStream> = Rc::clone(&stream) as Rc<dyn RemoteVideoStream>;
        let event =
            ParticipantEvent::VideoStreamsUpdated { added: vec![added], removed: Vec::new() };
        let _ = self.emitter.emit(&event);
        Some(stream)
    }

    /// Unpublish a stream. Returns false if it does not exist.
    pub fn remove_stream(&self, id: StreamId) -> bool {
        let removed = {
            let mut streams = self.streams.borrow_mut();
            let before = streams.len();
            streams.retain(|stream| stream.id != id);
            streams.len() != before
        };
        if removed {
            let event =
                ParticipantEvent::VideoStreamsUpdated { added: Vec::new(), removed: vec![id] };
            let _ = self.emitter.emit(&event);
        }
        removed
    }

    /// Stream by id.
    pub fn stream(&self, id: StreamId) -> Option<Rc<SimStream>> {
        self.streams.borrow().iter().find(|stream| stream.id == id).cloned()
    }

    /// Published streams in publication order.
    pub fn streams(&self) -> Vec<Rc<SimStream>> {
        self.streams.borrow().clone()
    }

    /// Listeners attached to this participant.
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

delegate_emitter!(SimParticipant, ParticipantEvent);

impl RemoteParticipant for SimParticipant {
    fn identifier(&self) -> ParticipantId {
        self.identifier.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.borrow().clone()
    }

    fn state(&self) -> CallStatus {
        self.state.get()
    }

    fn is_muted(&self) -> bool {
        self.muted.get()
    }

    fn is_speaking(&self) -> bool {
        self.speaking.get()
    }

    fn video_streams(&self) -> Vec<Rc<dyn RemoteVideoStream>> {
        self.streams
            .borrow()
            .iter()
            .map(|stream| Rc::clone(stream) as Rc<dyn RemoteVideoStream>)
            .collect()
    }
}

/// Simulated call.
#[derive(Debug)]
pub struct SimCall {
    id: CallId,
    state: Cell<CallStatus>,
    muted: Cell<bool>,
    screen_sharing: Cell<bool>,
    recording: Cell<bool>,
    dominant_speakers: RefCell<Vec<ParticipantId>>,
    participants: RefCell<Vec<Rc<SimParticipant>>>,
    ledger: ListenerLedger,
    emitter: SimEmitter<CallEvent>,
}

impl SimCall {
    /// New call with no participants.
    pub fn new(ledger: &ListenerLedger, id: impl Into<CallId>, state: CallStatus) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            state: Cell::new(state),
            muted: Cell::new(false),
            screen_sharing: Cell::new(false),
            recording: Cell::new(false),
            dominant_speakers: RefCell::new(Vec::new()),
            participants: RefCell::new(Vec::new()),
            ledger: ledger.clone(),
            emitter: SimEmitter::new(ledger),
        })
    }

    /// Change lifecycle state. Emits on change.
    pub fn set_state(&self, state: CallStatus) {
        if self.state.replace(state) != state {
            let _ = self.emitter.emit(&CallEvent::StateChanged(state));
        }
    }

    /// Mute or unmute the local microphone. Emits on change.
    pub fn set_muted(&self, is_muted: bool) {
        if self.muted.replace(is_muted) != is_muted {
            let _ = self.emitter.emit(&CallEvent::MutedChanged(is_muted));
        }
    }

    /// Toggle the local screen share. Emits on change.
    pub fn set_screen_sharing(&self, on: bool) {
        if self.screen_sharing.replace(on) != on {
            let _ = self.emitter.emit(&CallEvent::ScreenShareChanged(on));
        }
    }

    /// Toggle recording. Emits on change.
    pub fn set_recording(&self, on: bool) {
        if self.recording.replace(on) != on {
            let _ = self.emitter.emit(&CallEvent::RecordingChanged(on));
        }
    }

    /// Replace the dominant speaker list. Emits on change.
    pub fn set_dominant_speakers(&self, speakers: Vec<ParticipantId>) {
        if *self.dominant_speakers.borrow() == speakers {
            return;
        }
        self.dominant_speakers.replace(speakers.clone());
        let _ = self.emitter.emit(&CallEvent::DominantSpeakersChanged(speakers));
    }

    /// A new participant joins. Returns `None` if the id is already present.
    pub fn join(&self, identifier: impl Into<ParticipantId>) -> Option<Rc<SimParticipant>> {
        let identifier = identifier.into();
        if self.participant(&identifier).is_some() {
            return None;
        }
        let participant = SimParticipant::new(&self.ledger, identifier);
        self.participants.borrow_mut().push(Rc::clone(&participant));
        let added = Rc::clone(&participant) as Rc<dyn RemoteParticipant>;
        let event =
            CallEvent::RemoteParticipantsUpdated { added: vec![added], removed: Vec::new() };
        let _ = self.emitter.emit(&event);
        Some(participant)
    }

    /// A participant leaves. Returns false if it was not present.
    pub fn leave(&self, identifier: &str) -> bool {
        let removed = {
            let mut participants = self.participants.borrow_mut();
            let before = participants.len();
            participants.retain(|participant| participant.identifier != identifier);
            participants.len() != before
        };
        if removed {
            let _ = self.emitter.emit(&CallEvent::RemoteParticipantsUpdated {
                added: Vec::new(),
                removed: vec![identifier.to_string()],
            });
        }
        removed
    }

    /// A participant joins and drops again within one roster update. The
    /// call ends up without them. Returns `None` if the id is already
    /// present.
    pub fn join_and_drop(
        &self,
        identifier: impl Into<ParticipantId>,
    ) -> Option<Rc<SimParticipant>> {
        let identifier = identifier.into();
        if self.participant(&identifier).is_some() {
            return None;
        }
        let participant = SimParticipant::new(&self.ledger, identifier.clone());
        let added = Rc::clone(&participant) as Rc<dyn RemoteParticipant>;
        let event =
            CallEvent::RemoteParticipantsUpdated { added: vec![added], removed: vec![identifier] };
        let _ = self.emitter.emit(&event);
        Some(participant)
    }

    /// Participant by id.
    pub fn participant(&self, identifier: &str) -> Option<Rc<SimParticipant>> {
        self.participants
            .borrow()
            .iter()
            .find(|participant| participant.identifier == identifier)
            .cloned()
    }

    /// Participants in join order.
    pub fn participants(&self) -> Vec<Rc<SimParticipant>> {
        self.participants.borrow().clone()
    }

    /// Listeners attached to this call.
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

delegate_emitter!(SimCall, CallEvent);

impl Call for SimCall {
    fn id(&self) -> CallId {
        self.id.clone()
    }

    fn state(&self) -> CallStatus {
        self.state.get()
    }

    fn is_muted(&self) -> bool {
        self.muted.get()
    }

    fn is_screen_sharing_on(&self) -> bool {
        self.screen_sharing.get()
    }

    fn is_recording_active(&self) -> bool {
        self.recording.get()
    }

    fn dominant_speakers(&self) -> Vec<ParticipantId> {
        self.dominant_speakers.borrow().clone()
    }

    fn remote_participants(&self) -> Vec<Rc<dyn RemoteParticipant>> {
        self.participants
            .borrow()
            .iter()
            .map(|participant| Rc::clone(participant) as Rc<dyn RemoteParticipant>)
            .collect()
    }
}

/// Simulated call agent.
#[derive(Debug)]
pub struct SimCallAgent {
    calls: RefCell<Vec<Rc<SimCall>>>,
    next_call: Cell<u64>,
    fail_next_start: Cell<bool>,
    ledger: ListenerLedger,
    emitter: SimEmitter<CallAgentEvent>,
}

impl SimCallAgent {
    /// Agent with no calls.
    pub fn new(ledger: &ListenerLedger) -> Rc<Self> {
        Rc::new(Self {
            calls: RefCell::new(Vec::new()),
            next_call: Cell::new(1),
            fail_next_start: Cell::new(false),
            ledger: ledger.clone(),
            emitter: SimEmitter::new(ledger),
        })
    }

    /// An incoming call arrives in `Ringing` state.
    pub fn receive_call(&self) -> Rc<SimCall> {
        let call = self.new_call(CallStatus::Ringing);
        self.announce(&call);
        call
    }

    /// End a call: it goes to `Disconnected`, then leaves the agent.
    /// Returns false if the call does not exist.
    pub fn end_call(&self, call_id: &str) -> bool {
        let Some(call) = self.call(call_id) else {
            return false;
        };
        call.set_state(CallStatus::Disconnected);
        self.calls.borrow_mut().retain(|other| other.id != call_id);
        let event =
            CallAgentEvent::CallsUpdated { added: Vec::new(), removed: vec![call_id.to_string()] };
        let _ = self.emitter.emit(&event);
        true
    }

    /// Make the next [`CallAgent::start_call`] fail.
    pub fn fail_next_start(&self) {
        self.fail_next_start.set(true);
    }

    /// Call by id.
    pub fn call(&self, call_id: &str) -> Option<Rc<SimCall>> {
        self.calls.borrow().iter().find(|call| call.id == call_id).cloned()
    }

    /// Active calls in start order.
    pub fn sim_calls(&self) -> Vec<Rc<SimCall>> {
        self.calls.borrow().clone()
    }

    /// Listeners attached to this agent.
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }

    fn new_call(&self, state: CallStatus) -> Rc<SimCall> {
        let n = self.next_call.get();
        self.next_call.set(n + 1);
        let call = SimCall::new(&self.ledger, format!("call-{n}"), state);
        self.calls.borrow_mut().push(Rc::clone(&call));
        call
    }

    fn announce(&self, call: &Rc<SimCall>) {
        let added = Rc::clone(call) as Rc<dyn Call>;
        let event = CallAgentEvent::CallsUpdated { added: vec![added], removed: Vec::new() };
        let _ = self.emitter.emit(&event);
    }
}

delegate_emitter!(SimCallAgent, CallAgentEvent);

impl CallAgent for SimCallAgent {
    fn calls(&self) -> Vec<Rc<dyn Call>> {
        self.calls.borrow().iter().map(|call| Rc::clone(call) as Rc<dyn Call>).collect()
    }

    fn start_call(&self, participants: &[ParticipantId]) -> Result<Rc<dyn Call>, SdkError> {
        if self.fail_next_start.replace(false) {
            return Err(SdkError::new("call rejected by service"));
        }
        let call = self.new_call(CallStatus::Connecting);
        for identifier in participants {
            if let Some(participant) = call.join(identifier.clone()) {
                participant.set_state(CallStatus::Ringing);
            }
        }
        self.announce(&call);
        Ok(call as Rc<dyn Call>)
    }
}

/// Simulated device manager.
#[derive(Debug)]
pub struct SimDeviceManager {
    cameras: RefCell<Vec<VideoDeviceInfo>>,
    microphones: RefCell<Vec<AudioDeviceInfo>>,
    speakers: RefCell<Vec<AudioDeviceInfo>>,
    selected_microphone: RefCell<Option<AudioDeviceInfo>>,
    selected_speaker: RefCell<Option<AudioDeviceInfo>>,
    speaker_selection: Cell<bool>,
    grant: Cell<DeviceAccess>,
    emitter: SimEmitter<DeviceManagerEvent>,
}

impl SimDeviceManager {
    /// Manager with one built-in camera, one microphone and one speaker,
    /// all selected, and every permission granted.
    pub fn new(ledger: &ListenerLedger) -> Rc<Self> {
        let microphone = audio_device("mic-0", "Built-in Microphone");
        let speaker = audio_device("spk-0", "Built-in Speakers");
        Rc::new(Self {
            cameras: RefCell::new(vec![VideoDeviceInfo {
                id: "cam-0".to_string(),
                name: "Built-in Camera".to_string(),
                device_type: VideoDeviceType::Internal,
            }]),
            microphones: RefCell::new(vec![microphone.clone()]),
            speakers: RefCell::new(vec![speaker.clone()]),
            selected_microphone: RefCell::new(Some(microphone)),
            selected_speaker: RefCell::new(Some(speaker)),
            speaker_selection: Cell::new(true),
            grant: Cell::new(DeviceAccess { audio: true, video: true }),
            emitter: SimEmitter::new(ledger),
        })
    }

    /// Replace the camera list.
    pub fn set_cameras(&self, cameras: Vec<VideoDeviceInfo>) {
        self.cameras.replace(cameras.clone());
        let _ = self.emitter.emit(&DeviceManagerEvent::VideoDevicesUpdated(cameras));
    }

    /// Replace the microphone list.
    pub fn set_microphones(&self, microphones: Vec<AudioDeviceInfo>) {
        self.microphones.replace(microphones.clone());
        let _ = self.emitter.emit(&DeviceManagerEvent::MicrophonesUpdated(microphones));
    }

    /// Replace the speaker list.
    pub fn set_speakers(&self, speakers: Vec<AudioDeviceInfo>) {
        self.speakers.replace(speakers.clone());
        let _ = self.emitter.emit(&DeviceManagerEvent::SpeakersUpdated(speakers));
    }

    /// Select a microphone.
    pub fn select_microphone(&self, microphone: Option<AudioDeviceInfo>) {
        self.selected_microphone.replace(microphone.clone());
        let _ = self.emitter.emit(&DeviceManagerEvent::SelectedMicrophoneChanged(microphone));
    }

    /// Select a speaker.
    pub fn select_speaker(&self, speaker: Option<AudioDeviceInfo>) {
        self.selected_speaker.replace(speaker.clone());
        let _ = self.emitter.emit(&DeviceManagerEvent::SelectedSpeakerChanged(speaker));
    }

    /// Whether the platform lets the user pick an output device.
    pub fn set_speaker_selection_available(&self, available: bool) {
        self.speaker_selection.set(available);
    }

    /// What the simulated user grants on the next permission prompt.
    pub fn set_grant(&self, grant: DeviceAccess) {
        self.grant.set(grant);
    }

    /// Listeners attached to this manager.
    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }
}

fn audio_device(id: &str, name: &str) -> AudioDeviceInfo {
    AudioDeviceInfo { id: id.to_string(), name: name.to_string(), is_system_default: true }
}

delegate_emitter!(SimDeviceManager, DeviceManagerEvent);

impl DeviceManager for SimDeviceManager {
    fn cameras(&self) -> Vec<VideoDeviceInfo> {
        self.cameras.borrow().clone()
    }

    fn microphones(&self) -> Vec<AudioDeviceInfo> {
        self.microphones.borrow().clone()
    }

    fn speakers(&self) -> Vec<AudioDeviceInfo> {
        self.speakers.borrow().clone()
    }

    fn selected_microphone(&self) -> Option<AudioDeviceInfo> {
        self.selected_microphone.borrow().clone()
    }

    fn selected_speaker(&self) -> Option<AudioDeviceInfo> {
        self.selected_speaker.borrow().clone()
    }

    fn is_speaker_selection_available(&self) -> bool {
        self.speaker_selection.get()
    }

    fn ask_device_permission(&self, audio: bool, video: bool) -> Result<DeviceAccess, SdkError> {
        let grant = self.grant.get();
        Ok(DeviceAccess { audio: audio && grant.audio, video: video && grant.video })
    }
}

/// Simulated entry point of the calling SDK.
///
/// All objects it hands out share one [`ListenerLedger`].
#[derive(Debug)]
pub struct SimCallClient {
    user_id: ParticipantId,
    ledger: ListenerLedger,
    agent: RefCell<Option<Rc<SimCallAgent>>>,
    device_manager: Rc<SimDeviceManager>,
}

impl SimCallClient {
    /// Client for `user_id` with a fresh ledger.
    pub fn new(user_id: impl Into<ParticipantId>) -> Rc<Self> {
        let ledger = ListenerLedger::new();
        let device_manager = SimDeviceManager::new(&ledger);
        Rc::new(Self { user_id: user_id.into(), ledger, agent: RefCell::new(None), device_manager })
    }

    /// Ledger shared by every object of this client.
    pub fn ledger(&self) -> &ListenerLedger {
        &self.ledger
    }

    /// The agent, once [`CallClient::create_call_agent`] ran.
    pub fn agent(&self) -> Option<Rc<SimCallAgent>> {
        self.agent.borrow().clone()
    }

    /// The device manager.
    pub fn device_manager(&self) -> Rc<SimDeviceManager> {
        Rc::clone(&self.device_manager)
    }
}

impl CallClient for SimCallClient {
    fn user_id(&self) -> ParticipantId {
        self.user_id.clone()
    }

    fn create_call_agent(
        &self,
        _display_name: Option<String>,
    ) -> Result<Rc<dyn CallAgent>, SdkError> {
        let agent = Rc::clone(
            self.agent.borrow_mut().get_or_insert_with(|| SimCallAgent::new(&self.ledger)),
        );
        Ok(agent as Rc<dyn CallAgent>)
    }

    fn get_device_manager(&self) -> Result<Rc<dyn DeviceManager>, SdkError> {
        Ok(Rc::clone(&self.device_manager) as Rc<dyn DeviceManager>)
    }
}
