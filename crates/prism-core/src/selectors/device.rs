//! Device selectors.

use std::sync::Arc;

use prism_memo::{Selector, create_selector};

use crate::state::{
    AudioDeviceInfo, CallClientState, DeviceAccess, DeviceManagerState, VideoDeviceInfo,
};

/// Device picker view model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicesView {
    /// Cameras to pick from.
    pub cameras: Arc<Vec<VideoDeviceInfo>>,
    /// Microphones to pick from.
    pub microphones: Arc<Vec<AudioDeviceInfo>>,
    /// Speakers to pick from; empty when the platform cannot route audio.
    pub speakers: Arc<Vec<AudioDeviceInfo>>,
    /// Picked camera, falling back to the first one.
    pub selected_camera: Option<VideoDeviceInfo>,
    /// Picked microphone.
    pub selected_microphone: Option<AudioDeviceInfo>,
    /// Picked speaker.
    pub selected_speaker: Option<AudioDeviceInfo>,
    /// Permission state; `None` until asked.
    pub access: Option<DeviceAccess>,
}

/// Device picker. Takes no props.
pub fn devices_selector() -> impl Selector<CallClientState, (), Output = Arc<DevicesView>> {
    create_selector(
        "devices",
        |state: &CallClientState, _props: &()| Arc::clone(&state.device_manager),
        |devices: &Arc<DeviceManagerState>| {
            let speakers = if devices.is_speaker_selection_available {
                Arc::clone(&devices.speakers)
            } else {
                Arc::default()
            };
            Ok(Arc::new(DevicesView {
                cameras: Arc::clone(&devices.cameras),
                microphones: Arc::clone(&devices.microphones),
                speakers,
                selected_camera: devices
                    .selected_camera
                    .clone()
                    .or_else(|| devices.cameras.first().cloned()),
                selected_microphone: devices.selected_microphone.clone(),
                selected_speaker: devices.selected_speaker.clone(),
                access: devices.device_access,
            }))
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{state::VideoDeviceType, store::StateStore, transition::CallPatch};

    fn camera(id: &str) -> VideoDeviceInfo {
        VideoDeviceInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            device_type: VideoDeviceType::Internal,
        }
    }

    #[test]
    fn first_camera_is_default_selection() {
        let store = StateStore::new(CallClientState::new("me"));
        let _ = store.apply_transition(CallPatch::CamerasUpdated {
            cameras: vec![camera("front"), camera("back")],
        });
        let mut selector = devices_selector();

        let view = selector.select(&store.get_state(), &()).unwrap();
        assert_eq!(view.selected_camera, Some(camera("front")));

        let _ = store
            .apply_transition(CallPatch::SelectedCameraChanged { camera: Some(camera("back")) });
        let view = selector.select(&store.get_state(), &()).unwrap();
        assert_eq!(view.selected_camera, Some(camera("back")));
    }

    #[test]
    fn call_changes_do_not_recompute_devices() {
        let store = StateStore::new(CallClientState::new("me"));
        let mut selector = devices_selector();
        let before = selector.select(&store.get_state(), &()).unwrap();

        let _ = store.apply_transition(CallPatch::CallAdded {
            call: crate::state::CallState::new("c1", crate::state::CallStatus::Ringing, 0),
        });
        let after = selector.select(&store.get_state(), &()).unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.speakers.is_empty());
    }
}
