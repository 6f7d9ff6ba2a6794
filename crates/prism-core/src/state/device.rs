//! Device manager state.

use std::sync::Arc;

/// Camera kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VideoDeviceType {
    /// Built-in camera.
    Internal,
    /// External USB camera.
    UsbCamera,
    /// Software camera.
    Virtual,
    /// Unknown kind.
    #[default]
    Unknown,
}

/// A camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoDeviceInfo {
    /// Device id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Device kind.
    pub device_type: VideoDeviceType,
}

/// A microphone or speaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioDeviceInfo {
    /// Device id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the OS reports this as the default device.
    pub is_system_default: bool,
}

/// Result of a device permission request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceAccess {
    /// Microphone permission granted.
    pub audio: bool,
    /// Camera permission granted.
    pub video: bool,
}

/// Devices known to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceManagerState {
    /// Whether the platform allows choosing the output device.
    pub is_speaker_selection_available: bool,
    /// Cameras.
    pub cameras: Arc<Vec<VideoDeviceInfo>>,
    /// Microphones.
    pub microphones: Arc<Vec<AudioDeviceInfo>>,
    /// Speakers.
    pub speakers: Arc<Vec<AudioDeviceInfo>>,
    /// Camera chosen by the user.
    pub selected_camera: Option<VideoDeviceInfo>,
    /// Microphone chosen by the SDK or user.
    pub selected_microphone: Option<AudioDeviceInfo>,
    /// Speaker chosen by the SDK or user.
    pub selected_speaker: Option<AudioDeviceInfo>,
    /// Last permission result, `None` until asked.
    pub device_access: Option<DeviceAccess>,
}
