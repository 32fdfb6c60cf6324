//! Local playback device lifecycle state

use crate::error::ErrorKind;

/// Lifecycle of the in-process playback device.
///
/// `Uninitialized -> Initializing -> Ready -> Active`, `Ready/Active -> NotReady`
/// when the device is lost, and any state `-> Error(kind)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Active,
    NotReady,
    Error(ErrorKind),
}

impl DeviceStatus {
    pub fn label(self) -> &'static str {
        match self {
            DeviceStatus::Uninitialized => "offline",
            DeviceStatus::Initializing => "connecting",
            DeviceStatus::Ready => "ready",
            DeviceStatus::Active => "playing here",
            DeviceStatus::NotReady => "disconnected",
            DeviceStatus::Error(_) => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DeviceAdapterState {
    pub status: DeviceStatus,
    pub device_id: Option<String>,
    pub is_premium_account: bool,
    pub last_error: Option<ErrorKind>,
}

impl DeviceAdapterState {
    pub fn is_active(&self) -> bool {
        self.status == DeviceStatus::Active
    }

    /// Device id, but only while the device can accept commands.
    pub fn usable_device_id(&self) -> Option<&str> {
        match self.status {
            DeviceStatus::Ready | DeviceStatus::Active => self.device_id.as_deref(),
            _ => None,
        }
    }

    /// True once the device can no longer serve commands it was sent.
    pub fn is_lost(&self) -> bool {
        matches!(
            self.status,
            DeviceStatus::Uninitialized | DeviceStatus::NotReady | DeviceStatus::Error(_)
        )
    }
}
