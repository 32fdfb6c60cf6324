//! Local playback device boundary
//!
//! - `adapter`: lifecycle owner that translates native events for the engine
//! - `librespot`: in-process Spotify Connect device built on librespot

mod adapter;
mod librespot;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{EngineResult, ErrorKind};

pub use adapter::LocalDeviceAdapter;
pub use librespot::LibrespotFactory;

/// Track description as reported by the device. Native ids may be missing,
/// the uri is always present.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NativeTrack {
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
}

/// Native `state_changed` payload.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NativePlayerState {
    pub paused: bool,
    pub position_ms: u64,
    pub track: Option<NativeTrack>,
    pub shuffle: bool,
    /// 0 = off, 1 = context, 2 = track
    pub repeat_mode: u8,
    pub context_uri: Option<String>,
    pub disallows: Vec<String>,
    pub volume_percent: Option<u8>,
}

/// Typed form of the device's listener callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    /// `None` when local playback stopped.
    StateChanged(Option<NativePlayerState>),
    Error { kind: ErrorKind, message: String },
}

pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// Transport surface of one constructed device instance.
#[async_trait]
pub trait DeviceSdk: Send + Sync {
    async fn connect(&self) -> EngineResult<()>;

    async fn disconnect(&self);

    async fn play(&self) -> EngineResult<()>;

    async fn pause(&self) -> EngineResult<()>;

    async fn toggle_play(&self) -> EngineResult<()>;

    async fn seek(&self, position_ms: u64) -> EngineResult<()>;

    async fn previous(&self) -> EngineResult<()>;

    async fn next(&self) -> EngineResult<()>;

    async fn set_volume(&self, percent: u8) -> EngineResult<()>;

    /// Satisfy the device's user-gesture requirement before first playback.
    async fn activate(&self) -> EngineResult<()>;
}

/// Builds device instances and wires their events into `events`.
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    fn device_name(&self) -> &str;

    async fn create(
        &self,
        access_token: String,
        events: DeviceEventSender,
    ) -> EngineResult<Box<dyn DeviceSdk>>;
}

/// Supplies a fresh access token every time a device is initialized.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> EngineResult<String>;
}
