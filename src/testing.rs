//! Recording fakes for the engine's external collaborators

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::device::{
    CredentialProvider, DeviceEvent, DeviceEventSender, DeviceFactory, DeviceSdk,
};
use crate::error::{EngineError, EngineResult};
use crate::model::{LyricsStatus, PlayTarget, PlaybackState, RepeatMode, Track};
use crate::remote::{LyricsSource, RemotePlayback};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    CurrentPlayback,
    Queue,
    Play { target: PlayTarget, device_id: Option<String> },
    Pause { device_id: Option<String> },
    Seek { position_ms: u64, device_id: Option<String> },
    Volume { percent: u8, device_id: Option<String> },
    Shuffle { shuffle: bool, device_id: Option<String> },
    Repeat { mode: RepeatMode, device_id: Option<String> },
    Next { device_id: Option<String> },
    Previous { device_id: Option<String> },
    Transfer { device_id: String, play: bool },
    AddToQueue { uri: String, device_id: Option<String> },
    IsSaved { track_id: String },
    SetSaved { track_id: String, saved: bool },
}

#[derive(Default)]
pub struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<VecDeque<EngineError>>,
    snapshots: Mutex<VecDeque<EngineResult<Option<PlaybackState>>>>,
    saved: Mutex<HashSet<String>>,
    queue: Mutex<Vec<Track>>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeRemote {
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The next recorded call fails with `error`.
    pub fn fail_next(&self, error: EngineError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn push_snapshot(&self, snapshot: EngineResult<Option<PlaybackState>>) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    pub fn set_saved_on_server(&self, track_id: &str, saved: bool) {
        let mut ids = self.saved.lock().unwrap();
        if saved {
            ids.insert(track_id.to_string());
        } else {
            ids.remove(track_id);
        }
    }

    pub fn saved_on_server(&self, track_id: &str) -> bool {
        self.saved.lock().unwrap().contains(track_id)
    }

    pub fn set_queue(&self, tracks: Vec<Track>) {
        *self.queue.lock().unwrap() = tracks;
    }

    /// Make `set_saved` wait for a permit on the returned semaphore.
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.write_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, call: RemoteCall) -> EngineResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemotePlayback for FakeRemote {
    async fn current_playback(&self) -> EngineResult<Option<PlaybackState>> {
        self.record(RemoteCall::CurrentPlayback)?;
        self.snapshots.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn queue(&self) -> EngineResult<Vec<Track>> {
        self.record(RemoteCall::Queue)?;
        Ok(self.queue.lock().unwrap().clone())
    }

    async fn play(&self, target: &PlayTarget, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Play {
            target: target.clone(),
            device_id: device_id.map(str::to_string),
        })
    }

    async fn pause(&self, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Pause { device_id: device_id.map(str::to_string) })
    }

    async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Seek { position_ms, device_id: device_id.map(str::to_string) })
    }

    async fn set_volume(&self, percent: u8, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Volume { percent, device_id: device_id.map(str::to_string) })
    }

    async fn set_shuffle(&self, shuffle: bool, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Shuffle { shuffle, device_id: device_id.map(str::to_string) })
    }

    async fn set_repeat(&self, mode: RepeatMode, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Repeat { mode, device_id: device_id.map(str::to_string) })
    }

    async fn next(&self, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Next { device_id: device_id.map(str::to_string) })
    }

    async fn previous(&self, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::Previous { device_id: device_id.map(str::to_string) })
    }

    async fn transfer(&self, device_id: &str, play: bool) -> EngineResult<()> {
        self.record(RemoteCall::Transfer { device_id: device_id.to_string(), play })
    }

    async fn add_to_queue(&self, uri: &str, device_id: Option<&str>) -> EngineResult<()> {
        self.record(RemoteCall::AddToQueue {
            uri: uri.to_string(),
            device_id: device_id.map(str::to_string),
        })
    }

    async fn is_saved(&self, track_id: &str) -> EngineResult<bool> {
        self.record(RemoteCall::IsSaved { track_id: track_id.to_string() })?;
        Ok(self.saved_on_server(track_id))
    }

    async fn set_saved(&self, track_id: &str, saved: bool) -> EngineResult<()> {
        let result = self.record(RemoteCall::SetSaved { track_id: track_id.to_string(), saved });
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if result.is_ok() {
            self.set_saved_on_server(track_id, saved);
        }
        result
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCall {
    Connect,
    Disconnect,
    Play,
    Pause,
    TogglePlay,
    Seek(u64),
    Previous,
    Next,
    Volume(u8),
    Activate,
}

#[derive(Default)]
pub struct FakeFactory {
    log: Arc<Mutex<Vec<DeviceCall>>>,
    tokens: Mutex<Vec<String>>,
    connect_error: Mutex<Option<EngineError>>,
    hang: Arc<AtomicBool>,
    command_error: Arc<Mutex<Option<EngineError>>>,
    events: Mutex<Option<DeviceEventSender>>,
}

impl FakeFactory {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn fail_connect(&self, error: EngineError) {
        *self.connect_error.lock().unwrap() = Some(error);
    }

    /// Transport commands never complete.
    pub fn hang_commands(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Every transport command fails with `error`.
    pub fn fail_commands(&self, error: EngineError) {
        *self.command_error.lock().unwrap() = Some(error);
    }

    /// Deliver a native event as the device would.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DeviceFactory for FakeFactory {
    fn device_name(&self) -> &str {
        "Fake Device"
    }

    async fn create(
        &self,
        access_token: String,
        events: DeviceEventSender,
    ) -> EngineResult<Box<dyn DeviceSdk>> {
        self.tokens.lock().unwrap().push(access_token);
        *self.events.lock().unwrap() = Some(events);
        Ok(Box::new(FakeDevice {
            log: self.log.clone(),
            connect_error: self.connect_error.lock().unwrap().take(),
            hang: self.hang.clone(),
            command_error: self.command_error.clone(),
        }))
    }
}

struct FakeDevice {
    log: Arc<Mutex<Vec<DeviceCall>>>,
    connect_error: Option<EngineError>,
    hang: Arc<AtomicBool>,
    command_error: Arc<Mutex<Option<EngineError>>>,
}

impl FakeDevice {
    async fn command(&self, call: DeviceCall) -> EngineResult<()> {
        self.log.lock().unwrap().push(call);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.command_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceSdk for FakeDevice {
    async fn connect(&self) -> EngineResult<()> {
        self.log.lock().unwrap().push(DeviceCall::Connect);
        match self.connect_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.log.lock().unwrap().push(DeviceCall::Disconnect);
    }

    async fn play(&self) -> EngineResult<()> {
        self.command(DeviceCall::Play).await
    }

    async fn pause(&self) -> EngineResult<()> {
        self.command(DeviceCall::Pause).await
    }

    async fn toggle_play(&self) -> EngineResult<()> {
        self.command(DeviceCall::TogglePlay).await
    }

    async fn seek(&self, position_ms: u64) -> EngineResult<()> {
        self.command(DeviceCall::Seek(position_ms)).await
    }

    async fn previous(&self) -> EngineResult<()> {
        self.command(DeviceCall::Previous).await
    }

    async fn next(&self) -> EngineResult<()> {
        self.command(DeviceCall::Next).await
    }

    async fn set_volume(&self, percent: u8) -> EngineResult<()> {
        self.command(DeviceCall::Volume(percent)).await
    }

    async fn activate(&self) -> EngineResult<()> {
        self.command(DeviceCall::Activate).await
    }
}

pub struct FakeCredentials {
    result: EngineResult<String>,
}

impl FakeCredentials {
    pub fn ok(token: &str) -> Self {
        Self { result: Ok(token.to_string()) }
    }

    pub fn failing(error: EngineError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn access_token(&self) -> EngineResult<String> {
        self.result.clone()
    }
}

#[derive(Default)]
pub struct FakeLyrics {
    fetches: Mutex<Vec<String>>,
    fail_next: AtomicBool,
    delay: Mutex<Option<Duration>>,
    responses: Mutex<HashMap<String, LyricsStatus>>,
}

impl FakeLyrics {
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_response(&self, track_id: &str, status: LyricsStatus) {
        self.responses.lock().unwrap().insert(track_id.to_string(), status);
    }
}

#[async_trait]
impl LyricsSource for FakeLyrics {
    async fn lyrics(&self, track: &Track) -> EngineResult<LyricsStatus> {
        self.fetches.lock().unwrap().push(track.id.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::FetchFailed("lyrics service down".into()));
        }
        let configured = self.responses.lock().unwrap().get(&track.id).cloned();
        Ok(configured.unwrap_or_else(|| LyricsStatus::Unsynced {
            track_id: track.id.clone(),
            text: format!("lyrics for {}", track.name),
        }))
    }
}
