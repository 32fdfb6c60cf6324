//! Spotify Connect device running inside this process

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use librespot::connect::{ConnectConfig, Spirc};
use librespot::core::authentication::Credentials;
use librespot::core::config::SessionConfig;
use librespot::core::session::Session;
use librespot::metadata::audio::UniqueFields;
use librespot::playback::config::{AudioFormat, Bitrate, PlayerConfig};
use librespot::playback::mixer::MixerConfig;
use librespot::playback::player::{Player, PlayerEvent, PlayerEventChannel};
use librespot::playback::{audio_backend, mixer};
use tokio::task::JoinHandle;

use super::{DeviceEvent, DeviceEventSender, DeviceFactory, DeviceSdk, NativePlayerState, NativeTrack};
use crate::error::{EngineError, EngineResult, ErrorKind};

pub struct LibrespotFactory {
    device_name: String,
}

impl LibrespotFactory {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    fn device_id(&self) -> String {
        // Stable per machine so the account sees one device across restarts
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!("{}-{}", self.device_name, hostname)
    }
}

#[async_trait]
impl DeviceFactory for LibrespotFactory {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    async fn create(
        &self,
        access_token: String,
        events: DeviceEventSender,
    ) -> EngineResult<Box<dyn DeviceSdk>> {
        Ok(Box::new(LibrespotDevice {
            device_name: self.device_name.clone(),
            device_id: self.device_id(),
            access_token,
            events,
            running: tokio::sync::Mutex::new(None),
            mirror: Arc::new(Mutex::new(NativePlayerState::default())),
        }))
    }
}

struct Running {
    session: Session,
    spirc: Spirc,
    _player: Arc<Player>,
    tasks: Vec<JoinHandle<()>>,
}

impl Running {
    fn stop(&mut self) {
        if let Err(e) = self.spirc.shutdown() {
            tracing::debug!(error = %e, "Spirc shutdown failed");
        }
        self.session.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub struct LibrespotDevice {
    device_name: String,
    device_id: String,
    access_token: String,
    events: DeviceEventSender,
    running: tokio::sync::Mutex<Option<Running>>,
    mirror: Arc<Mutex<NativePlayerState>>,
}

fn init_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::InitializationFailed(error.to_string())
}

fn playback_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::PlaybackFailed(error.to_string())
}

impl LibrespotDevice {
    async fn with_spirc(
        &self,
        operation: &'static str,
        op: impl FnOnce(&Spirc) -> Result<(), librespot::core::Error>,
    ) -> EngineResult<()> {
        let running = self.running.lock().await;
        let Some(running) = running.as_ref() else {
            return Err(EngineError::DeviceUnavailable);
        };
        tracing::debug!(operation, "Spirc command");
        op(&running.spirc).map_err(playback_error)
    }
}

#[async_trait]
impl DeviceSdk for LibrespotDevice {
    async fn connect(&self) -> EngineResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        tracing::info!(device_name = %self.device_name, device_id = %self.device_id, "Connecting librespot");
        let session_config = SessionConfig {
            device_id: self.device_id.clone(),
            ..Default::default()
        };
        let player_config = PlayerConfig {
            bitrate: Bitrate::Bitrate320,
            ..Default::default()
        };
        let connect_config = ConnectConfig {
            name: self.device_name.clone(),
            ..Default::default()
        };
        let audio_format = AudioFormat::default();

        let sink_builder = audio_backend::find(None)
            .ok_or_else(|| init_error("no audio backend available"))?;
        let mixer_builder =
            mixer::find(None).ok_or_else(|| init_error("no mixer available"))?;
        let mixer = mixer_builder(MixerConfig::default()).map_err(init_error)?;

        let session = Session::new(session_config, None);
        let player = Player::new(
            player_config,
            session.clone(),
            mixer.get_soft_volume(),
            move || sink_builder(None, audio_format),
        );
        let player_events = player.get_player_event_channel();

        let credentials = Credentials::with_access_token(self.access_token.clone());
        let (spirc, spirc_task) = Spirc::new(
            connect_config,
            session.clone(),
            credentials,
            player.clone(),
            mixer,
        )
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("credentials") {
                EngineError::AuthenticationFailed(message)
            } else {
                init_error(message)
            }
        })?;

        if let Some(account_type) = session.get_user_attribute("type") {
            tracing::debug!(account_type = %account_type, "Account type");
            if account_type != "premium" {
                let _ = spirc.shutdown();
                session.shutdown();
                return Err(EngineError::AccountRestricted);
            }
        }

        let spirc_events = self.events.clone();
        let spirc_task = tokio::spawn(async move {
            spirc_task.await;
            tracing::debug!("Spirc task finished");
            let _ = spirc_events.send(DeviceEvent::StateChanged(None));
        });
        let event_task = tokio::spawn(forward_player_events(
            player_events,
            self.events.clone(),
            self.mirror.clone(),
            self.device_id.clone(),
        ));

        *running = Some(Running {
            session,
            spirc,
            _player: player,
            tasks: vec![spirc_task, event_task],
        });

        tracing::info!(device_id = %self.device_id, "Librespot connected");
        let _ = self.events.send(DeviceEvent::Ready {
            device_id: self.device_id.clone(),
        });
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(mut running) = self.running.lock().await.take() {
            tracing::info!("Disconnecting librespot");
            running.stop();
        }
    }

    async fn play(&self) -> EngineResult<()> {
        self.with_spirc("play", |spirc| spirc.play()).await
    }

    async fn pause(&self) -> EngineResult<()> {
        self.with_spirc("pause", |spirc| spirc.pause()).await
    }

    async fn toggle_play(&self) -> EngineResult<()> {
        self.with_spirc("toggle_play", |spirc| spirc.play_pause()).await
    }

    async fn seek(&self, position_ms: u64) -> EngineResult<()> {
        let position_ms = u32::try_from(position_ms).unwrap_or(u32::MAX);
        self.with_spirc("seek", move |spirc| spirc.set_position_ms(position_ms))
            .await
    }

    async fn previous(&self) -> EngineResult<()> {
        self.with_spirc("previous", |spirc| spirc.prev()).await
    }

    async fn next(&self) -> EngineResult<()> {
        self.with_spirc("next", |spirc| spirc.next()).await
    }

    async fn set_volume(&self, percent: u8) -> EngineResult<()> {
        let volume = volume_from_percent(percent);
        self.with_spirc("set_volume", move |spirc| spirc.set_volume(volume))
            .await
    }

    async fn activate(&self) -> EngineResult<()> {
        self.with_spirc("activate", |spirc| spirc.activate()).await
    }
}

impl Drop for LibrespotDevice {
    fn drop(&mut self) {
        if let Some(mut running) = self.running.get_mut().take() {
            running.stop();
        }
    }
}

fn volume_from_percent(percent: u8) -> u16 {
    (u32::from(percent.min(100)) * u32::from(u16::MAX) / 100) as u16
}

fn percent_from_volume(volume: u16) -> u8 {
    ((u32::from(volume) * 100 + u32::from(u16::MAX) / 2) / u32::from(u16::MAX)) as u8
}

fn repeat_code(context: bool, track: bool) -> u8 {
    match (context, track) {
        (_, true) => 2,
        (true, false) => 1,
        (false, false) => 0,
    }
}

/// Translate librespot player events into device events, keeping a mirror of
/// the full player state since librespot only reports deltas.
async fn forward_player_events(
    mut channel: PlayerEventChannel,
    events: DeviceEventSender,
    mirror: Arc<Mutex<NativePlayerState>>,
    device_id: String,
) {
    tracing::info!("Starting librespot player event listener");

    while let Some(event) = channel.recv().await {
        let outgoing = {
            let mut state = mirror.lock().unwrap_or_else(PoisonError::into_inner);
            translate(&mut state, event, &device_id)
        };
        if let Some(outgoing) = outgoing {
            if events.send(outgoing).is_err() {
                tracing::debug!("Device event receiver dropped, stopping listener");
                break;
            }
        }
    }
}

fn translate(
    state: &mut NativePlayerState,
    event: PlayerEvent,
    device_id: &str,
) -> Option<DeviceEvent> {
    match event {
        PlayerEvent::Playing { position_ms, .. } => {
            tracing::trace!(position_ms, "PlayerEvent::Playing");
            state.paused = false;
            state.position_ms = u64::from(position_ms);
        }
        PlayerEvent::Paused { position_ms, .. } => {
            tracing::debug!(position_ms, "PlayerEvent::Paused");
            state.paused = true;
            state.position_ms = u64::from(position_ms);
        }
        PlayerEvent::PositionChanged { position_ms, .. }
        | PlayerEvent::Seeked { position_ms, .. }
        | PlayerEvent::PositionCorrection { position_ms, .. } => {
            tracing::trace!(position_ms, "PlayerEvent position update");
            state.position_ms = u64::from(position_ms);
        }
        PlayerEvent::Loading { position_ms, .. } => {
            tracing::debug!(position_ms, "PlayerEvent::Loading");
            state.position_ms = u64::from(position_ms);
            return None;
        }
        PlayerEvent::TrackChanged { audio_item } => {
            let (artists, album) = match &audio_item.unique_fields {
                UniqueFields::Track { artists, album, .. } => (
                    artists.0.iter().map(|a| a.name.clone()).collect(),
                    album.clone(),
                ),
                UniqueFields::Episode { show_name, .. } => {
                    (vec![show_name.clone()], "Podcast".to_string())
                }
                UniqueFields::Local { artists, album, .. } => (
                    artists.clone().into_iter().collect(),
                    album.clone().unwrap_or_default(),
                ),
            };
            let uri = audio_item.track_id.to_uri().unwrap_or_default();

            tracing::info!(
                track = %audio_item.name,
                duration_ms = audio_item.duration_ms,
                uri = %uri,
                "PlayerEvent::TrackChanged"
            );
            state.track = Some(NativeTrack {
                id: None,
                uri,
                name: audio_item.name.clone(),
                artists,
                album,
                duration_ms: u64::from(audio_item.duration_ms),
            });
        }
        PlayerEvent::ShuffleChanged { shuffle, .. } => {
            state.shuffle = shuffle;
        }
        PlayerEvent::RepeatChanged { context, track, .. } => {
            state.repeat_mode = repeat_code(context, track);
        }
        PlayerEvent::VolumeChanged { volume, .. } => {
            state.volume_percent = Some(percent_from_volume(volume));
        }
        PlayerEvent::Stopped { .. } => {
            tracing::debug!("PlayerEvent::Stopped");
            state.paused = true;
            return Some(DeviceEvent::StateChanged(None));
        }
        PlayerEvent::EndOfTrack { .. } => {
            tracing::debug!("PlayerEvent::EndOfTrack");
            return None;
        }
        PlayerEvent::Unavailable { .. } => {
            return Some(DeviceEvent::Error {
                kind: ErrorKind::PlaybackFailed,
                message: "track unavailable".into(),
            });
        }
        PlayerEvent::SessionDisconnected { .. } => {
            tracing::warn!("PlayerEvent::SessionDisconnected");
            return Some(DeviceEvent::NotReady {
                device_id: device_id.to_string(),
            });
        }
        _ => {
            tracing::trace!("PlayerEvent: other event received");
            return None;
        }
    }

    state.track.as_ref()?;
    Some(DeviceEvent::StateChanged(Some(state.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_conversion_covers_full_range() {
        assert_eq!(volume_from_percent(0), 0);
        assert_eq!(volume_from_percent(100), u16::MAX);
        assert_eq!(volume_from_percent(200), u16::MAX);
        assert_eq!(percent_from_volume(u16::MAX), 100);
        assert_eq!(percent_from_volume(volume_from_percent(37)), 37);
    }

    #[test]
    fn track_repeat_wins_over_context_repeat() {
        assert_eq!(repeat_code(false, false), 0);
        assert_eq!(repeat_code(true, false), 1);
        assert_eq!(repeat_code(true, true), 2);
        assert_eq!(repeat_code(false, true), 2);
    }

    #[tokio::test]
    async fn factory_names_device_after_host() {
        let factory = LibrespotFactory::new("Spotify-Sync");
        assert_eq!(factory.device_name(), "Spotify-Sync");
        assert!(factory.device_id().starts_with("Spotify-Sync-"));
    }

    #[tokio::test]
    async fn commands_before_connect_are_unavailable() {
        let factory = LibrespotFactory::new("Spotify-Sync");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let device = factory.create("token".into(), tx).await.unwrap();
        assert_eq!(device.play().await, Err(EngineError::DeviceUnavailable));
        device.disconnect().await;
    }
}
