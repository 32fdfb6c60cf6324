//! Lifecycle owner of the in-process playback device

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::{CredentialProvider, DeviceEvent, DeviceFactory, DeviceSdk, NativePlayerState};
use crate::engine::{AuthSignal, Reconciler};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::model::{
    Capability, DeviceAdapterState, DeviceRef, DeviceStatus, PlaybackState, RepeatMode, Source,
    Track, TransportCommand,
};
use crate::remote::RemotePlayback;

/// Owns at most one device instance and translates its callbacks into
/// lifecycle state and reconciler updates.
pub struct LocalDeviceAdapter {
    factory: Arc<dyn DeviceFactory>,
    credentials: Arc<dyn CredentialProvider>,
    remote: Arc<dyn RemotePlayback>,
    reconciler: Arc<Reconciler>,
    auth: AuthSignal,
    instance: Mutex<Option<Arc<dyn DeviceSdk>>>,
    state: watch::Sender<DeviceAdapterState>,
    activated: AtomicBool,
}

impl LocalDeviceAdapter {
    pub fn new(
        factory: Arc<dyn DeviceFactory>,
        credentials: Arc<dyn CredentialProvider>,
        remote: Arc<dyn RemotePlayback>,
        reconciler: Arc<Reconciler>,
        auth: AuthSignal,
    ) -> Self {
        let (state, _rx) = watch::channel(DeviceAdapterState::default());
        Self {
            factory,
            credentials,
            remote,
            reconciler,
            auth,
            instance: Mutex::new(None),
            state,
            activated: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceAdapterState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DeviceAdapterState {
        self.state.borrow().clone()
    }

    /// Whether the user-gesture activation already happened for this instance.
    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    fn instance(&self) -> Option<Arc<dyn DeviceSdk>> {
        self.instance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, edit: impl FnOnce(&mut DeviceAdapterState)) {
        self.state.send_modify(edit);
    }

    /// Record an initialization or runtime failure and hand it back.
    fn fail(&self, error: EngineError) -> EngineError {
        let error = match error.kind() {
            ErrorKind::DeviceUnavailable | ErrorKind::CommandRejected | ErrorKind::FetchFailed => {
                EngineError::InitializationFailed(error.to_string())
            }
            _ => error,
        };
        let kind = error.kind();
        tracing::error!(error = %error, ?kind, "Local playback device failed");

        if error.is_auth() {
            self.auth.raise(&error);
        }
        self.update(|state| {
            state.status = DeviceStatus::Error(kind);
            state.last_error = Some(kind);
            if kind == ErrorKind::AccountRestricted {
                state.is_premium_account = false;
            }
        });
        error
    }

    /// Create and connect the device. Returns the receiver its events arrive
    /// on; feed it to [`run_events`](Self::run_events).
    ///
    /// Failures are reported once and never retried here.
    pub async fn initialize(&self) -> EngineResult<mpsc::UnboundedReceiver<DeviceEvent>> {
        if self.instance().is_some() {
            return Err(EngineError::InitializationFailed(
                "device already initialized".into(),
            ));
        }

        tracing::info!(device_name = self.factory.device_name(), "Initializing local playback device");
        self.update(|state| {
            state.status = DeviceStatus::Initializing;
            state.last_error = None;
        });

        let token = match self.credentials.access_token().await {
            Ok(token) => token,
            Err(e) if e.is_auth() => return Err(self.fail(e)),
            Err(e) => return Err(self.fail(EngineError::AuthenticationFailed(e.to_string()))),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let sdk: Arc<dyn DeviceSdk> = match self.factory.create(token, tx).await {
            Ok(sdk) => Arc::from(sdk),
            Err(e) => return Err(self.fail(e)),
        };

        if let Err(e) = sdk.connect().await {
            sdk.disconnect().await;
            return Err(self.fail(e));
        }

        *self.instance.lock().unwrap_or_else(PoisonError::into_inner) = Some(sdk);
        self.activated.store(false, Ordering::SeqCst);
        tracing::debug!("Local playback device connected, waiting for ready");
        Ok(rx)
    }

    /// Pump device events until the device side hangs up.
    pub async fn run_events(&self, mut events: mpsc::UnboundedReceiver<DeviceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("Device event channel closed");
    }

    pub async fn handle_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Ready { device_id } => {
                tracing::info!(device_id = %device_id, "Local playback device ready");
                self.update(|state| {
                    state.status = DeviceStatus::Ready;
                    state.device_id = Some(device_id.clone());
                    state.is_premium_account = true;
                    state.last_error = None;
                });

                // Register the device with the account without starting playback
                if let Err(e) = self.remote.transfer(&device_id, false).await {
                    tracing::debug!(error = %e, "Courtesy transfer to local device failed");
                }
            }
            DeviceEvent::NotReady { device_id } => {
                tracing::warn!(device_id = %device_id, "Local playback device went offline");
                self.activated.store(false, Ordering::SeqCst);
                self.update(|state| {
                    state.status = DeviceStatus::NotReady;
                    state.device_id = None;
                });
                let ticket = self.reconciler.ticket();
                self.reconciler.local_playback_stopped(ticket);
            }
            DeviceEvent::StateChanged(Some(native)) => {
                let adapter_state = self.state();
                if adapter_state.is_lost() {
                    tracing::trace!("Ignoring state from a device that is not ready");
                    return;
                }
                if adapter_state.status != DeviceStatus::Active {
                    self.update(|state| state.status = DeviceStatus::Active);
                }

                let ticket = self.reconciler.ticket();
                let fragment = self.fragment_from_native(&native, adapter_state.device_id);
                self.reconciler.apply(ticket, Source::Local, fragment);
            }
            DeviceEvent::StateChanged(None) => {
                tracing::debug!("Local playback stopped");
                if self.state.borrow().status == DeviceStatus::Active {
                    self.update(|state| state.status = DeviceStatus::Ready);
                }
                let ticket = self.reconciler.ticket();
                self.reconciler.local_playback_stopped(ticket);
            }
            DeviceEvent::Error { kind: ErrorKind::PlaybackFailed, message }
                if self.state.borrow().usable_device_id().is_some() =>
            {
                // A single track failing leaves the player itself usable
                tracing::warn!(error = %message, "Local playback of the current item failed");
                self.update(|state| state.last_error = Some(ErrorKind::PlaybackFailed));
            }
            DeviceEvent::Error { kind, message } => {
                self.fail(EngineError::from_kind(kind, message));
            }
        }
    }

    fn fragment_from_native(
        &self,
        native: &NativePlayerState,
        device_id: Option<String>,
    ) -> PlaybackState {
        let track = native.track.as_ref().map(|t| Track {
            id: t
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| Track::id_from_uri(&t.uri))
                .unwrap_or_default(),
            name: t.name.clone(),
            artists: t.artists.clone(),
            album: t.album.clone(),
            duration_ms: t.duration_ms,
            uri: t.uri.clone(),
        });

        PlaybackState {
            is_playing: !native.paused,
            progress_ms: native.position_ms,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            observed_at: Instant::now(),
            track,
            device: Some(DeviceRef {
                id: device_id,
                name: self.factory.device_name().to_string(),
                kind: "Computer".into(),
                volume_percent: native.volume_percent,
                is_restricted: false,
            }),
            shuffle: native.shuffle,
            repeat: RepeatMode::from_code(native.repeat_mode),
            context_uri: native.context_uri.clone(),
            disallows: native
                .disallows
                .iter()
                .filter_map(|key| Capability::from_key(key))
                .collect(),
            ..Default::default()
        }
    }

    /// Run `op` against the live instance, failing fast if the device is
    /// lost while the call is in flight.
    async fn with_instance<F, Fut>(&self, operation: &'static str, op: F) -> EngineResult<()>
    where
        F: FnOnce(Arc<dyn DeviceSdk>) -> Fut,
        Fut: Future<Output = EngineResult<()>>,
    {
        let Some(sdk) = self.instance() else {
            tracing::debug!(operation, "No local device instance");
            return Err(EngineError::DeviceUnavailable);
        };

        let mut state_rx = self.state.subscribe();
        if state_rx.borrow_and_update().is_lost() {
            return Err(EngineError::DeviceUnavailable);
        }

        tracing::debug!(operation, "Local device command");
        tokio::select! {
            result = op(sdk) => {
                if let Err(ref e) = result {
                    tracing::warn!(operation, error = %e, "Local device command failed");
                }
                result
            }
            _ = state_rx.wait_for(|state| state.is_lost()) => {
                tracing::warn!(operation, "Local device lost during command");
                Err(EngineError::DeviceUnavailable)
            }
        }
    }

    pub async fn send(&self, command: TransportCommand) -> EngineResult<()> {
        self.with_instance(command.name(), move |sdk| async move {
            match command {
                TransportCommand::Play => sdk.play().await,
                TransportCommand::Pause => sdk.pause().await,
                TransportCommand::Seek(position_ms) => sdk.seek(position_ms).await,
                TransportCommand::Previous => sdk.previous().await,
                TransportCommand::Next => sdk.next().await,
                TransportCommand::Volume(percent) => sdk.set_volume(percent.min(100)).await,
            }
        })
        .await
    }

    pub async fn play(&self) -> EngineResult<()> {
        self.send(TransportCommand::Play).await
    }

    pub async fn pause(&self) -> EngineResult<()> {
        self.send(TransportCommand::Pause).await
    }

    pub async fn toggle_play(&self) -> EngineResult<()> {
        self.with_instance("toggle_play", |sdk| async move { sdk.toggle_play().await })
            .await
    }

    pub async fn seek(&self, position_ms: u64) -> EngineResult<()> {
        self.send(TransportCommand::Seek(position_ms)).await
    }

    pub async fn previous(&self) -> EngineResult<()> {
        self.send(TransportCommand::Previous).await
    }

    pub async fn next(&self) -> EngineResult<()> {
        self.send(TransportCommand::Next).await
    }

    pub async fn set_volume(&self, percent: u8) -> EngineResult<()> {
        self.send(TransportCommand::Volume(percent)).await
    }

    pub async fn activate(&self) -> EngineResult<()> {
        self.with_instance("activate", |sdk| async move { sdk.activate().await })
            .await?;
        self.activated.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Ask the remote service to move playback onto this device.
    pub async fn transfer_here(&self, start_playing: bool) -> EngineResult<()> {
        let device_id = self
            .state
            .borrow()
            .usable_device_id()
            .map(str::to_string)
            .ok_or(EngineError::DeviceUnavailable)?;
        self.remote.transfer(&device_id, start_playing).await
    }

    /// Disconnect and release the instance. Safe to call more than once.
    pub async fn shutdown(&self) {
        let sdk = self
            .instance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sdk) = sdk {
            tracing::info!("Disconnecting local playback device");
            sdk.disconnect().await;
        }
        self.activated.store(false, Ordering::SeqCst);
        self.update(|state| {
            state.status = DeviceStatus::Uninitialized;
            state.device_id = None;
        });
    }
}
