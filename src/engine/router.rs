//! Routes playback commands to the surface that currently owns playback

use std::sync::Arc;

use tokio::time::Instant;

use super::{AuthSignal, Reconciler};
use crate::device::LocalDeviceAdapter;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Capability, DeviceRef, DeviceStatus, PlayTarget, PlaybackState, RepeatMode, Track,
    TransportCommand,
};
use crate::remote::RemotePlayback;

enum Route {
    Local(Arc<LocalDeviceAdapter>),
    /// Remote service, addressed at the given device or at whatever device
    /// the service considers active.
    Remote(Option<String>),
}

/// Command surface handed to the UI.
///
/// Every handler is independent: a failure only reverts the optimistic
/// field that handler set.
#[derive(Clone)]
pub struct CommandRouter {
    remote: Arc<dyn RemotePlayback>,
    device: Option<Arc<LocalDeviceAdapter>>,
    reconciler: Arc<Reconciler>,
    auth: AuthSignal,
    restart_threshold_ms: u64,
}

impl CommandRouter {
    pub fn new(
        remote: Arc<dyn RemotePlayback>,
        device: Option<Arc<LocalDeviceAdapter>>,
        reconciler: Arc<Reconciler>,
        auth: AuthSignal,
        restart_threshold_ms: u64,
    ) -> Self {
        Self {
            remote,
            device,
            reconciler,
            auth,
            restart_threshold_ms,
        }
    }

    fn route(&self) -> Route {
        match &self.device {
            Some(adapter) => {
                let state = adapter.state();
                if state.is_active() {
                    Route::Local(adapter.clone())
                } else {
                    Route::Remote(state.usable_device_id().map(str::to_string))
                }
            }
            None => Route::Remote(None),
        }
    }

    /// Device id for remote-only operations: the local device when usable.
    fn remote_target(&self) -> Option<String> {
        self.device
            .as_ref()
            .and_then(|adapter| adapter.state().usable_device_id().map(str::to_string))
    }

    fn ensure_allowed(&self, capability: Option<Capability>, operation: &str) -> EngineResult<()> {
        match capability {
            Some(capability) if !self.reconciler.current().allows(capability) => {
                tracing::debug!(operation, ?capability, "Command disallowed by server");
                Err(EngineError::CommandRejected(format!("{} is not allowed right now", operation)))
            }
            _ => Ok(()),
        }
    }

    fn finish<T>(&self, operation: &str, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(ref e) = result {
            if e.is_auth() {
                self.auth.raise(e);
            }
            tracing::warn!(operation, error = %e, "Command failed");
        }
        result
    }

    /// Apply `edit` as an optimistic echo around `call`, reverting with
    /// `revert` if the call fails and the echo is still current.
    async fn with_echo<T, F>(
        &self,
        edit: impl FnOnce(&mut PlaybackState),
        revert: impl FnOnce(&mut PlaybackState),
        call: F,
    ) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let revision = self.reconciler.apply_optimistic(edit);
        let result = call.await;
        if result.is_err() && self.reconciler.rollback(revision, revert) {
            tracing::debug!(revision, "Rolled back optimistic echo");
        }
        result
    }

    async fn remote_transport(
        &self,
        command: TransportCommand,
        device_id: Option<&str>,
    ) -> EngineResult<()> {
        match command {
            TransportCommand::Play => self.remote.play(&PlayTarget::Resume, device_id).await,
            TransportCommand::Pause => self.remote.pause(device_id).await,
            TransportCommand::Seek(position_ms) => self.remote.seek(position_ms, device_id).await,
            TransportCommand::Previous => self.remote.previous(device_id).await,
            TransportCommand::Next => self.remote.next(device_id).await,
            TransportCommand::Volume(percent) => self.remote.set_volume(percent, device_id).await,
        }
    }

    async fn dispatch(&self, command: TransportCommand) -> EngineResult<()> {
        match self.route() {
            Route::Local(adapter) => match adapter.send(command).await {
                Err(EngineError::DeviceUnavailable) => {
                    let device_id = adapter.state().usable_device_id().map(str::to_string);
                    tracing::info!(
                        command = command.name(),
                        device_id = ?device_id,
                        "Local device unavailable, falling back to remote"
                    );
                    self.remote_transport(command, device_id.as_deref()).await
                }
                other => other,
            },
            Route::Remote(device_id) => self.remote_transport(command, device_id.as_deref()).await,
        }
    }

    /// Start playback of `target`, or resume.
    pub async fn play(&self, target: PlayTarget) -> EngineResult<()> {
        let capability = match target {
            PlayTarget::Resume => TransportCommand::Play.capability(),
            _ => None,
        };
        self.ensure_allowed(capability, "play")?;

        let was_playing = self.reconciler.current().is_playing;
        let result = self
            .with_echo(
                |state| {
                    state.rebase(Instant::now());
                    state.is_playing = true;
                },
                move |state| state.is_playing = was_playing,
                self.start(&target),
            )
            .await;
        self.finish("play", result)
    }

    async fn start(&self, target: &PlayTarget) -> EngineResult<()> {
        let Some(adapter) = &self.device else {
            return self.remote.play(target, None).await;
        };

        let device = adapter.state();
        match (device.status, device.device_id.as_deref()) {
            (DeviceStatus::Ready, Some(device_id)) if !adapter.is_activated() => {
                tracing::debug!(device_id, "Activating local device before first playback");
                adapter.activate().await?;
                match target {
                    PlayTarget::Resume => adapter.transfer_here(true).await,
                    _ => self.remote.play(target, Some(device_id)).await,
                }
            }
            (DeviceStatus::Active, _) if *target == PlayTarget::Resume => {
                self.dispatch(TransportCommand::Play).await
            }
            _ => {
                let device_id = device.usable_device_id();
                self.remote.play(target, device_id).await
            }
        }
    }

    pub async fn pause(&self) -> EngineResult<()> {
        self.ensure_allowed(TransportCommand::Pause.capability(), "pause")?;
        let was_playing = self.reconciler.current().is_playing;
        let result = self
            .with_echo(
                |state| {
                    state.rebase(Instant::now());
                    state.is_playing = false;
                },
                move |state| state.is_playing = was_playing,
                self.dispatch(TransportCommand::Pause),
            )
            .await;
        self.finish("pause", result)
    }

    pub async fn toggle_play(&self) -> EngineResult<()> {
        if self.reconciler.current().is_playing {
            self.pause().await
        } else {
            self.play(PlayTarget::Resume).await
        }
    }

    pub async fn seek(&self, position_ms: u64) -> EngineResult<()> {
        self.ensure_allowed(TransportCommand::Seek(position_ms).capability(), "seek")?;
        let current = self.reconciler.current();
        let position_ms = current
            .duration_ms()
            .map_or(position_ms, |duration| position_ms.min(duration));
        let (previous_progress, previous_observed) = (current.progress_ms, current.observed_at);

        let result = self
            .with_echo(
                |state| {
                    state.progress_ms = position_ms;
                    state.observed_at = Instant::now();
                },
                move |state| {
                    state.progress_ms = previous_progress;
                    state.observed_at = previous_observed;
                },
                self.dispatch(TransportCommand::Seek(position_ms)),
            )
            .await;
        self.finish("seek", result)
    }

    /// Restart the current track once it has played past the restart
    /// threshold, otherwise go to the previous track.
    pub async fn previous(&self) -> EngineResult<()> {
        let position = self.reconciler.current().position_at(Instant::now());
        if position > self.restart_threshold_ms {
            tracing::debug!(position_ms = position, "Restarting current track");
            return self.seek(0).await;
        }

        self.ensure_allowed(TransportCommand::Previous.capability(), "previous")?;
        let result = self.dispatch(TransportCommand::Previous).await;
        self.finish("previous", result)
    }

    pub async fn next(&self) -> EngineResult<()> {
        self.ensure_allowed(TransportCommand::Next.capability(), "next")?;
        let result = self.dispatch(TransportCommand::Next).await;
        self.finish("next", result)
    }

    pub async fn set_volume(&self, percent: u8) -> EngineResult<()> {
        let percent = percent.min(100);
        let previous = self.reconciler.current().volume_percent();
        let result = self
            .with_echo(
                |state| set_device_volume(state, Some(percent)),
                move |state| set_device_volume(state, previous),
                self.dispatch(TransportCommand::Volume(percent)),
            )
            .await;
        self.finish("set_volume", result)
    }

    pub async fn set_shuffle(&self, shuffle: bool) -> EngineResult<()> {
        self.ensure_allowed(Some(Capability::TogglingShuffle), "shuffle")?;
        let previous = self.reconciler.current().shuffle;
        let device_id = self.remote_target();
        let result = self
            .with_echo(
                |state| state.shuffle = shuffle,
                move |state| state.shuffle = previous,
                self.remote.set_shuffle(shuffle, device_id.as_deref()),
            )
            .await;
        self.finish("set_shuffle", result)
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> EngineResult<()> {
        let capability = match mode {
            RepeatMode::Track => Capability::TogglingRepeatTrack,
            RepeatMode::Off | RepeatMode::Context => Capability::TogglingRepeatContext,
        };
        self.ensure_allowed(Some(capability), "repeat")?;
        let previous = self.reconciler.current().repeat;
        let device_id = self.remote_target();
        let result = self
            .with_echo(
                |state| state.repeat = mode,
                move |state| state.repeat = previous,
                self.remote.set_repeat(mode, device_id.as_deref()),
            )
            .await;
        self.finish("set_repeat", result)
    }

    /// Move playback from whatever device owns it onto the local device.
    pub async fn transfer_here(&self, start_playing: bool) -> EngineResult<()> {
        self.ensure_allowed(Some(Capability::TransferringPlayback), "transfer")?;
        let result = match &self.device {
            Some(adapter) => adapter.transfer_here(start_playing).await,
            None => Err(EngineError::DeviceUnavailable),
        };
        self.finish("transfer_here", result)
    }

    pub async fn add_to_queue(&self, uri: &str) -> EngineResult<()> {
        let device_id = self.remote_target();
        let result = self.remote.add_to_queue(uri, device_id.as_deref()).await;
        self.finish("add_to_queue", result)
    }

    pub async fn queue(&self) -> EngineResult<Vec<Track>> {
        let result = self.remote.queue().await;
        self.finish("queue", result)
    }
}

fn set_device_volume(state: &mut PlaybackState, percent: Option<u8>) {
    state
        .device
        .get_or_insert_with(DeviceRef::default)
        .volume_percent = percent;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, NativePlayerState, NativeTrack};
    use crate::engine::AuthStatus;
    use crate::model::Source;
    use crate::testing::{DeviceCall, FakeCredentials, FakeFactory, FakeRemote, RemoteCall};

    struct Harness {
        router: CommandRouter,
        remote: Arc<FakeRemote>,
        factory: Arc<FakeFactory>,
        adapter: Arc<LocalDeviceAdapter>,
        reconciler: Arc<Reconciler>,
        auth: AuthSignal,
    }

    fn harness() -> Harness {
        let remote = Arc::new(FakeRemote::default());
        let factory = Arc::new(FakeFactory::default());
        let reconciler = Arc::new(Reconciler::new());
        let auth = AuthSignal::new();
        let adapter = Arc::new(LocalDeviceAdapter::new(
            factory.clone(),
            Arc::new(FakeCredentials::ok("token")),
            remote.clone(),
            reconciler.clone(),
            auth.clone(),
        ));
        let router = CommandRouter::new(
            remote.clone(),
            Some(adapter.clone()),
            reconciler.clone(),
            auth.clone(),
            3_000,
        );
        Harness { router, remote, factory, adapter, reconciler, auth }
    }

    /// Adapter `Ready` as `local-1`, with the courtesy transfer forgotten.
    async fn ready(h: &Harness) -> Vec<RemoteCall> {
        h.adapter.initialize().await.unwrap();
        h.adapter
            .handle_event(DeviceEvent::Ready { device_id: "local-1".into() })
            .await;
        h.remote.calls()
    }

    async fn active(h: &Harness, paused: bool, position_ms: u64) {
        h.adapter
            .handle_event(DeviceEvent::StateChanged(Some(NativePlayerState {
                paused,
                position_ms,
                track: Some(NativeTrack {
                    uri: "spotify:track:abc".into(),
                    duration_ms: 200_000,
                    ..Default::default()
                }),
                ..Default::default()
            })))
            .await;
    }

    fn remote_playing(h: &Harness, progress_ms: u64) {
        let ticket = h.reconciler.ticket();
        h.reconciler.apply(
            ticket,
            Source::Remote,
            PlaybackState {
                is_playing: true,
                progress_ms,
                track: Some(Track { id: "r".into(), duration_ms: 200_000, ..Default::default() }),
                ..Default::default()
            },
        );
    }

    fn track_target() -> PlayTarget {
        PlayTarget::Track { uri: "spotify:track:xyz".into() }
    }

    #[tokio::test]
    async fn without_local_device_remote_picks_the_device() {
        let remote = Arc::new(FakeRemote::default());
        let router = CommandRouter::new(
            remote.clone(),
            None,
            Arc::new(Reconciler::new()),
            AuthSignal::new(),
            3_000,
        );

        router.play(track_target()).await.unwrap();
        router.next().await.unwrap();
        assert_eq!(
            remote.calls(),
            vec![
                RemoteCall::Play { target: track_target(), device_id: None },
                RemoteCall::Next { device_id: None },
            ]
        );
    }

    #[tokio::test]
    async fn first_play_on_ready_device_activates_then_plays_there() {
        let h = harness();
        let before = ready(&h).await.len();

        h.router.play(track_target()).await.unwrap();

        assert_eq!(
            h.factory.calls(),
            vec![DeviceCall::Connect, DeviceCall::Activate]
        );
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Play { target: track_target(), device_id: Some("local-1".into()) }]
        );

        // Activation happens once
        h.router.play(track_target()).await.unwrap();
        assert_eq!(
            h.factory.calls(),
            vec![DeviceCall::Connect, DeviceCall::Activate]
        );
    }

    #[tokio::test]
    async fn resume_on_ready_device_transfers_with_autoplay() {
        let h = harness();
        let before = ready(&h).await.len();

        h.router.play(PlayTarget::Resume).await.unwrap();
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Transfer { device_id: "local-1".into(), play: true }]
        );
        assert!(!h.factory.calls().contains(&DeviceCall::Play));
    }

    #[tokio::test]
    async fn active_device_takes_transport_directly() {
        let h = harness();
        let before = ready(&h).await.len();
        active(&h, false, 10_000).await;

        h.router.pause().await.unwrap();
        h.router.seek(42_000).await.unwrap();
        h.router.next().await.unwrap();
        h.router.set_volume(30).await.unwrap();

        assert_eq!(h.remote.calls().len(), before);
        assert_eq!(
            h.factory.calls()[1..],
            [
                DeviceCall::Pause,
                DeviceCall::Seek(42_000),
                DeviceCall::Next,
                DeviceCall::Volume(30),
            ]
        );
    }

    #[tokio::test]
    async fn ready_device_is_addressed_through_remote() {
        let h = harness();
        let before = ready(&h).await.len();

        h.router.next().await.unwrap();
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Next { device_id: Some("local-1".into()) }]
        );
    }

    #[tokio::test]
    async fn lost_device_falls_back_to_remote_without_stale_id() {
        let h = harness();
        let before = ready(&h).await.len();
        active(&h, false, 0).await;
        h.adapter
            .handle_event(DeviceEvent::NotReady { device_id: "local-1".into() })
            .await;

        h.router.next().await.unwrap();
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Next { device_id: None }]
        );
    }

    #[tokio::test]
    async fn local_unavailable_mid_command_falls_back() {
        let h = harness();
        let before = ready(&h).await.len();
        active(&h, false, 0).await;
        h.factory.fail_commands(EngineError::DeviceUnavailable);

        h.router.next().await.unwrap();
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Next { device_id: Some("local-1".into()) }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn previous_restarts_past_threshold() {
        let h = harness();
        remote_playing(&h, 3_001);
        h.router.previous().await.unwrap();
        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Seek { position_ms: 0, device_id: None }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn previous_at_threshold_goes_back() {
        let h = harness();
        remote_playing(&h, 3_000);
        h.router.previous().await.unwrap();
        assert_eq!(h.remote.calls(), vec![RemoteCall::Previous { device_id: None }]);
    }

    #[tokio::test(start_paused = true)]
    async fn previous_goes_back_below_threshold() {
        let h = harness();
        remote_playing(&h, 2_999);
        h.router.previous().await.unwrap();
        assert_eq!(h.remote.calls(), vec![RemoteCall::Previous { device_id: None }]);
    }

    #[tokio::test]
    async fn failed_play_reverts_only_is_playing() {
        let h = harness();
        let ticket = h.reconciler.ticket();
        h.reconciler.apply(
            ticket,
            Source::Remote,
            PlaybackState { shuffle: true, ..Default::default() },
        );
        h.remote.fail_next(EngineError::CommandRejected("nope".into()));

        assert!(h.router.play(track_target()).await.is_err());

        let current = h.reconciler.current();
        assert!(!current.is_playing);
        assert!(current.shuffle);
    }

    #[tokio::test]
    async fn successful_shuffle_keeps_echo_until_next_snapshot() {
        let h = harness();
        h.router.set_shuffle(true).await.unwrap();
        let current = h.reconciler.current();
        assert!(current.shuffle);
        assert!(current.optimistic);
        assert_eq!(
            h.remote.calls(),
            vec![RemoteCall::Shuffle { shuffle: true, device_id: None }]
        );
    }

    #[tokio::test]
    async fn failed_repeat_rolls_back() {
        let h = harness();
        h.remote.fail_next(EngineError::CommandRejected("nope".into()));
        assert!(h.router.set_repeat(RepeatMode::Track).await.is_err());
        assert_eq!(h.reconciler.current().repeat, RepeatMode::Off);
    }

    #[tokio::test]
    async fn disallowed_commands_are_rejected_without_a_call() {
        let h = harness();
        let ticket = h.reconciler.ticket();
        let mut state = PlaybackState::default();
        state.disallows.insert(Capability::SkippingNext);
        h.reconciler.apply(ticket, Source::Remote, state);

        let err = h.router.next().await.unwrap_err();
        assert!(matches!(err, EngineError::CommandRejected(_)));
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_command_raises_auth_signal() {
        let h = harness();
        h.remote.fail_next(EngineError::AuthenticationFailed("401".into()));
        assert!(h.router.next().await.is_err());
        assert_eq!(*h.auth.subscribe().borrow(), AuthStatus::Expired);
    }

    #[tokio::test]
    async fn transfer_requires_a_local_device() {
        let h = harness();
        assert_eq!(
            h.router.transfer_here(true).await,
            Err(EngineError::DeviceUnavailable)
        );
        let before = ready(&h).await.len();
        h.router.transfer_here(false).await.unwrap();
        assert_eq!(
            h.remote.calls()[before..],
            [RemoteCall::Transfer { device_id: "local-1".into(), play: false }]
        );
    }

    #[tokio::test]
    async fn queue_operations_target_usable_local_device() {
        let h = harness();
        h.remote.set_queue(vec![Track { id: "q1".into(), ..Default::default() }]);
        let before = ready(&h).await.len();

        h.router.add_to_queue("spotify:track:q2").await.unwrap();
        let queue = h.router.queue().await.unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(
            h.remote.calls()[before..],
            [
                RemoteCall::AddToQueue {
                    uri: "spotify:track:q2".into(),
                    device_id: Some("local-1".into())
                },
                RemoteCall::Queue,
            ]
        );
    }
}
