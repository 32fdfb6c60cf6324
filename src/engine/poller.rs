//! Remote snapshot poller with an activity-dependent cadence

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::{AuthSignal, Reconciler};
use crate::model::{DeviceAdapterState, Source};
use crate::remote::RemotePlayback;

pub struct RemotePoller {
    remote: Arc<dyn RemotePlayback>,
    reconciler: Arc<Reconciler>,
    auth: AuthSignal,
    idle_interval: Duration,
    active_interval: Duration,
}

impl RemotePoller {
    pub fn new(
        remote: Arc<dyn RemotePlayback>,
        reconciler: Arc<Reconciler>,
        auth: AuthSignal,
        idle_interval: Duration,
        active_interval: Duration,
    ) -> Self {
        Self {
            remote,
            reconciler,
            auth,
            idle_interval,
            active_interval,
        }
    }

    /// Polls slowly once the local device is rendering, since its own events
    /// already carry the time-critical updates.
    pub fn cadence(&self, device: &DeviceAdapterState) -> Duration {
        if device.is_active() {
            self.active_interval
        } else {
            self.idle_interval
        }
    }

    pub async fn poll_once(&self, device: &watch::Receiver<DeviceAdapterState>) {
        let ticket = self.reconciler.ticket();
        match self.remote.current_playback().await {
            Ok(Some(state)) => {
                self.reconciler.apply(ticket, Source::Remote, state);
            }
            Ok(None) => {
                tracing::trace!("Nothing playing remotely");
                let local_active = device.borrow().is_active();
                self.reconciler.clear_remote(ticket, local_active);
            }
            Err(e) => {
                if e.is_auth() {
                    self.auth.raise(&e);
                }
                tracing::debug!(error = %e, "Playback snapshot unavailable");
            }
        }
    }

    async fn cadence_changed(
        &self,
        device: &mut watch::Receiver<DeviceAdapterState>,
        current: Duration,
    ) -> Duration {
        loop {
            if device.changed().await.is_err() {
                // Adapter gone: keep the current cadence forever
                return std::future::pending().await;
            }
            let next = self.cadence(&device.borrow_and_update());
            if next != current {
                return next;
            }
        }
    }

    /// Poll immediately, then on the cadence implied by `device`.
    ///
    /// A cadence switch drops the pending timer together with any fetch that
    /// is still in flight and starts over with an immediate poll.
    pub async fn run(&self, mut device: watch::Receiver<DeviceAdapterState>) {
        let mut cadence = self.cadence(&device.borrow_and_update());
        let local = device.clone();
        tracing::info!(interval_ms = cadence.as_millis() as u64, "Starting playback poller");

        loop {
            let period = cadence;
            let local = &local;
            let cycle = async move {
                self.poll_once(local).await;
                tokio::time::sleep(period).await;
            };

            tokio::select! {
                _ = cycle => {}
                next = self.cadence_changed(&mut device, period) => {
                    tracing::debug!(
                        interval_ms = next.as_millis() as u64,
                        "Poll cadence changed"
                    );
                    cadence = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AuthStatus;
    use crate::error::EngineError;
    use crate::model::{DeviceStatus, PlaybackState, Track};
    use crate::testing::{FakeRemote, RemoteCall};

    fn poller(remote: Arc<FakeRemote>, reconciler: Arc<Reconciler>, auth: AuthSignal) -> RemotePoller {
        RemotePoller::new(
            remote,
            reconciler,
            auth,
            Duration::from_millis(2_000),
            Duration::from_millis(5_000),
        )
    }

    fn polls(remote: &FakeRemote) -> usize {
        remote
            .calls()
            .iter()
            .filter(|c| **c == RemoteCall::CurrentPlayback)
            .count()
    }

    fn playing(track_id: &str) -> PlaybackState {
        PlaybackState {
            is_playing: true,
            track: Some(Track { id: track_id.into(), duration_ms: 100_000, ..Default::default() }),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_idle_cadence() {
        let remote = Arc::new(FakeRemote::default());
        let reconciler = Arc::new(Reconciler::new());
        let poller = Arc::new(poller(remote.clone(), reconciler, AuthSignal::new()));
        let (_device_tx, device_rx) = watch::channel(DeviceAdapterState::default());

        let task = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run(device_rx).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(polls(&remote), 1);

        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(polls(&remote), 3);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn cadence_switch_restarts_timer_instead_of_stacking() {
        let remote = Arc::new(FakeRemote::default());
        let reconciler = Arc::new(Reconciler::new());
        let poller = Arc::new(poller(remote.clone(), reconciler, AuthSignal::new()));
        let (device_tx, device_rx) = watch::channel(DeviceAdapterState::default());

        let task = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run(device_rx).await }
        });
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(polls(&remote), 1);

        device_tx.send_modify(|s| s.status = DeviceStatus::Active);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(polls(&remote), 2);

        // Old 2s timer is gone: nothing until the 5s cadence elapses
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(polls(&remote), 2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(polls(&remote), 3);
        task.abort();
    }

    #[tokio::test]
    async fn snapshot_lands_in_reconciler() {
        let (_device_tx, idle) = watch::channel(DeviceAdapterState::default());
        let remote = Arc::new(FakeRemote::default());
        remote.push_snapshot(Ok(Some(playing("a"))));
        let reconciler = Arc::new(Reconciler::new());
        let poller = poller(remote, reconciler.clone(), AuthSignal::new());

        poller.poll_once(&idle).await;
        let state = reconciler.current();
        assert_eq!(state.track_id(), Some("a"));
        assert_eq!(state.source, Some(Source::Remote));
    }

    #[tokio::test]
    async fn errors_are_swallowed_and_keep_state() {
        let (_device_tx, idle) = watch::channel(DeviceAdapterState::default());
        let remote = Arc::new(FakeRemote::default());
        remote.push_snapshot(Ok(Some(playing("a"))));
        remote.push_snapshot(Err(EngineError::FetchFailed("offline".into())));
        let reconciler = Arc::new(Reconciler::new());
        let auth = AuthSignal::new();
        let poller = poller(remote, reconciler.clone(), auth.clone());

        poller.poll_once(&idle).await;
        poller.poll_once(&idle).await;
        assert_eq!(reconciler.current().track_id(), Some("a"));
        assert!(!auth.is_expired());
    }

    #[tokio::test]
    async fn unauthorized_poll_raises_auth_signal() {
        let (_device_tx, idle) = watch::channel(DeviceAdapterState::default());
        let remote = Arc::new(FakeRemote::default());
        remote.push_snapshot(Err(EngineError::AuthenticationFailed("401".into())));
        let auth = AuthSignal::new();
        let poller = poller(remote, Arc::new(Reconciler::new()), auth.clone());

        poller.poll_once(&idle).await;
        assert_eq!(*auth.subscribe().borrow(), AuthStatus::Expired);
    }

    #[tokio::test]
    async fn nothing_playing_clears_remote_state() {
        let (_device_tx, idle) = watch::channel(DeviceAdapterState::default());
        let remote = Arc::new(FakeRemote::default());
        remote.push_snapshot(Ok(Some(playing("a"))));
        remote.push_snapshot(Ok(None));
        let reconciler = Arc::new(Reconciler::new());
        let poller = poller(remote, reconciler.clone(), AuthSignal::new());

        poller.poll_once(&idle).await;
        poller.poll_once(&idle).await;
        assert!(reconciler.current().track.is_none());
        assert!(!reconciler.current().is_playing);
    }

    #[tokio::test]
    async fn empty_poll_defers_to_active_local_device_only() {
        let remote = Arc::new(FakeRemote::default());
        remote.push_snapshot(Ok(None));
        remote.push_snapshot(Ok(None));
        let reconciler = Arc::new(Reconciler::new());
        let ticket = reconciler.ticket();
        reconciler.apply(ticket, Source::Local, playing("local"));
        let poller = poller(remote, reconciler.clone(), AuthSignal::new());

        let (device_tx, device) = watch::channel(DeviceAdapterState {
            status: DeviceStatus::Active,
            device_id: Some("local-1".into()),
            ..Default::default()
        });
        poller.poll_once(&device).await;
        assert!(reconciler.current().is_playing);

        device_tx.send_modify(|s| {
            s.status = DeviceStatus::NotReady;
            s.device_id = None;
        });
        poller.poll_once(&device).await;
        let current = reconciler.current();
        assert!(!current.is_playing);
        assert!(current.track.is_none());
    }
}
