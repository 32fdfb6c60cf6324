//! Playback state synchronization engine
//!
//! - `reconciler`: single writer of canonical playback state
//! - `poller`: remote snapshot polling
//! - `router`: command routing between local device and remote service
//! - `interpolator`: display position between updates
//! - `lyrics`: lyrics loading and active line projection
//! - `library`: liked songs with optimistic toggles

mod interpolator;
mod library;
mod lyrics;
mod poller;
mod reconciler;
mod router;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::device::{CredentialProvider, DeviceFactory, LocalDeviceAdapter};
use crate::error::EngineError;
use crate::model::{DeviceAdapterState, LikedSongsCache, LyricsStatus, PlaybackState};
use crate::remote::{LyricsSource, RemotePlayback};

pub use interpolator::ProgressInterpolator;
pub use library::LibraryActions;
pub use lyrics::{LyricFrame, LyricSyncProjector, Transition};
pub use poller::RemotePoller;
pub use reconciler::{Reconciler, Ticket};
pub use router::CommandRouter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Valid,
    Expired,
}

/// Global 401 channel. Raised once by whoever sees the failure; the owner of
/// the credentials refreshes them and resolves it.
#[derive(Clone)]
pub struct AuthSignal {
    tx: Arc<watch::Sender<AuthStatus>>,
}

impl Default for AuthSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthStatus::Valid);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self, error: &EngineError) {
        let raised = self.tx.send_if_modified(|status| {
            if *status == AuthStatus::Expired {
                return false;
            }
            *status = AuthStatus::Expired;
            true
        });
        if raised {
            tracing::warn!(error = %error, "Credentials rejected, re-authentication required");
        }
    }

    pub fn resolve(&self) {
        self.tx.send_replace(AuthStatus::Valid);
    }

    pub fn is_expired(&self) -> bool {
        *self.tx.borrow() == AuthStatus::Expired
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.tx.subscribe()
    }
}

/// Aborts the task when dropped.
struct TaskGuard {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl TaskGuard {
    fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning engine task");
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            tracing::debug!(task = self.name, "Cancelling engine task");
        }
        self.handle.abort();
    }
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub remote: Arc<dyn RemotePlayback>,
    /// `None` runs the engine as a pure remote controller.
    pub device: Option<(Arc<dyn DeviceFactory>, Arc<dyn CredentialProvider>)>,
    pub lyrics: Option<Arc<dyn LyricsSource>>,
    pub liked_songs: LikedSongsCache,
    pub auth: AuthSignal,
}

pub struct PlaybackEngine {
    reconciler: Arc<Reconciler>,
    device: Option<Arc<LocalDeviceAdapter>>,
    device_state: watch::Receiver<DeviceAdapterState>,
    router: CommandRouter,
    library: LibraryActions,
    auth: AuthSignal,
    position: watch::Receiver<u64>,
    lyric_frames: watch::Receiver<LyricFrame>,
    tasks: Vec<TaskGuard>,
}

impl PlaybackEngine {
    /// Wire everything together and start the background tasks.
    pub fn start(parts: EngineParts, config: &EngineConfig) -> Self {
        let EngineParts {
            remote,
            device,
            lyrics,
            liked_songs,
            auth,
        } = parts;

        let reconciler = Arc::new(Reconciler::new());
        let mut tasks = Vec::new();

        let device = device.map(|(factory, credentials)| {
            Arc::new(LocalDeviceAdapter::new(
                factory,
                credentials,
                remote.clone(),
                reconciler.clone(),
                auth.clone(),
            ))
        });

        let device_state = match &device {
            Some(adapter) => {
                let adapter = adapter.clone();
                let receiver = adapter.subscribe();
                tasks.push(TaskGuard::spawn("device", async move {
                    match adapter.initialize().await {
                        Ok(events) => adapter.run_events(events).await,
                        Err(e) => tracing::error!(error = %e, "Local device unavailable"),
                    }
                }));
                receiver
            }
            None => watch::channel(DeviceAdapterState::default()).1,
        };

        let poller = RemotePoller::new(
            remote.clone(),
            reconciler.clone(),
            auth.clone(),
            config.idle_poll_interval(),
            config.active_poll_interval(),
        );
        let poll_device = device_state.clone();
        tasks.push(TaskGuard::spawn("poller", async move {
            poller.run(poll_device).await
        }));

        let (position_tx, position) = watch::channel(0u64);
        tasks.push(TaskGuard::spawn(
            "interpolator",
            interpolator::run(
                reconciler.subscribe(),
                position_tx,
                config.tick_interval(),
                config.max_frame_step(),
            ),
        ));

        let (status_tx, lyrics_status) = watch::channel(LyricsStatus::Idle);
        let (frames_tx, lyric_frames) = watch::channel(LyricFrame::Idle);
        if let Some(source) = lyrics {
            tasks.push(TaskGuard::spawn(
                "lyrics-loader",
                lyrics::run_loader(source, reconciler.subscribe(), status_tx),
            ));
            tasks.push(TaskGuard::spawn(
                "lyrics-projector",
                lyrics::run_projector(position.clone(), lyrics_status, frames_tx),
            ));
        }

        let router = CommandRouter::new(
            remote.clone(),
            device.clone(),
            reconciler.clone(),
            auth.clone(),
            config.restart_threshold_ms,
        );
        let library = LibraryActions::new(remote, liked_songs, auth.clone());

        tracing::info!(
            local_device = device.is_some(),
            tasks = tasks.len(),
            "Playback engine started"
        );

        Self {
            reconciler,
            device,
            device_state,
            router,
            library,
            auth,
            position,
            lyric_frames,
            tasks,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Arc<PlaybackState>> {
        self.reconciler.subscribe()
    }

    pub fn state(&self) -> Arc<PlaybackState> {
        self.reconciler.current()
    }

    pub fn subscribe_device(&self) -> watch::Receiver<DeviceAdapterState> {
        self.device_state.clone()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<u64> {
        self.position.clone()
    }

    pub fn subscribe_lyrics(&self) -> watch::Receiver<LyricFrame> {
        self.lyric_frames.clone()
    }

    pub fn commands(&self) -> CommandRouter {
        self.router.clone()
    }

    pub fn library(&self) -> LibraryActions {
        self.library.clone()
    }

    pub fn auth_signal(&self) -> AuthSignal {
        self.auth.clone()
    }

    /// Cancel every task and disconnect the device. Each step runs even if
    /// an earlier one panicked inside its task.
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down playback engine");
        for task in self.tasks.drain(..) {
            let name = task.name;
            drop(task);
            tracing::trace!(task = name, "Engine task cancelled");
        }
        if let Some(adapter) = self.device.take() {
            adapter.shutdown().await;
        }
        tracing::info!("Playback engine stopped");
    }
}
