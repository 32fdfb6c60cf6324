//! Controller module - key handling and command dispatch
//!
//! - `input`: Key event handling

mod input;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};

use crate::engine::{CommandRouter, LibraryActions};
use crate::error::EngineResult;
use crate::model::PlaybackState;

const ERROR_DISPLAY_TIME: Duration = Duration::from_secs(5);

/// UI-only state, never shared with the engine.
#[derive(Debug, Default)]
pub struct UiState {
    pub error_message: Option<String>,
    error_shown_at: Option<Instant>,
    /// First entry of the play queue, as "title - artists".
    pub up_next: Option<String>,
    pub show_help_popup: bool,
    pub should_quit: bool,
}

impl UiState {
    pub fn set_error(&mut self, message: String) {
        self.error_message = Some(message);
        self.error_shown_at = Some(Instant::now());
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.error_shown_at = None;
    }

    pub fn auto_clear_old_errors(&mut self) {
        if self
            .error_shown_at
            .is_some_and(|shown| shown.elapsed() >= ERROR_DISPLAY_TIME)
        {
            self.clear_error();
        }
    }
}

#[derive(Clone)]
pub struct AppController {
    pub(crate) commands: CommandRouter,
    pub(crate) library: LibraryActions,
    pub(crate) playback: watch::Receiver<Arc<PlaybackState>>,
    pub(crate) position: watch::Receiver<u64>,
    pub(crate) ui: Arc<Mutex<UiState>>,
}

impl AppController {
    pub fn new(
        commands: CommandRouter,
        library: LibraryActions,
        playback: watch::Receiver<Arc<PlaybackState>>,
        position: watch::Receiver<u64>,
    ) -> Self {
        Self {
            commands,
            library,
            playback,
            position,
            ui: Arc::new(Mutex::new(UiState::default())),
        }
    }

    /// Run `command` in the background so the render loop never waits on
    /// the network. Failures become the error toast.
    pub(crate) fn spawn_command<F>(&self, operation: &'static str, command: F)
    where
        F: Future<Output = EngineResult<()>> + Send + 'static,
    {
        let ui = self.ui.clone();
        tokio::spawn(async move {
            if let Err(e) = command.await {
                tracing::debug!(operation, error = %e, "Command reported to user");
                ui.lock().await.set_error(e.user_message());
            }
        });
    }

    /// Refresh the liked flag and the up-next entry whenever a new track
    /// starts.
    pub fn start_track_sync(&self) {
        let library = self.library.clone();
        let commands = self.commands.clone();
        let ui = self.ui.clone();
        let mut playback = self.playback.clone();

        tokio::spawn(async move {
            let mut current: Option<String> = None;
            loop {
                let track_id = playback.borrow_and_update().track_id().map(str::to_string);
                if track_id != current {
                    current = track_id.clone();
                    if let Some(track_id) = track_id {
                        if let Err(e) = library.sync_liked(&track_id).await {
                            tracing::debug!(track_id = %track_id, error = %e, "Could not sync liked state");
                        }
                    }
                    refresh_up_next(&commands, &ui).await;
                }
                if playback.changed().await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Fetch the play queue and remember its head. Failures keep the last value.
pub(crate) async fn refresh_up_next(commands: &CommandRouter, ui: &Mutex<UiState>) {
    match commands.queue().await {
        Ok(queue) => {
            let up_next = queue.first().map(|track| {
                if track.artists.is_empty() {
                    track.name.clone()
                } else {
                    format!("{} - {}", track.name, track.artist_line())
                }
            });
            ui.lock().await.up_next = up_next;
        }
        Err(e) => tracing::debug!(error = %e, "Could not fetch play queue"),
    }
}
