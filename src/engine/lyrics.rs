//! Lyrics loading and active-line projection

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::{LyricTrack, LyricsStatus, PlaybackState, Unavailability};
use crate::remote::LyricsSource;

/// How the view should move to the active line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Discontinuity, e.g. a new track: no animation.
    Jump,
    /// Next line of the same track: animated scroll.
    Smooth,
}

/// Projector output consumed by the lyrics view.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LyricFrame {
    #[default]
    Idle,
    Loading {
        track_id: String,
    },
    Synced {
        lyrics: LyricTrack,
        active: Option<usize>,
        transition: Transition,
    },
    /// Plain text, rendered as is with no active line.
    Static {
        track_id: String,
        text: String,
    },
    Unavailable {
        track_id: String,
        reason: Unavailability,
    },
}

impl LyricFrame {
    pub fn active_index(&self) -> Option<usize> {
        match self {
            LyricFrame::Synced { active, .. } => *active,
            _ => None,
        }
    }
}

/// Maps the display position onto the active lyric line, emitting a frame
/// only when something visible changes.
#[derive(Debug, Default)]
pub struct LyricSyncProjector {
    last: LyricFrame,
}

impl LyricSyncProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(&mut self, status: &LyricsStatus, position_ms: i64) -> Option<LyricFrame> {
        let frame = match status {
            LyricsStatus::Idle => LyricFrame::Idle,
            LyricsStatus::Loading { track_id } => LyricFrame::Loading {
                track_id: track_id.clone(),
            },
            LyricsStatus::Unsynced { track_id, text } => LyricFrame::Static {
                track_id: track_id.clone(),
                text: text.clone(),
            },
            LyricsStatus::Unavailable { track_id, reason } => LyricFrame::Unavailable {
                track_id: track_id.clone(),
                reason: *reason,
            },
            LyricsStatus::Synced(lyrics) => {
                let active = lyrics.active_index(position_ms);
                let transition = match &self.last {
                    LyricFrame::Synced { lyrics: shown, active: shown_active, .. }
                        if shown.track_id == lyrics.track_id =>
                    {
                        if *shown_active == active {
                            return None;
                        }
                        Transition::Smooth
                    }
                    _ => Transition::Jump,
                };
                LyricFrame::Synced {
                    lyrics: lyrics.clone(),
                    active,
                    transition,
                }
            }
        };

        if frame == self.last {
            return None;
        }
        self.last = frame.clone();
        Some(frame)
    }
}

async fn track_changed(state: &mut watch::Receiver<Arc<PlaybackState>>, track_id: &str) {
    loop {
        if state.changed().await.is_err() {
            return std::future::pending().await;
        }
        if state.borrow_and_update().track_id() != Some(track_id) {
            return;
        }
    }
}

/// Fetch lyrics whenever the canonical track changes. A fetch still in
/// flight when the track changes again is abandoned.
pub async fn run_loader(
    source: Arc<dyn LyricsSource>,
    mut state: watch::Receiver<Arc<PlaybackState>>,
    status: watch::Sender<LyricsStatus>,
) {
    let mut current: Option<String> = None;

    loop {
        let track = {
            let snapshot = state.borrow_and_update();
            snapshot.track.clone().filter(|t| !t.id.is_empty())
        };
        let track_id = track.as_ref().map(|t| t.id.clone());

        if track_id != current {
            current = track_id;
            match track {
                None => {
                    status.send_replace(LyricsStatus::Idle);
                }
                Some(track) => {
                    status.send_replace(LyricsStatus::Loading {
                        track_id: track.id.clone(),
                    });

                    let fetched = tokio::select! {
                        result = source.lyrics(&track) => Some(result),
                        _ = track_changed(&mut state, &track.id) => None,
                    };

                    match fetched {
                        Some(Ok(lyrics)) => {
                            tracing::debug!(track_id = %track.id, "Lyrics loaded");
                            status.send_replace(lyrics);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(track_id = %track.id, error = %e, "Lyrics fetch failed");
                            status.send_replace(LyricsStatus::Unavailable {
                                track_id: track.id.clone(),
                                reason: Unavailability::FetchFailed,
                            });
                        }
                        None => {
                            tracing::debug!(track_id = %track.id, "Track changed before lyrics arrived");
                            continue;
                        }
                    }
                }
            }
        }

        if state.changed().await.is_err() {
            break;
        }
    }
}

/// Drive a [`LyricSyncProjector`] from the position and lyrics streams.
pub async fn run_projector(
    mut position: watch::Receiver<u64>,
    mut status: watch::Receiver<LyricsStatus>,
    frames: watch::Sender<LyricFrame>,
) {
    let mut projector = LyricSyncProjector::new();

    loop {
        let position_ms = *position.borrow_and_update() as i64;
        let frame = {
            let current = status.borrow_and_update();
            projector.project(&current, position_ms)
        };
        if let Some(frame) = frame {
            frames.send_replace(frame);
        }

        tokio::select! {
            changed = position.changed() => if changed.is_err() { break },
            changed = status.changed() => if changed.is_err() { break },
        }
    }
}
