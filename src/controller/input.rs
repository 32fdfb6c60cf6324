//! Key event handling

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::{refresh_up_next, AppController};

const SEEK_STEP_MS: u64 = 5_000;
const VOLUME_STEP: u8 = 5;
const DEFAULT_VOLUME: u8 = 50;

/// What a key press asks for, independent of the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KeyAction {
    TogglePlay,
    Next,
    Previous,
    SeekBackward,
    SeekForward,
    VolumeUp,
    VolumeDown,
    ToggleShuffle,
    CycleRepeat,
    TransferHere,
    ToggleLike,
    QueueAgain,
    ToggleHelp,
    DismissError,
    Quit,
}

impl KeyAction {
    pub(crate) fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('q') => Some(Self::Quit),
                _ => None,
            };
        }

        let action = match key.code {
            KeyCode::Char(' ') => Self::TogglePlay,
            KeyCode::Char('n') | KeyCode::Char('N') => Self::Next,
            KeyCode::Char('p') | KeyCode::Char('P') => Self::Previous,
            KeyCode::Left => Self::SeekBackward,
            KeyCode::Right => Self::SeekForward,
            KeyCode::Char('+') | KeyCode::Char('=') => Self::VolumeUp,
            KeyCode::Char('-') => Self::VolumeDown,
            KeyCode::Char('s') | KeyCode::Char('S') => Self::ToggleShuffle,
            KeyCode::Char('r') | KeyCode::Char('R') => Self::CycleRepeat,
            KeyCode::Char('t') | KeyCode::Char('T') => Self::TransferHere,
            KeyCode::Char('l') | KeyCode::Char('L') => Self::ToggleLike,
            KeyCode::Char('a') | KeyCode::Char('A') => Self::QueueAgain,
            KeyCode::Char('h') | KeyCode::Char('H') | KeyCode::Char('?') => Self::ToggleHelp,
            KeyCode::Esc | KeyCode::Enter => Self::DismissError,
            KeyCode::Char('q') | KeyCode::Char('Q') => Self::Quit,
            _ => return None,
        };
        Some(action)
    }
}

impl AppController {
    pub async fn handle_key_event(&self, key: KeyEvent) -> Result<()> {
        let Some(action) = KeyAction::from_key(&key) else {
            return Ok(());
        };

        {
            let mut ui = self.ui.lock().await;
            if ui.show_help_popup {
                if matches!(action, KeyAction::ToggleHelp | KeyAction::DismissError) {
                    ui.show_help_popup = false;
                }
                if action != KeyAction::Quit {
                    return Ok(());
                }
            }
            match action {
                KeyAction::Quit => {
                    ui.should_quit = true;
                    return Ok(());
                }
                KeyAction::ToggleHelp => {
                    ui.show_help_popup = true;
                    return Ok(());
                }
                KeyAction::DismissError => {
                    ui.clear_error();
                    return Ok(());
                }
                _ => {}
            }
        }

        self.dispatch(action);
        Ok(())
    }

    fn dispatch(&self, action: KeyAction) {
        let state = self.playback.borrow().clone();
        let commands = self.commands.clone();
        tracing::debug!(?action, "Key action");

        match action {
            KeyAction::TogglePlay => {
                self.spawn_command("toggle_play", async move { commands.toggle_play().await });
            }
            KeyAction::Next => {
                self.spawn_command("next", async move { commands.next().await });
            }
            KeyAction::Previous => {
                self.spawn_command("previous", async move { commands.previous().await });
            }
            KeyAction::SeekBackward | KeyAction::SeekForward => {
                let position = *self.position.borrow();
                let target = if action == KeyAction::SeekForward {
                    position.saturating_add(SEEK_STEP_MS)
                } else {
                    position.saturating_sub(SEEK_STEP_MS)
                };
                self.spawn_command("seek", async move { commands.seek(target).await });
            }
            KeyAction::VolumeUp | KeyAction::VolumeDown => {
                let volume = state.volume_percent().unwrap_or(DEFAULT_VOLUME);
                let target = if action == KeyAction::VolumeUp {
                    volume.saturating_add(VOLUME_STEP).min(100)
                } else {
                    volume.saturating_sub(VOLUME_STEP)
                };
                self.spawn_command("set_volume", async move { commands.set_volume(target).await });
            }
            KeyAction::ToggleShuffle => {
                let shuffle = !state.shuffle;
                self.spawn_command("set_shuffle", async move { commands.set_shuffle(shuffle).await });
            }
            KeyAction::CycleRepeat => {
                let mode = state.repeat.next();
                self.spawn_command("set_repeat", async move { commands.set_repeat(mode).await });
            }
            KeyAction::TransferHere => {
                let start_playing = state.is_playing;
                self.spawn_command("transfer_here", async move {
                    commands.transfer_here(start_playing).await
                });
            }
            KeyAction::ToggleLike => {
                let Some(track_id) = state.track_id().map(str::to_string) else {
                    return;
                };
                let library = self.library.clone();
                self.spawn_command("toggle_like", async move {
                    library.toggle_like(&track_id).await.map(|_| ())
                });
            }
            KeyAction::QueueAgain => {
                let Some(uri) = state.track.as_ref().map(|t| t.uri.clone()).filter(|uri| !uri.is_empty()) else {
                    return;
                };
                let ui = self.ui.clone();
                self.spawn_command("add_to_queue", async move {
                    commands.add_to_queue(&uri).await?;
                    refresh_up_next(&commands, &ui).await;
                    Ok(())
                });
            }
            KeyAction::ToggleHelp | KeyAction::DismissError | KeyAction::Quit => {}
        }
    }
}
