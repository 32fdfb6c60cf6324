//! View module - UI rendering
//!
//! Everything here reads engine snapshots and draws them with ratatui;
//! nothing here talks to the engine.
//!
//! - `utils`: Formatting helpers
//! - `layout`: Top bar (playing device, local device status)
//! - `lyrics`: Lyrics panel and its scroll easing
//! - `progress`: Progress bar rendering
//! - `overlays`: Error toast and help popup

mod layout;
mod lyrics;
mod overlays;
mod progress;
mod utils;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

pub use lyrics::LyricScroll;

use crate::engine::LyricFrame;
use crate::model::{DeviceAdapterState, PlaybackState};

/// One frame's worth of data to draw.
pub struct Screen<'a> {
    pub playback: &'a PlaybackState,
    pub position_ms: u64,
    pub device: &'a DeviceAdapterState,
    pub device_name: &'a str,
    pub lyrics: &'a LyricFrame,
    pub liked: bool,
    pub up_next: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub show_help: bool,
}

#[derive(Default)]
pub struct AppView {
    scroll: LyricScroll,
}

impl AppView {
    pub fn render(&mut self, frame: &mut Frame, screen: &Screen) {
        self.scroll.update(screen.lyrics);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Devices
                Constraint::Min(0),    // Lyrics
                Constraint::Length(3), // Progress bar with playback info
            ])
            .split(frame.area());

        layout::render_top_bar(
            frame,
            chunks[0],
            screen.playback,
            screen.device,
            screen.device_name,
        );
        lyrics::render_lyrics(frame, chunks[1], screen.lyrics, &self.scroll);
        progress::render_progress_bar(
            frame,
            chunks[2],
            screen.playback,
            screen.position_ms,
            screen.liked,
            screen.up_next,
        );

        if let Some(error) = screen.error_message {
            overlays::render_error_notification(frame, error);
        }

        if screen.show_help {
            overlays::render_help_popup(frame);
        }
    }
}
