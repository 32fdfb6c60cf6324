//! Progress bar rendering

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};

use super::utils::{format_duration, truncate_string};
use crate::model::PlaybackState;

pub fn progress_ratio(position_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms > 0 {
        (position_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn up_next_label(up_next: Option<&str>) -> String {
    match up_next {
        Some(entry) => format!(" Next: {} ", truncate_string(entry, 40)),
        None => String::new(),
    }
}

pub fn render_progress_bar(
    frame: &mut Frame,
    area: Rect,
    playback: &PlaybackState,
    position_ms: u64,
    liked: bool,
    up_next: Option<&str>,
) {
    let status_text = match &playback.track {
        None => " No track playing".to_string(),
        Some(track) => {
            let icon = if playback.is_playing { " ▶" } else { "⏸ " };
            let heart = if liked { " ♥" } else { "" };
            format!(
                "{} {} | {} ({}){}",
                icon,
                track.name,
                track.artist_line(),
                track.album,
                heart
            )
        }
    };

    let shuffle_text = if playback.shuffle { "Shuffle: On" } else { "Shuffle: Off" };
    let repeat_text = format!("Repeat: {}", playback.repeat.label());
    let volume_text = match playback.volume_percent() {
        Some(volume) => format!("Vol: {}%", volume),
        None => "Vol: -".to_string(),
    };

    let duration_ms = playback.duration_ms().unwrap_or(0);
    let time_str = format!(
        "{} / {}",
        format_duration(position_ms),
        format_duration(duration_ms)
    );

    let title = format!("{} ", status_text);
    let up_next_text = up_next_label(up_next);
    let controls_info = format!(" {} | {} | {} ", shuffle_text, repeat_text, volume_text);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_bottom(Line::from(up_next_text).left_aligned())
                .title_bottom(Line::from(controls_info).right_aligned()),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(progress_ratio(position_ms, duration_ms))
        .label(time_str);

    frame.render_widget(gauge, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_clamped_and_safe_for_unknown_duration() {
        assert_eq!(progress_ratio(0, 0), 0.0);
        assert_eq!(progress_ratio(50, 100), 0.5);
        assert_eq!(progress_ratio(500, 100), 1.0);
    }

    #[test]
    fn up_next_label_is_empty_without_queue() {
        assert_eq!(up_next_label(None), "");
        assert_eq!(up_next_label(Some("Song - Artist")), " Next: Song - Artist ");
    }
}
