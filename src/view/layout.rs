//! Top bar rendering (now playing device, local device status)

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

use super::utils::truncate_string;
use crate::model::{DeviceAdapterState, DeviceStatus, PlaybackState};

fn status_color(status: DeviceStatus) -> Color {
    match status {
        DeviceStatus::Active => Color::Green,
        DeviceStatus::Ready => Color::Cyan,
        DeviceStatus::Initializing => Color::Yellow,
        DeviceStatus::Error(_) => Color::Red,
        DeviceStatus::Uninitialized | DeviceStatus::NotReady => Color::DarkGray,
    }
}

pub fn local_device_text(device: &DeviceAdapterState, device_name: &str) -> String {
    match device.status {
        DeviceStatus::Error(kind) => format!("{}: {}", device_name, kind.label()),
        status => format!("{}: {}", device_name, status.label()),
    }
}

pub fn render_top_bar(
    frame: &mut Frame,
    area: Rect,
    playback: &PlaybackState,
    device: &DeviceAdapterState,
    device_name: &str,
) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(0),     // Where playback is happening
            Constraint::Length(36), // Local device
        ])
        .split(area);

    let playing_on = match &playback.device {
        Some(d) => format!("🎵 {} ({})", d.name, d.kind),
        None => "No active device".to_string(),
    };
    let now_playing = Paragraph::new(playing_on)
        .style(Style::default().fg(Color::Cyan))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Playing on ")
                .padding(Padding::horizontal(1)),
        );
    frame.render_widget(now_playing, chunks[0]);

    let width = chunks[1].width.saturating_sub(4) as usize;
    let local = Paragraph::new(truncate_string(&local_device_text(device, device_name), width))
        .style(Style::default().fg(status_color(device.status)))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" This device ")
                .padding(Padding::horizontal(1)),
        );
    frame.render_widget(local, chunks[1]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn error_status_names_the_failure() {
        let device = DeviceAdapterState {
            status: DeviceStatus::Error(ErrorKind::AccountRestricted),
            ..Default::default()
        };
        assert_eq!(
            local_device_text(&device, "Desk"),
            format!("Desk: {}", ErrorKind::AccountRestricted.label())
        );
    }

    #[test]
    fn active_device_reads_as_playing_here() {
        let device = DeviceAdapterState {
            status: DeviceStatus::Active,
            device_id: Some("id".into()),
            ..Default::default()
        };
        assert_eq!(local_device_text(&device, "Desk"), "Desk: playing here");
    }
}
