//! Overlay rendering (error notification, help popup)

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::utils::centered_rect;

pub fn render_error_notification(frame: &mut Frame, error_msg: &str) {
    let area = frame.area();

    let popup_width = 52.min(area.width.saturating_sub(4));
    let inner_width = popup_width.saturating_sub(4).max(1) as usize;

    let error_line_count = error_msg.chars().count().div_ceil(inner_width) as u16;
    let popup_height = (2 + error_line_count.max(1)).min(area.height.saturating_sub(4));

    let popup_area = centered_rect(area, popup_width, popup_height);
    frame.render_widget(Clear, popup_area);

    let error_widget = Paragraph::new(error_msg.to_string())
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Error (Esc to dismiss) ")
                .title_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
                .style(Style::default().bg(Color::Black)),
        );

    frame.render_widget(error_widget, popup_area);
}

const KEYBINDINGS: &[(&str, &str)] = &[
    ("", "── Playback ──"),
    ("Space", "Play / Pause"),
    ("N", "Next track"),
    ("P", "Previous track (or restart)"),
    ("← / →", "Seek 5 seconds"),
    ("S", "Toggle shuffle"),
    ("R", "Cycle repeat (off → all → one)"),
    ("+ / -", "Volume up / down"),
    ("", ""),
    ("", "── Actions ──"),
    ("L", "Like / Unlike track"),
    ("T", "Play on this device"),
    ("A", "Queue current track again"),
    ("", ""),
    ("", "── General ──"),
    ("H", "Toggle this help"),
    ("Q", "Quit"),
];

pub fn render_help_popup(frame: &mut Frame) {
    let area = frame.area();
    let popup_area = centered_rect(
        area,
        56,
        (KEYBINDINGS.len() as u16 + 2).min(area.height.saturating_sub(4)),
    );

    frame.render_widget(Clear, popup_area);

    let lines: Vec<Line> = KEYBINDINGS
        .iter()
        .map(|(key, desc)| {
            if key.is_empty() {
                Line::from(Span::styled(
                    format!("{:^50}", desc),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(vec![
                    Span::styled(
                        format!("{:>14}", key),
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(desc.to_string(), Style::default().fg(Color::White)),
                ])
            }
        })
        .collect();

    let help_text = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Help (H or Esc to close) ")
                .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                .style(Style::default().bg(Color::Black)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(help_text, popup_area);
}
