//! Lyrics panel with the active line kept near the middle

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Padding, Paragraph, Wrap},
    Frame,
};

use crate::engine::{LyricFrame, Transition};

/// Fraction of the remaining distance covered per rendered frame.
const EASING: f64 = 0.35;
const SNAP_DISTANCE: f64 = 0.05;

/// Scroll position of the lyrics panel, measured in lines.
#[derive(Debug, Default)]
pub struct LyricScroll {
    track_id: Option<String>,
    offset: f64,
}

impl LyricScroll {
    /// Move one frame towards the active line of `lyrics`.
    pub fn update(&mut self, lyrics: &LyricFrame) {
        let LyricFrame::Synced {
            lyrics: track,
            active,
            transition,
        } = lyrics
        else {
            self.track_id = None;
            self.offset = 0.0;
            return;
        };

        let target = active.unwrap_or(0) as f64;
        let new_track = self.track_id.as_deref() != Some(track.track_id.as_str());
        if new_track {
            self.track_id = Some(track.track_id.clone());
        }

        if new_track || *transition == Transition::Jump {
            self.offset = target;
            return;
        }

        let distance = target - self.offset;
        if distance.abs() < SNAP_DISTANCE {
            self.offset = target;
        } else {
            self.offset += distance * EASING;
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// First visible row so the scrolled-to line sits in the middle of a
    /// panel `height` rows tall.
    fn first_row(&self, height: u16) -> u16 {
        let centered = self.offset.round() as i64 - i64::from(height / 2);
        centered.clamp(0, i64::from(u16::MAX)) as u16
    }
}

pub fn render_lyrics(frame: &mut Frame, area: Rect, lyrics: &LyricFrame, scroll: &LyricScroll) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Lyrics ")
        .padding(Padding::horizontal(1));
    let inner_height = area.height.saturating_sub(2);

    let placeholder = |text: &str| {
        Paragraph::new(text.to_string())
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
    };

    let widget = match lyrics {
        LyricFrame::Idle => placeholder(""),
        LyricFrame::Loading { .. } => placeholder("Loading lyrics..."),
        LyricFrame::Unavailable { reason, .. } => placeholder(reason.label()),
        LyricFrame::Static { text, .. } => Paragraph::new(text.as_str())
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: false }),
        LyricFrame::Synced {
            lyrics: track,
            active,
            ..
        } => {
            let lines: Vec<Line> = track
                .lines()
                .iter()
                .enumerate()
                .map(|(index, line)| {
                    let style = if Some(index) == *active {
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                    } else if active.is_some_and(|a| index < a) {
                        Style::default().fg(Color::DarkGray)
                    } else {
                        Style::default().fg(Color::White)
                    };
                    Line::styled(line.text.clone(), style)
                })
                .collect();
            Paragraph::new(lines)
                .alignment(Alignment::Center)
                .scroll((scroll.first_row(inner_height), 0))
        }
    };

    frame.render_widget(widget.block(block), area);
}
