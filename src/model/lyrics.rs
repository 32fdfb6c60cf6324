//! Timestamped lyrics and LRC parsing

use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricLine {
    pub start_ms: u64,
    /// Exclusive end: the next line's start, `None` (unbounded) for the last line.
    pub end_ms: Option<u64>,
    pub text: String,
}

/// Ordered, immutable sequence of lines for one track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricTrack {
    pub track_id: String,
    lines: Arc<[LyricLine]>,
}

impl LyricTrack {
    /// Build from `(start_ms, text)` pairs in any order.
    pub fn new(track_id: impl Into<String>, mut entries: Vec<(u64, String)>) -> Self {
        entries.sort_by_key(|(start, _)| *start);

        let mut lines = Vec::with_capacity(entries.len());
        for (index, (start_ms, text)) in entries.iter().enumerate() {
            let end_ms = entries.get(index + 1).map(|(next, _)| *next);
            lines.push(LyricLine {
                start_ms: *start_ms,
                end_ms,
                text: text.clone(),
            });
        }

        Self {
            track_id: track_id.into(),
            lines: lines.into(),
        }
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the last line whose start is at or before `position_ms`.
    pub fn active_index(&self, position_ms: i64) -> Option<usize> {
        if position_ms < 0 {
            return None;
        }
        let position = position_ms as u64;
        match self.lines.partition_point(|line| line.start_ms <= position) {
            0 => None,
            count => Some(count - 1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailability {
    NotFound,
    Instrumental,
    FetchFailed,
}

impl Unavailability {
    pub fn label(self) -> &'static str {
        match self {
            Unavailability::NotFound => "No lyrics found",
            Unavailability::Instrumental => "Instrumental",
            Unavailability::FetchFailed => "Lyrics could not be loaded",
        }
    }
}

/// What the lyrics layer knows about the current track.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LyricsStatus {
    #[default]
    Idle,
    Loading { track_id: String },
    Synced(LyricTrack),
    Unsynced { track_id: String, text: String },
    Unavailable { track_id: String, reason: Unavailability },
}

impl LyricsStatus {
    pub fn track_id(&self) -> Option<&str> {
        match self {
            LyricsStatus::Idle => None,
            LyricsStatus::Loading { track_id }
            | LyricsStatus::Unsynced { track_id, .. }
            | LyricsStatus::Unavailable { track_id, .. } => Some(track_id),
            LyricsStatus::Synced(track) => Some(&track.track_id),
        }
    }
}

/// Parse LRC text into a lyric track; `None` when no timed line is present.
pub fn parse_lrc(track_id: &str, raw_lrc: &str) -> Option<LyricTrack> {
    let mut entries = Vec::new();

    for raw_line in raw_lrc.lines() {
        let mut rest = raw_line.trim();
        let mut timestamps = Vec::new();

        while rest.starts_with('[') {
            let Some(end_index) = rest.find(']') else {
                break;
            };
            if let Some(value) = parse_lrc_timestamp(&rest[1..end_index]) {
                timestamps.push(value);
            }
            rest = &rest[end_index + 1..];
        }

        let text = rest.trim();
        for timestamp in timestamps {
            entries.push((timestamp, text.to_string()));
        }
    }

    if entries.is_empty() {
        None
    } else {
        Some(LyricTrack::new(track_id, entries))
    }
}

/// `mm:ss.xx` or `hh:mm:ss.xx` to milliseconds. Metadata tags like `ar:` fail.
fn parse_lrc_timestamp(token: &str) -> Option<u64> {
    let mut segments: Vec<&str> = token.split(':').collect();
    if segments.len() < 2 || segments.len() > 3 {
        return None;
    }

    let seconds: f64 = segments.pop()?.replace(',', ".").parse().ok()?;
    let minutes: u64 = segments.pop()?.parse().ok()?;
    let hours: u64 = match segments.pop() {
        Some(hours) => hours.parse().ok()?,
        None => 0,
    };
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }

    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_mul(1000)?
        .checked_add((seconds * 1000.0).round() as u64)
}

/// Drop LRC tags and timestamps, leaving readable text.
pub fn strip_lrc(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter_map(|line| {
            let mut content = line;
            while content.starts_with('[') {
                let Some(end_index) = content.find(']') else {
                    break;
                };
                content = &content[end_index + 1..];
            }
            let content = content.trim();
            (!content.is_empty()).then(|| content.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
