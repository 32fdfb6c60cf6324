//! Core type definitions shared by the engine and the UI

use std::fmt;

/// Repeat mode state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Context,
    Track,
}

impl RepeatMode {
    /// Next mode in the UI cycle: off -> context -> track -> off.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Context,
            RepeatMode::Context => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }

    /// Web Playback SDK style numeric repeat mode (0 = off, 1 = context, 2 = track).
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => RepeatMode::Context,
            2 => RepeatMode::Track,
            _ => RepeatMode::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::Off => "Off",
            RepeatMode::Context => "All",
            RepeatMode::Track => "One",
        }
    }
}

impl From<rspotify::model::RepeatState> for RepeatMode {
    fn from(state: rspotify::model::RepeatState) -> Self {
        match state {
            rspotify::model::RepeatState::Off => RepeatMode::Off,
            rspotify::model::RepeatState::Context => RepeatMode::Context,
            rspotify::model::RepeatState::Track => RepeatMode::Track,
        }
    }
}

impl From<RepeatMode> for rspotify::model::RepeatState {
    fn from(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::Off => rspotify::model::RepeatState::Off,
            RepeatMode::Context => rspotify::model::RepeatState::Context,
            RepeatMode::Track => rspotify::model::RepeatState::Track,
        }
    }
}

/// Transport actions the server may declare as currently forbidden.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    InterruptingPlayback,
    Pausing,
    Resuming,
    Seeking,
    SkippingNext,
    SkippingPrev,
    TogglingRepeatContext,
    TogglingShuffle,
    TogglingRepeatTrack,
    TransferringPlayback,
}

impl Capability {
    /// Parse the snake_case key used by the Web API `actions.disallows` object.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "interrupting_playback" => Some(Self::InterruptingPlayback),
            "pausing" => Some(Self::Pausing),
            "resuming" => Some(Self::Resuming),
            "seeking" => Some(Self::Seeking),
            "skipping_next" => Some(Self::SkippingNext),
            "skipping_prev" => Some(Self::SkippingPrev),
            "toggling_repeat_context" => Some(Self::TogglingRepeatContext),
            "toggling_shuffle" => Some(Self::TogglingShuffle),
            "toggling_repeat_track" => Some(Self::TogglingRepeatTrack),
            "transferring_playback" => Some(Self::TransferringPlayback),
            _ => None,
        }
    }
}

/// Currently playing item
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u64,
    pub uri: String,
}

impl Track {
    /// Recover the bare id from a `spotify:<kind>:<id>` uri.
    pub fn id_from_uri(uri: &str) -> Option<String> {
        let mut parts = uri.split(':');
        let (_scheme, _kind, id) = (parts.next()?, parts.next()?, parts.next()?);
        if id.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(id.to_string())
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Output that is currently rendering playback
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DeviceRef {
    pub id: Option<String>,
    pub name: String,
    pub kind: String,
    pub volume_percent: Option<u8>,
    pub is_restricted: bool,
}

/// What a `play` command should start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayTarget {
    /// Resume whatever the current context is.
    Resume,
    Track { uri: String },
    Context { uri: String, offset_uri: Option<String> },
}

impl fmt::Display for PlayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayTarget::Resume => write!(f, "resume"),
            PlayTarget::Track { uri } => write!(f, "{}", uri),
            PlayTarget::Context { uri, .. } => write!(f, "{}", uri),
        }
    }
}

/// Direct transport operation, understood by both the local device and the
/// remote service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Seek(u64),
    Previous,
    Next,
    Volume(u8),
}

impl TransportCommand {
    pub fn name(self) -> &'static str {
        match self {
            TransportCommand::Play => "play",
            TransportCommand::Pause => "pause",
            TransportCommand::Seek(_) => "seek",
            TransportCommand::Previous => "previous",
            TransportCommand::Next => "next",
            TransportCommand::Volume(_) => "volume",
        }
    }

    /// Server-declared capability gating this command, if any.
    pub fn capability(self) -> Option<Capability> {
        match self {
            TransportCommand::Play => Some(Capability::Resuming),
            TransportCommand::Pause => Some(Capability::Pausing),
            TransportCommand::Seek(_) => Some(Capability::Seeking),
            TransportCommand::Previous => Some(Capability::SkippingPrev),
            TransportCommand::Next => Some(Capability::SkippingNext),
            TransportCommand::Volume(_) => None,
        }
    }
}
