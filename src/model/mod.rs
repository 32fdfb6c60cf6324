//! Model module - playback data types
//!
//! - `types`: Core type definitions (tracks, devices, repeat mode, commands)
//! - `playback`: Canonical playback state
//! - `device`: Local device lifecycle state
//! - `lyrics`: Timestamped lyric lines and LRC parsing
//! - `cache`: Liked songs cache with optimistic toggles

mod cache;
mod device;
mod lyrics;
mod playback;
mod types;

pub use types::{Capability, DeviceRef, PlayTarget, RepeatMode, Track, TransportCommand};

pub use playback::{PlaybackState, Source};
pub(crate) use playback::track_from_item;

pub use device::{DeviceAdapterState, DeviceStatus};

pub use lyrics::{
    parse_lrc, strip_lrc, LyricLine, LyricTrack, LyricsStatus, Unavailability,
};

pub use cache::{LikeToggle, LikedSongsCache};
