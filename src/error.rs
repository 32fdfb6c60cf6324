//! Error taxonomy shared by the playback engine and its collaborators

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Fieldless mirror of [`EngineError`], used where only the category matters
/// (device lifecycle state, last error bookkeeping).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InitializationFailed,
    AuthenticationFailed,
    AccountRestricted,
    PlaybackFailed,
    DeviceUnavailable,
    CommandRejected,
    FetchFailed,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::InitializationFailed => "failed to start",
            ErrorKind::AuthenticationFailed => "login expired",
            ErrorKind::AccountRestricted => "Premium required",
            ErrorKind::PlaybackFailed => "playback failed",
            ErrorKind::DeviceUnavailable => "unavailable",
            ErrorKind::CommandRejected => "command rejected",
            ErrorKind::FetchFailed => "network error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("device initialization failed: {0}")]
    InitializationFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("account restricted: playback requires Spotify Premium")]
    AccountRestricted,

    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    #[error("local playback device unavailable")]
    DeviceUnavailable,

    #[error("command rejected: {0}")]
    CommandRejected(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InitializationFailed(_) => ErrorKind::InitializationFailed,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::AccountRestricted => ErrorKind::AccountRestricted,
            Self::PlaybackFailed(_) => ErrorKind::PlaybackFailed,
            Self::DeviceUnavailable => ErrorKind::DeviceUnavailable,
            Self::CommandRejected(_) => ErrorKind::CommandRejected,
            Self::FetchFailed(_) => ErrorKind::FetchFailed,
        }
    }

    /// Build an error of the given category with a free-form detail message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InitializationFailed => Self::InitializationFailed(message),
            ErrorKind::AuthenticationFailed => Self::AuthenticationFailed(message),
            ErrorKind::AccountRestricted => Self::AccountRestricted,
            ErrorKind::PlaybackFailed => Self::PlaybackFailed(message),
            ErrorKind::DeviceUnavailable => Self::DeviceUnavailable,
            ErrorKind::CommandRejected => Self::CommandRejected(message),
            ErrorKind::FetchFailed => Self::FetchFailed(message),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// Classify a failed remote call from its rendered error text.
    ///
    /// The Web API client only exposes status codes through its `Display`
    /// output, so matching on the text is the most stable option.
    pub fn from_remote(error: &dyn std::fmt::Display) -> Self {
        let text = error.to_string();
        let lower = text.to_lowercase();

        if lower.contains("401") || lower.contains("unauthorized") {
            Self::AuthenticationFailed(text)
        } else if lower.contains("403") && lower.contains("premium") {
            Self::AccountRestricted
        } else if lower.contains("404")
            || lower.contains("no active device")
            || lower.contains("device not found")
        {
            Self::DeviceUnavailable
        } else {
            Self::CommandRejected(text)
        }
    }

    /// Short text suitable for a transient toast in the UI.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationFailed(_) => {
                "Authentication expired. Refreshing credentials...".to_string()
            }
            Self::AccountRestricted => {
                "Spotify Premium is required for playback. Upgrade your account to continue."
                    .to_string()
            }
            Self::DeviceUnavailable => {
                "No active device found. Start playing on Spotify and try again.".to_string()
            }
            Self::CommandRejected(message) if message.contains("429") => {
                "Rate limited. Please wait a moment.".to_string()
            }
            Self::CommandRejected(message) if message.contains("403") => {
                "Action forbidden right now.".to_string()
            }
            other => format!("Error: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remote_status_codes() {
        assert_eq!(
            EngineError::from_remote(&"http error: status code 401 Unauthorized").kind(),
            ErrorKind::AuthenticationFailed
        );
        assert_eq!(
            EngineError::from_remote(&"status code 403: PREMIUM_REQUIRED Premium required"),
            EngineError::AccountRestricted
        );
        assert_eq!(
            EngineError::from_remote(&"status code 404: Player command failed: No active device found"),
            EngineError::DeviceUnavailable
        );
        assert_eq!(
            EngineError::from_remote(&"status code 403 Restriction violated").kind(),
            ErrorKind::CommandRejected
        );
    }

    #[test]
    fn kind_round_trips_through_from_kind() {
        for kind in [
            ErrorKind::InitializationFailed,
            ErrorKind::AuthenticationFailed,
            ErrorKind::AccountRestricted,
            ErrorKind::PlaybackFailed,
            ErrorKind::DeviceUnavailable,
            ErrorKind::CommandRejected,
            ErrorKind::FetchFailed,
        ] {
            assert_eq!(EngineError::from_kind(kind, "detail").kind(), kind);
        }
    }

    #[test]
    fn user_message_mentions_premium_for_restricted_accounts() {
        assert!(EngineError::AccountRestricted.user_message().contains("Premium"));
        assert!(
            EngineError::CommandRejected("status code 429".into())
                .user_message()
                .contains("Rate limited")
        );
    }
}
