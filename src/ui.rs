//! UI-facing display states
//!
//! Thin mapping from the session's observable state surface to the four
//! display states. The session core only guarantees the snapshot fields
//! are consistent; presentation owns everything else.

use crate::session::StateSnapshot;

/// Display state exposed to presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    /// Not connected, nothing pending
    Idle,
    /// Waiting on microphone permission / device acquisition
    RequestingPermission,
    /// Session open, microphone live
    Listening,
    /// A classified session error is surfaced
    Error,
}

impl UiState {
    /// Derive the display state from a snapshot.
    ///
    /// Error wins; otherwise connected maps to listening; otherwise the
    /// previous explicit UI-driven state holds.
    #[must_use]
    pub const fn derive(previous: Self, snapshot: &StateSnapshot) -> Self {
        if snapshot.error.is_some() {
            Self::Error
        } else if snapshot.connected {
            Self::Listening
        } else {
            match previous {
                Self::Idle | Self::RequestingPermission => previous,
                Self::Listening | Self::Error => Self::Idle,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    fn snapshot(connected: bool, error: Option<ErrorCode>) -> StateSnapshot {
        StateSnapshot {
            connected,
            speaking: false,
            error,
        }
    }

    #[test]
    fn test_error_wins() {
        let snap = snapshot(true, Some(ErrorCode::QuotaExceeded));
        assert_eq!(UiState::derive(UiState::Listening, &snap), UiState::Error);
    }

    #[test]
    fn test_connected_maps_to_listening() {
        let snap = snapshot(true, None);
        assert_eq!(UiState::derive(UiState::Idle, &snap), UiState::Listening);
    }

    #[test]
    fn test_explicit_states_hold_while_disconnected() {
        let snap = snapshot(false, None);
        assert_eq!(
            UiState::derive(UiState::RequestingPermission, &snap),
            UiState::RequestingPermission
        );
        assert_eq!(UiState::derive(UiState::Idle, &snap), UiState::Idle);
    }

    #[test]
    fn test_listening_falls_back_to_idle_on_disconnect() {
        let snap = snapshot(false, None);
        assert_eq!(UiState::derive(UiState::Listening, &snap), UiState::Idle);
    }
}
