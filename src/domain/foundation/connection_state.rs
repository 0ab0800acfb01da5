//! ConnectionState enum tracking the lifecycle of one connection.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StateMachine;

/// Lifecycle state of a dispatched connection.
///
/// ```text
/// Connecting ──► Authenticating ──► Open ──► Closing ──► Closed
///      │                │                       ▲
///      └────────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Authenticating,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Every state, in lifecycle order.
    pub const ALL: [ConnectionState; 5] = [
        ConnectionState::Connecting,
        ConnectionState::Authenticating,
        ConnectionState::Open,
        ConnectionState::Closing,
        ConnectionState::Closed,
    ];

    /// Returns true if handlers may run in this state.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Returns true once teardown has started.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Connecting, Authenticating)
                | (Connecting, Closing)
                | (Authenticating, Open)
                | (Authenticating, Closing)
                | (Open, Closing)
                | (Closing, Closed)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Connecting => vec![Authenticating, Closing],
            Authenticating => vec![Open, Closing],
            Open => vec![Closing],
            Closing => vec![Closed],
            Closed => vec![],
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Authenticating => "Authenticating",
            ConnectionState::Open => "Open",
            ConnectionState::Closing => "Closing",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_connecting() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn only_open_accepts_messages() {
        for state in ConnectionState::ALL {
            assert_eq!(state.accepts_messages(), state == ConnectionState::Open);
        }
    }

    #[test]
    fn happy_path_is_legal() {
        let path = ConnectionState::ALL;
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn authentication_failure_skips_open() {
        assert!(ConnectionState::Authenticating.can_transition_to(&ConnectionState::Closing));
    }

    #[test]
    fn open_cannot_reauthenticate() {
        assert!(!ConnectionState::Open.can_transition_to(&ConnectionState::Authenticating));
    }

    #[test]
    fn closed_is_terminal() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Closing.is_terminal());
    }

    #[test]
    fn closing_and_closed_are_shutting_down() {
        assert!(ConnectionState::Closing.is_shutting_down());
        assert!(ConnectionState::Closed.is_shutting_down());
        assert!(!ConnectionState::Open.is_shutting_down());
    }

    #[test]
    fn serializes_to_snake_case_json() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Authenticating).unwrap(),
            "\"authenticating\""
        );
    }
}
