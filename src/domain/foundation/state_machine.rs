//! State machine trait for lifecycle enums.

use std::fmt;

use thiserror::Error;

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: String,
    pub to: String,
}

/// Trait for status enums that represent state machines.
///
/// Implementors define the legal edges; `transition_to` and `is_terminal`
/// are derived from them.
///
/// ```ignore
/// let next = ConnectionState::Connecting.transition_to(ConnectionState::Authenticating)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + fmt::Display {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation.
    fn transition_to(&self, target: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ConnectionState;

    #[test]
    fn transition_to_returns_target_for_legal_edge() {
        let next = ConnectionState::Connecting.transition_to(ConnectionState::Authenticating);
        assert_eq!(next, Ok(ConnectionState::Authenticating));
    }

    #[test]
    fn transition_to_reports_both_states_on_illegal_edge() {
        let err = ConnectionState::Closed
            .transition_to(ConnectionState::Open)
            .unwrap_err();
        assert_eq!(err.from, "Closed");
        assert_eq!(err.to, "Open");
        assert_eq!(err.to_string(), "Cannot transition from Closed to Open");
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for state in ConnectionState::ALL {
            for target in ConnectionState::ALL {
                assert_eq!(
                    state.can_transition_to(&target),
                    state.valid_transitions().contains(&target),
                    "{} -> {}",
                    state,
                    target
                );
            }
        }
    }
}
