//! Per-source crawl state machine
//!
//! A source moves `Init → Fetching → Extracting → (NextPage → Fetching …)`
//! and ends in `Stopped → Done` or in `Failed`.

use std::fmt;

/// Represents the current state of one source's crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    // ===== Active States =====
    /// Source accepted, nothing fetched yet
    Init,

    /// A page is being fetched
    Fetching,

    /// A fetched page is being detected and extracted
    Extracting,

    /// Pagination is resolving the next page
    NextPage,

    /// A stopping rule fired; final bookkeeping pending
    Stopped,

    // ===== Terminal States =====
    /// Source finished normally
    Done,

    /// Source failed and was classified
    Failed,
}

impl SourceState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SourceState) -> bool {
        use SourceState::*;
        matches!(
            (self, next),
            (Init, Fetching)
                | (Init, Failed)
                | (Fetching, Extracting)
                | (Fetching, Stopped)
                | (Fetching, Failed)
                | (Extracting, NextPage)
                | (Extracting, Stopped)
                | (Extracting, Failed)
                | (NextPage, Fetching)
                | (NextPage, Stopped)
                | (Stopped, Done)
        )
    }

    /// Moves to `next`, rejecting illegal transitions
    pub fn transition(self, next: SourceState) -> crate::Result<SourceState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::SieveError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::NextPage => "next_page",
            Self::Stopped => "stopped",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Init,
            Self::Fetching,
            Self::Extracting,
            Self::NextPage,
            Self::Stopped,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = SourceState::Init;
        for next in [
            SourceState::Fetching,
            SourceState::Extracting,
            SourceState::NextPage,
            SourceState::Fetching,
            SourceState::Extracting,
            SourceState::Stopped,
            SourceState::Done,
        ] {
            state = state.transition(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_failure_from_active_states() {
        assert!(SourceState::Init.can_transition_to(SourceState::Failed));
        assert!(SourceState::Fetching.can_transition_to(SourceState::Failed));
        assert!(SourceState::Extracting.can_transition_to(SourceState::Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [SourceState::Done, SourceState::Failed] {
            for next in SourceState::all_states() {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_invalid_transition() {
        let result = SourceState::Init.transition(SourceState::Extracting);
        assert!(matches!(
            result,
            Err(crate::SieveError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(SourceState::NextPage.to_string(), "next_page");
    }
}
