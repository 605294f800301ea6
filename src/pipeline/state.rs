//! Per-message status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline status of a message.
///
/// Transitions are one-directional, with two exceptions:
/// a `generating` entry whose worker died reverts to `queued` when its lease
/// expires, and an external regenerate request moves `drafted`/`failed`
/// back to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Ingested, not yet analyzed.
    Received,
    /// Analysis result attached; eligible for enqueue.
    Analyzed,
    /// Waiting in the priority work queue.
    Queued,
    /// Leased by a worker running response generation.
    Generating,
    /// Terminal success — a draft response exists.
    Drafted,
    /// Terminal failure — attempt budget exhausted or non-retryable error.
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Analyzed => "analyzed",
            Self::Queued => "queued",
            Self::Generating => "generating",
            Self::Drafted => "drafted",
            Self::Failed => "failed",
        }
    }

    /// Parse a status string from the store. Unknown strings map to
    /// `Received` so a corrupted row re-enters the pipeline at the start
    /// rather than being dropped.
    pub fn parse(s: &str) -> Self {
        match s {
            "analyzed" => Self::Analyzed,
            "queued" => Self::Queued,
            "generating" => Self::Generating,
            "drafted" => Self::Drafted,
            "failed" => Self::Failed,
            _ => Self::Received,
        }
    }

    /// Whether the transition `self -> target` is legal.
    pub fn can_transition_to(&self, target: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, target),
            (Received, Analyzed)
                | (Analyzed, Queued)
                | (Queued, Generating)
                // lease expiry fallback
                | (Generating, Queued)
                | (Generating, Drafted)
                | (Generating, Failed)
                // external regenerate request
                | (Drafted, Queued)
                | (Failed, Queued)
        )
    }

    /// Terminal states still reachable by a regenerate request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Drafted | Self::Failed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MessageStatus::*;

    #[test]
    fn forward_path_is_legal() {
        assert!(Received.can_transition_to(Analyzed));
        assert!(Analyzed.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Drafted));
        assert!(Generating.can_transition_to(Failed));
    }

    #[test]
    fn lease_expiry_fallback_is_legal() {
        assert!(Generating.can_transition_to(Queued));
    }

    #[test]
    fn regenerate_reopens_terminal_states() {
        assert!(Drafted.can_transition_to(Queued));
        assert!(Failed.can_transition_to(Queued));
    }

    #[test]
    fn backwards_and_skip_transitions_are_illegal() {
        assert!(!Analyzed.can_transition_to(Received));
        assert!(!Received.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Drafted));
        assert!(!Drafted.can_transition_to(Generating));
    }

    #[test]
    fn parse_round_trips() {
        for status in [Received, Analyzed, Queued, Generating, Drafted, Failed] {
            assert_eq!(MessageStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn parse_unknown_resets_to_received() {
        assert_eq!(MessageStatus::parse("garbage"), Received);
    }
}
