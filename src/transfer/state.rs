//! Send-or-issue fallback states

use std::fmt;

/// Fallback FSM States
///
/// Terminal state: DONE. Failures leave the machine in whatever state
/// raised them; the error carries the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackState {
    /// Direct send with the caller's source, destination and memo
    AttemptSend,

    /// Source was short: mint the full amount to the platform account
    IssueToSelf,

    /// Minted supply sits in the platform account until this send lands
    SendAgain,

    /// Terminal: a result is available
    Done,
}

impl FallbackState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, FallbackState::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackState::AttemptSend => "ATTEMPT_SEND",
            FallbackState::IssueToSelf => "ISSUE_TO_SELF",
            FallbackState::SendAgain => "SEND_AGAIN",
            FallbackState::Done => "DONE",
        }
    }
}

impl fmt::Display for FallbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
