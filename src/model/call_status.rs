//! Call status and the state machine allowed transitions (`spec.md` §4.C).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    NoAnswer,
    Voicemail,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::Cancelled => "cancelled",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Voicemail => "voicemail",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => CallStatus::Pending,
            "in_progress" => CallStatus::InProgress,
            "completed" => CallStatus::Completed,
            "failed" => CallStatus::Failed,
            "cancelled" => CallStatus::Cancelled,
            "no_answer" => CallStatus::NoAnswer,
            "voicemail" => CallStatus::Voicemail,
            _ => return None,
        })
    }

    /// Terminal statuses are removed from the due index the moment they're
    /// reached and never transition again (`spec.md` §3 invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::Cancelled
        )
    }

    /// Whether `from -> to` is an edge in the state machine drawn in
    /// `spec.md` §4.C. `NoAnswer` and `Voicemail` are themselves terminal
    /// per-attempt outcomes, but a retryable one can be pushed back to
    /// `Pending` by `increment_attempt` — modeled here as a direct edge
    /// since that's the only way that transition happens.
    pub fn can_transition(&self, to: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, NoAnswer)
                | (InProgress, Voicemail)
                | (InProgress, Cancelled)
                | (NoAnswer, Pending)
                | (Voicemail, Pending)
                | (Failed, Pending) // re-armed by a future increment_attempt caller only when not yet at max_attempts
                | (Pending, Cancelled)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        CallStatus::Pending
    }
}
