//! Call type tagging (`spec.md` §3, §4.B).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of follow-up call a `CallScheduleItem` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    DischargeReminder,
    WellnessCheck,
    MedicationReminder,
    FollowUp,
    Urgent,
    CompressionCheck,
    ActivityGuidance,
    GeneralFollowup,
}

impl CallType {
    /// Canonical snake_case wire form, used both for hash-field storage and
    /// for round-tripping LLM classifier output.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::DischargeReminder => "discharge_reminder",
            CallType::WellnessCheck => "wellness_check",
            CallType::MedicationReminder => "medication_reminder",
            CallType::FollowUp => "follow_up",
            CallType::Urgent => "urgent",
            CallType::CompressionCheck => "compression_check",
            CallType::ActivityGuidance => "activity_guidance",
            CallType::GeneralFollowup => "general_followup",
        }
    }

    /// Tolerant parse: canonical form, a table of known aliases the LLM
    /// classifier tends to emit, or `GeneralFollowup` for anything else.
    /// Never fails — an unrecognized call type must not be fatal to the
    /// scheduler (`spec.md` §4.B).
    pub fn from_str(value: &str) -> Self {
        if value.is_empty() {
            return CallType::GeneralFollowup;
        }
        let normalized = value.to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "discharge_reminder" => CallType::DischargeReminder,
            "wellness_check" | "wellness_call" => CallType::WellnessCheck,
            "medication_reminder" | "medication_check" => CallType::MedicationReminder,
            "follow_up" | "follow_up_call" => CallType::FollowUp,
            "urgent" => CallType::Urgent,
            "compression_check" | "compression_reminder" => CallType::CompressionCheck,
            "activity_guidance" => CallType::ActivityGuidance,
            "general_followup" | "followup" | "general_follow_up" => CallType::GeneralFollowup,
            "discharge_followup" => CallType::DischargeReminder,
            _ => CallType::GeneralFollowup,
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for CallType {
    fn default() -> Self {
        CallType::WellnessCheck
    }
}
