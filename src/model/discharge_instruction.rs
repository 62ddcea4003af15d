//! `DischargeInstruction` (`spec.md` §3) — one instruction captured by the
//! Dialog Controller during passive listening, ready to be classified by
//! the Transcript Analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionCategory {
    Medication,
    Activity,
    Wound,
    Diet,
    Followup,
    Warning,
    Device,
    Precaution,
    Other,
}

impl InstructionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionCategory::Medication => "medication",
            InstructionCategory::Activity => "activity",
            InstructionCategory::Wound => "wound",
            InstructionCategory::Diet => "diet",
            InstructionCategory::Followup => "followup",
            InstructionCategory::Warning => "warning",
            InstructionCategory::Device => "device",
            InstructionCategory::Precaution => "precaution",
            InstructionCategory::Other => "other",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "medication" => InstructionCategory::Medication,
            "activity" => InstructionCategory::Activity,
            "wound" => InstructionCategory::Wound,
            "diet" => InstructionCategory::Diet,
            "followup" | "follow_up" => InstructionCategory::Followup,
            "warning" => InstructionCategory::Warning,
            "device" => InstructionCategory::Device,
            "precaution" => InstructionCategory::Precaution,
            _ => InstructionCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeInstruction {
    pub text: String,
    pub category: InstructionCategory,
    pub captured_at: DateTime<Utc>,
}

impl DischargeInstruction {
    pub fn new(text: impl Into<String>, category: InstructionCategory) -> Self {
        Self {
            text: text.into(),
            category,
            captured_at: Utc::now(),
        }
    }

    /// Case- and trailing-punctuation-insensitive dedup key, matching the
    /// Dialog Controller's `collect_instruction` behavior (`spec.md` §4.G,
    /// §8 invariant 7).
    pub fn dedup_key(&self) -> String {
        self.text
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .to_lowercase()
    }
}
