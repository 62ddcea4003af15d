//! # Transcript Analyzer (`spec.md` §4.D)
//!
//! Turns a captured session's `DischargeInstruction`s into a structured
//! `TranscriptAnalysis` via one LLM call with a strict-JSON prompt. Parsing
//! tolerates fenced code blocks and free-text enum values; any failure to
//! reach or parse the LLM falls back to a deterministic analysis rather
//! than surfacing an exception to the caller. The result is always
//! persisted under the session id through the Atomic Store, mirroring the
//! original's `_store_analysis` (step 4).

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::PostopError;
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::logutil::escape_log;
use crate::model::{CallType, DischargeInstruction};
use crate::store::AtomicStore;

/// `spec.md` §4.D: fixed offsets from discharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingBucket {
    Immediate,
    NextDay,
    TwoDays,
    ThreeDays,
    OneWeek,
    TwoWeeks,
}

impl TimingBucket {
    pub fn offset(&self) -> Duration {
        match self {
            TimingBucket::Immediate => Duration::hours(3),
            TimingBucket::NextDay => Duration::hours(20),
            TimingBucket::TwoDays => Duration::hours(44),
            TimingBucket::ThreeDays => Duration::hours(68),
            TimingBucket::OneWeek => Duration::days(7),
            TimingBucket::TwoWeeks => Duration::days(14),
        }
    }

    fn from_str_lenient(value: &str) -> Self {
        match value.to_lowercase().replace([' ', '-'], "_").as_str() {
            "immediate" => TimingBucket::Immediate,
            "next_day" | "nextday" => TimingBucket::NextDay,
            "two_days" | "twodays" | "2_days" => TimingBucket::TwoDays,
            "three_days" | "threedays" | "3_days" => TimingBucket::ThreeDays,
            "one_week" | "oneweek" | "1_week" => TimingBucket::OneWeek,
            "two_weeks" | "twoweeks" | "2_weeks" => TimingBucket::TwoWeeks,
            _ => TimingBucket::NextDay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    fn from_str_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "simple" => Complexity::Simple,
            "complex" => Complexity::Complex,
            _ => Complexity::Moderate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionAnalysis {
    pub instruction_index: usize,
    /// 1-3.
    pub urgency: u8,
    pub timing_bucket: TimingBucket,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecommendation {
    pub call_type: CallType,
    pub timing_bucket: TimingBucket,
    pub priority: u8,
    pub prompt: String,
    pub instruction_refs: Vec<usize>,
    pub language_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptAnalysis {
    pub instruction_analyses: Vec<InstructionAnalysis>,
    pub recommendations: Vec<CallRecommendation>,
    pub complexity: Complexity,
    pub confidence: f32,
    pub recovery_timeline: String,
}

impl TranscriptAnalysis {
    fn to_json(&self) -> Result<String, PostopError> {
        serde_json::to_string(self).map_err(|e| PostopError::StoreCorrupt(e.to_string()))
    }
}

/// Confidence stamped on every fallback analysis (`spec.md` §8 Scenario D).
const FALLBACK_CONFIDENCE: f32 = 0.6;

#[derive(Deserialize)]
struct RawInstructionAnalysis {
    instruction_index: usize,
    urgency: u8,
    timing_bucket: String,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Deserialize)]
struct RawRecommendation {
    call_type: String,
    timing_bucket: String,
    priority: u8,
    prompt: String,
    #[serde(default)]
    instruction_refs: Vec<usize>,
    #[serde(default)]
    language_notes: Option<String>,
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    instruction_analyses: Vec<RawInstructionAnalysis>,
    recommendations: Vec<RawRecommendation>,
    #[serde(default = "default_complexity")]
    complexity: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    recovery_timeline: String,
}

fn default_complexity() -> String {
    "moderate".into()
}

fn default_confidence() -> f32 {
    0.8
}

pub struct TranscriptAnalyzer<'a, S: AtomicStore> {
    llm: &'a dyn LlmClient,
    model: String,
    store: Arc<S>,
}

impl<'a, S: AtomicStore> TranscriptAnalyzer<'a, S> {
    pub fn new(llm: &'a dyn LlmClient, model: impl Into<String>, store: Arc<S>) -> Self {
        Self { llm, model: model.into(), store }
    }

    /// Analyzes `instructions` and persists the result under `session_id`
    /// (`spec.md` §4.D step 4) before returning it. Persistence failure is
    /// logged and non-fatal — a transcript analysis that can't be saved for
    /// later reference still feeds the Scheduler on this call.
    pub async fn analyze(&self, session_id: &str, instructions: &[DischargeInstruction]) -> TranscriptAnalysis {
        let analysis = if instructions.is_empty() {
            self.empty_instructions_analysis()
        } else {
            self.analyze_instructions(instructions).await
        };

        self.store_analysis(session_id, &analysis).await;
        analysis
    }

    async fn analyze_instructions(&self, instructions: &[DischargeInstruction]) -> TranscriptAnalysis {
        let prompt = self.build_prompt(instructions);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(
                    "You are a clinical discharge-instruction classifier. Respond with strict JSON only, no prose.",
                ),
                ChatMessage::user(prompt),
            ],
            max_tokens: 1024,
            temperature: 0.1,
            timeout_s: 20,
        };

        match self.llm.chat_completion(request).await {
            Ok(response) => match parse_analysis(&response.content) {
                Ok(analysis) => analysis,
                Err(e) => {
                    log::warn!(
                        "transcript analyzer received malformed LLM output: {e} (raw: {})",
                        escape_log(&response.content)
                    );
                    self.malformed_fallback()
                }
            },
            Err(e) => {
                log::warn!("transcript analyzer could not reach the LLM: {e}");
                self.malformed_fallback()
            }
        }
    }

    /// Mirrors the original analyzer's non-fatal `_store_analysis`: a
    /// failure to persist is logged, never surfaced to the caller.
    async fn store_analysis(&self, session_id: &str, analysis: &TranscriptAnalysis) {
        let json = match analysis.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::warn!("failed to serialize transcript analysis for session {session_id}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.put_analysis(session_id, &json).await {
            log::warn!("failed to persist transcript analysis for session {session_id}: {e}");
        }
    }

    fn build_prompt(&self, instructions: &[DischargeInstruction]) -> String {
        let mut block = String::new();
        for (i, instruction) in instructions.iter().enumerate() {
            block.push_str(&format!(
                "{}. [{}] {}\n",
                i,
                instruction.category.as_str(),
                instruction.text
            ));
        }
        format!(
            "Discharge instructions captured this session:\n{block}\n\
             Return JSON matching: {{\"instruction_analyses\": [...], \"recommendations\": [...], \
             \"complexity\": \"simple|moderate|complex\", \"confidence\": 0.0-1.0, \
             \"recovery_timeline\": \"...\"}}"
        )
    }

    /// `spec.md` §4.D: `EmptyInstructions` produces only a single wellness
    /// check, no LLM call at all.
    fn empty_instructions_analysis(&self) -> TranscriptAnalysis {
        TranscriptAnalysis {
            instruction_analyses: Vec::new(),
            recommendations: vec![CallRecommendation {
                call_type: CallType::WellnessCheck,
                timing_bucket: TimingBucket::NextDay,
                priority: 3,
                prompt: "General wellness check-in; no discharge instructions were captured.".into(),
                instruction_refs: Vec::new(),
                language_notes: None,
            }],
            complexity: Complexity::Simple,
            confidence: 1.0,
            recovery_timeline: "standard".into(),
        }
    }

    /// `spec.md` §4.D step 3 / Scenario D: one `GeneralFollowup` at +20h and
    /// one `WellnessCheck` at +68h, confidence fixed at 0.6.
    fn malformed_fallback(&self) -> TranscriptAnalysis {
        TranscriptAnalysis {
            instruction_analyses: Vec::new(),
            recommendations: vec![
                CallRecommendation {
                    call_type: CallType::GeneralFollowup,
                    timing_bucket: TimingBucket::NextDay,
                    priority: 2,
                    prompt: "Follow up on the patient's discharge instructions.".into(),
                    instruction_refs: Vec::new(),
                    language_notes: None,
                },
                CallRecommendation {
                    call_type: CallType::WellnessCheck,
                    timing_bucket: TimingBucket::ThreeDays,
                    priority: 3,
                    prompt: "Wellness check-in following discharge.".into(),
                    instruction_refs: Vec::new(),
                    language_notes: None,
                },
            ],
            complexity: Complexity::Moderate,
            confidence: FALLBACK_CONFIDENCE,
            recovery_timeline: "unknown".into(),
        }
    }
}

/// Strip a fenced code block (```json ... ``` or ``` ... ```) if present,
/// then parse. Tolerates a small amount of preamble before the first `{`.
fn parse_analysis(raw: &str) -> Result<TranscriptAnalysis, PostopError> {
    let cleaned = strip_fences(raw);
    let json_start = cleaned.find('{').ok_or_else(|| {
        PostopError::LlmMalformed("no JSON object found in analyzer response".into())
    })?;
    let candidate = &cleaned[json_start..];
    let raw_analysis: RawAnalysis =
        serde_json::from_str(candidate).map_err(|e| PostopError::LlmMalformed(e.to_string()))?;

    let instruction_analyses = raw_analysis
        .instruction_analyses
        .into_iter()
        .map(|r| InstructionAnalysis {
            instruction_index: r.instruction_index,
            urgency: r.urgency.clamp(1, 3),
            timing_bucket: TimingBucket::from_str_lenient(&r.timing_bucket),
            flags: r.flags,
        })
        .collect();

    let recommendations = raw_analysis
        .recommendations
        .into_iter()
        .map(|r| CallRecommendation {
            call_type: CallType::from_str(&r.call_type),
            timing_bucket: TimingBucket::from_str_lenient(&r.timing_bucket),
            priority: r.priority.clamp(1, 3),
            prompt: r.prompt,
            instruction_refs: r.instruction_refs,
            language_notes: r.language_notes,
        })
        .collect();

    Ok(TranscriptAnalysis {
        instruction_analyses,
        recommendations,
        complexity: Complexity::from_str_lenient(&raw_analysis.complexity),
        confidence: raw_analysis.confidence.clamp(0.0, 1.0),
        recovery_timeline: raw_analysis.recovery_timeline,
    })
}

fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}
