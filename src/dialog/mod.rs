//! # Dialog Controller (passive listening) (`spec.md` §4.G)
//!
//! The in-call cooperative state machine: `Intro -> Passive -> Summary ->
//! EmailConfirm -> Terminal`. Gates synthesized speech while the patient's
//! discharge instructions are collected, detects exit signals in priority
//! order, and hands the summary to the email adapter on confirmation.
//!
//! Dynamic tool registration in the original becomes the static
//! [`ToolCall`] enum dispatched in [`DialogController::handle_tool_call`]
//! (`spec.md` §9).

mod exit_signal;

pub use exit_signal::ExitSignal;

use std::sync::Arc;

use crate::email::{EmailSender, EmailSummary};
use crate::error::PostopError;
use crate::model::{DischargeInstruction, InstructionCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Intro,
    Passive,
    Summary,
    EmailConfirm,
    Terminal,
}

/// Static dispatch table replacing the original's dynamically attached
/// LLM function tools (`spec.md` §9).
#[derive(Debug, Clone)]
pub enum ToolCall {
    StartPassiveListening,
    EndPassiveListening,
    CollectInstruction { text: String, category: InstructionCategory },
}

const CONFIRMATION_PHRASES: &[&str] = &["that's correct", "yes, that's right", "looks good", "yes that's right", "that is correct"];

/// Patient-language precedence, resolved once at `Intro` (Open Question,
/// `spec.md` §9 — explicit session field, then the transcriber's inferred
/// hint, then English).
pub fn resolve_patient_language(explicit: Option<&str>, transcriber_hint: Option<&str>) -> String {
    explicit
        .or(transcriber_hint)
        .unwrap_or("English")
        .to_string()
}

pub struct DialogController<E: EmailSender> {
    state: DialogState,
    is_passive_mode: bool,
    collected: Vec<DischargeInstruction>,
    patient_email: String,
    patient_language: String,
    last_turn_at: std::time::Instant,
    email: Arc<E>,
}

impl<E: EmailSender> DialogController<E> {
    pub fn new(patient_email: impl Into<String>, patient_language: impl Into<String>, email: Arc<E>) -> Self {
        Self {
            state: DialogState::Intro,
            is_passive_mode: false,
            collected: Vec::new(),
            patient_email: patient_email.into(),
            patient_language: patient_language.into(),
            last_turn_at: std::time::Instant::now(),
            email,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_passive_mode(&self) -> bool {
        self.is_passive_mode
    }

    /// Whether synthesized audio is permitted to leave the session right
    /// now. `spec.md` §4.G / §8 invariant 8: while passive, never speak,
    /// regardless of what the model tried to say.
    pub fn may_speak(&self) -> bool {
        !self.is_passive_mode
    }

    pub fn handle_tool_call(&mut self, call: ToolCall) {
        match call {
            ToolCall::StartPassiveListening => self.start_passive_listening(),
            ToolCall::EndPassiveListening => self.enter_summary(),
            ToolCall::CollectInstruction { text, category } => self.collect_instruction(&text, category),
        }
    }

    /// Only valid from `Intro` — once `Summary` has begun the controller
    /// never returns to `Passive` (`spec.md` §4.G invariant).
    fn start_passive_listening(&mut self) {
        if self.state != DialogState::Intro {
            return;
        }
        self.is_passive_mode = true;
        self.state = DialogState::Passive;
        self.last_turn_at = std::time::Instant::now();
    }

    /// `spec.md` §8 invariant 7: case- and trailing-punctuation-insensitive
    /// dedup, append-only otherwise.
    pub fn collect_instruction(&mut self, text: &str, category: InstructionCategory) {
        let candidate = DischargeInstruction::new(text, category);
        let key = candidate.dedup_key();
        if self.collected.iter().any(|existing| existing.dedup_key() == key) {
            return;
        }
        self.collected.push(candidate);
    }

    pub fn instructions(&self) -> &[DischargeInstruction] {
        &self.collected
    }

    /// One passive-mode turn: classify the utterance, maybe record an
    /// instruction, then evaluate exit signals in priority order. Returns
    /// the exit signal that fired, if any — the caller drives the actual
    /// state transition so tests can inspect which signal won without side
    /// effects beyond instruction collection.
    pub fn process_turn(&mut self, text: &str, instruction: Option<(String, InstructionCategory)>) -> Option<ExitSignal> {
        if self.state != DialogState::Passive {
            return None;
        }
        self.last_turn_at = std::time::Instant::now();

        if let Some((instruction_text, category)) = instruction {
            self.collect_instruction(&instruction_text, category);
        }

        let signal = exit_signal::classify(text, !self.collected.is_empty());
        if signal.is_some() {
            self.enter_summary();
        }
        signal
    }

    /// The 30s silence exit (`spec.md` §4.G, §5).
    pub fn silence_timeout_elapsed(&self, limit: std::time::Duration) -> bool {
        self.state == DialogState::Passive && self.last_turn_at.elapsed() >= limit
    }

    pub fn check_silence_timeout(&mut self, limit: std::time::Duration) -> bool {
        if self.silence_timeout_elapsed(limit) {
            self.enter_summary();
            true
        } else {
            false
        }
    }

    /// Once `Summary` has begun the controller never returns to `Passive`
    /// (`spec.md` §4.G invariant).
    fn enter_summary(&mut self) {
        if self.state == DialogState::Terminal {
            return;
        }
        self.is_passive_mode = false;
        self.state = DialogState::Summary;
    }

    /// Deterministic numbered summary of deduplicated instructions with
    /// category labels (`spec.md` §4.G).
    pub fn build_summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.collected.len());
        for (i, instruction) in self.collected.iter().enumerate() {
            lines.push(format!("{}. [{}] {}", i + 1, instruction.category.as_str(), instruction.text));
        }
        let mut summary = lines.join("\n");
        if self.patient_language != "English" {
            summary.push_str(&format!("\n\n(Offer to repeat this summary in {}.)", self.patient_language));
        }
        summary
    }

    /// Transition to `EmailConfirm` once the spoken summary has been
    /// delivered.
    pub fn await_confirmation(&mut self) {
        if self.state == DialogState::Summary {
            self.state = DialogState::EmailConfirm;
        }
    }

    /// Processes one `EmailConfirm` turn; on a recognized confirmation
    /// phrase, sends the summary email and closes the dialog.
    pub async fn handle_confirmation_turn(&mut self, text: &str) -> Result<bool, PostopError> {
        if self.state != DialogState::EmailConfirm {
            return Ok(false);
        }
        let normalized = text.trim().to_lowercase();
        if !CONFIRMATION_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
            return Ok(false);
        }

        self.email
            .send_summary(EmailSummary {
                to: self.patient_email.clone(),
                subject: "Your discharge summary".into(),
                body_plain: self.build_summary(),
                body_html: None,
            })
            .await?;

        self.state = DialogState::Terminal;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::MockEmailSender;

    fn controller() -> DialogController<MockEmailSender> {
        let email = Arc::new(MockEmailSender::new());
        let mut c = DialogController::new("patient@example.com", "English", email);
        c.handle_tool_call(ToolCall::StartPassiveListening);
        c
    }

    #[test]
    fn scenario_c_direct_address_exit_summarizes_three_instructions() {
        let mut c = controller();
        c.collect_instruction("Take two Tylenol every four hours.", InstructionCategory::Medication);
        c.collect_instruction("Apply ice for 20 minutes at a time.", InstructionCategory::Wound);
        c.collect_instruction("Avoid heavy lifting for two weeks.", InstructionCategory::Activity);

        let signal = c.process_turn("Maya, did you get that?", None);
        assert_eq!(signal, Some(ExitSignal::DirectAddress));
        assert_eq!(c.state(), DialogState::Summary);
        assert!(!c.is_passive_mode());
        assert_eq!(c.instructions().len(), 3);
    }

    #[test]
    fn invariant_7_dedup_ignores_case_and_trailing_punctuation() {
        let mut c = controller();
        c.collect_instruction("Take two Tylenol every four hours.", InstructionCategory::Medication);
        c.collect_instruction("take two tylenol every four hours", InstructionCategory::Medication);
        assert_eq!(c.instructions().len(), 1);
    }

    #[test]
    fn invariant_9_direct_address_beats_completion_phrase() {
        let mut c = controller();
        let signal = c.process_turn("Maya, any questions?", None);
        assert_eq!(signal, Some(ExitSignal::DirectAddress));
    }

    #[test]
    fn silence_timeout_triggers_exit_from_passive() {
        let mut c = controller();
        assert!(!c.check_silence_timeout(std::time::Duration::from_secs(30)));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(c.check_silence_timeout(std::time::Duration::from_millis(1)));
        assert_eq!(c.state(), DialogState::Summary);
    }

    #[tokio::test]
    async fn email_confirm_sends_summary_on_confirmation_phrase() {
        let mut c = controller();
        c.collect_instruction("Take two Tylenol every four hours.", InstructionCategory::Medication);
        c.process_turn("that's all", None);
        c.await_confirmation();
        assert_eq!(c.state(), DialogState::EmailConfirm);

        let confirmed = c.handle_confirmation_turn("Yes, that's right").await.unwrap();
        assert!(confirmed);
        assert_eq!(c.state(), DialogState::Terminal);
    }

    #[test]
    fn never_returns_to_passive_once_summary_begins() {
        let mut c = controller();
        c.process_turn("that's all", None);
        assert_eq!(c.state(), DialogState::Summary);
        c.handle_tool_call(ToolCall::StartPassiveListening);
        assert_ne!(c.state(), DialogState::Passive);
    }
}
