//! Dialog Controller -> Email adapter integration: a full passive-listening
//! session from intro through a delivered summary email (`spec.md` §4.G,
//! §8 Scenario C), including the case where the patient's first
//! `EmailConfirm` turn isn't actually a confirmation phrase.

use std::sync::Arc;

use postop_followup::dialog::{DialogController, DialogState, ExitSignal, ToolCall};
use postop_followup::email::MockEmailSender;
use postop_followup::model::InstructionCategory;

#[tokio::test]
async fn verification_request_exit_leads_to_confirmed_summary_email() {
    let email = Arc::new(MockEmailSender::new());
    let mut controller = DialogController::new("patient@example.com", "Spanish", email.clone());
    assert_eq!(controller.state(), DialogState::Intro);

    controller.handle_tool_call(ToolCall::StartPassiveListening);
    assert!(controller.is_passive_mode());

    controller.handle_tool_call(ToolCall::CollectInstruction {
        text: "Take two Tylenol every four hours.".into(),
        category: InstructionCategory::Medication,
    });
    controller.handle_tool_call(ToolCall::CollectInstruction {
        text: "Keep the incision site dry for 48 hours.".into(),
        category: InstructionCategory::Wound,
    });

    let signal = controller.process_turn("Did you get that last one?", None);
    assert_eq!(signal, Some(ExitSignal::VerificationRequest));
    assert_eq!(controller.state(), DialogState::Summary);
    assert!(!controller.is_passive_mode());

    let summary = controller.build_summary();
    assert!(summary.contains("1. [medication]"));
    assert!(summary.contains("2. [wound]"));
    assert!(summary.contains("repeat this summary in Spanish"));

    controller.await_confirmation();
    assert_eq!(controller.state(), DialogState::EmailConfirm);

    // an unrelated reply doesn't match a confirmation phrase, so the
    // controller stays put and no email goes out yet
    let confirmed = controller.handle_confirmation_turn("can you say that again?").await.unwrap();
    assert!(!confirmed);
    assert_eq!(controller.state(), DialogState::EmailConfirm);
    assert!(email.sent.lock().unwrap().is_empty());

    let confirmed = controller.handle_confirmation_turn("Yes, that's right").await.unwrap();
    assert!(confirmed);
    assert_eq!(controller.state(), DialogState::Terminal);

    let sent = email.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "patient@example.com");
    assert!(sent[0].body_plain.contains("Keep the incision site dry"));
}

#[tokio::test]
async fn social_closing_is_ignored_until_an_instruction_has_been_collected() {
    let email = Arc::new(MockEmailSender::new());
    let mut controller = DialogController::new("patient@example.com", "English", email);
    controller.handle_tool_call(ToolCall::StartPassiveListening);

    // no instructions collected yet: a bare social closing doesn't exit
    let signal = controller.process_turn("take care now", None);
    assert_eq!(signal, None);
    assert_eq!(controller.state(), DialogState::Passive);

    // once an instruction lands, the same phrase does exit
    let signal = controller.process_turn(
        "take care now",
        Some(("Elevate the leg when resting.".into(), InstructionCategory::Activity)),
    );
    assert_eq!(signal, Some(ExitSignal::SocialClosing));
    assert_eq!(controller.state(), DialogState::Summary);
    assert_eq!(controller.instructions().len(), 1);
}
