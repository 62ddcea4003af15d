//! Exit-signal priority classification for the Dialog Controller's
//! `Passive` state (`spec.md` §4.G). Evaluated in strict priority order;
//! the first match wins (`spec.md` §8 invariant 9).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    DirectAddress,
    CompletionPhrase,
    VerificationRequest,
    ExplicitExit,
    SocialClosing,
}

struct Patterns {
    direct_address: Regex,
    direct_address_exclude: Regex,
    completion: Regex,
    completion_exclude: Regex,
    verification: Regex,
    explicit_exit: Regex,
    social_closing: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        direct_address: Regex::new(r"(^|[\s,])maya[,!?]?([\s]|$)").unwrap(),
        direct_address_exclude: Regex::new(r"\b(ask maya|maya is|maya mentioned|maya said|maya wants)\b").unwrap(),
        completion: Regex::new(r"\b(that's all|thats all|we're done|were done|any questions)\b").unwrap(),
        completion_exclude: Regex::new(r"\b(almost|done with this|not done|that's almost all)\b").unwrap(),
        verification: Regex::new(r"\b(did you get|did you capture|can you repeat|did you catch)\b").unwrap(),
        explicit_exit: Regex::new(r"\b(exit passive|stop listening)\b").unwrap(),
        social_closing: Regex::new(r"\b(good luck|take care|feel better|have a good (day|one))\b").unwrap(),
    })
}

/// Classify one utterance into the highest-priority exit signal it
/// matches, if any. `has_instructions` gates the lowest-priority signal
/// (social closing only exits if at least one instruction was collected).
pub fn classify(text: &str, has_instructions: bool) -> Option<ExitSignal> {
    let lowered = text.to_lowercase();
    let p = patterns();

    if p.direct_address.is_match(&lowered) && !p.direct_address_exclude.is_match(&lowered) {
        return Some(ExitSignal::DirectAddress);
    }
    if p.completion.is_match(&lowered) && !p.completion_exclude.is_match(&lowered) {
        return Some(ExitSignal::CompletionPhrase);
    }
    if p.verification.is_match(&lowered) {
        return Some(ExitSignal::VerificationRequest);
    }
    if p.explicit_exit.is_match(&lowered) {
        return Some(ExitSignal::ExplicitExit);
    }
    if has_instructions && p.social_closing.is_match(&lowered) {
        return Some(ExitSignal::SocialClosing);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_address_wins_over_completion_phrase() {
        assert_eq!(classify("Maya, any questions?", true), Some(ExitSignal::DirectAddress));
    }

    #[test]
    fn contextual_mentions_of_maya_are_excluded() {
        assert_eq!(classify("ask maya about the prescription", true), None);
        assert_eq!(classify("maya is going to call you back", true), None);
    }

    #[test]
    fn completion_phrase_detected_without_direct_address() {
        assert_eq!(classify("I think that's all for today", true), Some(ExitSignal::CompletionPhrase));
    }

    #[test]
    fn softened_completion_phrase_is_excluded() {
        assert_eq!(classify("we're almost done with this", true), None);
    }

    #[test]
    fn verification_request_detected() {
        assert_eq!(classify("Did you get that last one?", true), Some(ExitSignal::VerificationRequest));
    }

    #[test]
    fn explicit_exit_detected() {
        assert_eq!(classify("please exit passive mode now", true), Some(ExitSignal::ExplicitExit));
    }

    #[test]
    fn social_closing_requires_at_least_one_instruction() {
        assert_eq!(classify("take care now", false), None);
        assert_eq!(classify("take care now", true), Some(ExitSignal::SocialClosing));
    }

    #[test]
    fn no_signal_for_unrelated_utterance() {
        assert_eq!(classify("the patient also mentioned some swelling", true), None);
    }
}
