//! Error taxonomy shared across the orchestrator (`spec.md` §7).
//!
//! Adapter boundaries (`store`, `fabric`, `llm`, `email`) convert whatever
//! their underlying transport throws into one of these variants before it
//! reaches the Scheduler or Worker Pool — callers above the adapter layer
//! never see a raw `sled::Error` or `reqwest::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostopError {
    /// Transient store failure (network, timeout). `SledStore` retries the
    /// operation in place with jitter a few times before giving up; rarely
    /// reaches a caller, and never counts against a call's `attempt_count`.
    #[error("store transient error: {0}")]
    StoreTransient(String),

    /// A persisted record could not be decoded. The offending item is
    /// quarantined (`status = Failed`, `notes = "corrupt"`) rather than
    /// crashing the worker.
    #[error("store record corrupt: {0}")]
    StoreCorrupt(String),

    /// SIP failure classified as retryable (busy, no answer, cancelled,
    /// service unavailable). Carries the SIP status code and text so the
    /// executor can record it verbatim.
    #[error("SIP {code} {text} (retryable)")]
    SipRetryable { code: u16, text: String },

    /// SIP failure classified as permanent (not found, gone, declined).
    #[error("SIP {code} {text} (permanent)")]
    SipPermanent { code: u16, text: String },

    /// The LLM adapter could not be reached at all.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// The LLM responded but its output could not be parsed as the expected
    /// structured analysis.
    #[error("LLM response malformed: {0}")]
    LlmMalformed(String),

    /// The Call Fabric (realtime voice platform) could not be reached.
    /// Treated identically to `SipRetryable` by the retry policy.
    #[error("call fabric unavailable: {0}")]
    FabricUnavailable(String),

    /// `attempt_count` has reached `max_attempts`; the call is terminally
    /// `Failed`.
    #[error("retry policy exhausted after {attempts} attempts")]
    PolicyExhausted { attempts: u32 },

    /// Graceful shutdown interrupted the call before it advanced past the
    /// claim CAS.
    #[error("cancelled during shutdown")]
    Cancelled,
}

impl PostopError {
    /// Whether the retry policy (`spec.md` §4.F step 6) should schedule
    /// another attempt for this error, assuming `attempt_count <
    /// max_attempts`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PostopError::StoreTransient(_)
                | PostopError::SipRetryable { .. }
                | PostopError::FabricUnavailable(_)
        )
    }
}

impl From<sled::Error> for PostopError {
    fn from(e: sled::Error) -> Self {
        PostopError::StoreTransient(e.to_string())
    }
}

impl From<sled::transaction::TransactionError<PostopError>> for PostopError {
    fn from(e: sled::transaction::TransactionError<PostopError>) -> Self {
        match e {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(err) => {
                PostopError::StoreTransient(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for PostopError {
    fn from(e: serde_json::Error) -> Self {
        PostopError::StoreCorrupt(e.to_string())
    }
}

impl From<reqwest::Error> for PostopError {
    fn from(e: reqwest::Error) -> Self {
        PostopError::FabricUnavailable(e.to_string())
    }
}
