//! # Call Executor (`spec.md` §4.F)
//!
//! Per-call state machine: prepare metadata, dispatch an agent, place the
//! outbound SIP call, record the outcome, classify any SIP failure, and
//! apply the retry policy. Driven by the Worker Pool's executor workers,
//! never by the Ticker itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::PostopError;
use crate::fabric::{AgentDispatchRequest, CallFabric, SipParticipantRequest};
use crate::model::{CallRecord, CallScheduleItem, CallStatus};
use crate::store::{AtomicStore, IncrementOutcome};

/// `spec.md` §4.F step 5: classify a SIP status code as retryable or
/// permanent. Unknown codes default to retryable — an executor should
/// never treat an unrecognized failure as conclusively unfixable.
pub fn sip_error(code: u16, text: impl Into<String>) -> PostopError {
    let text = text.into();
    match code {
        486 | 487 | 408 | 503 => PostopError::SipRetryable { code, text },
        404 | 410 | 603 => PostopError::SipPermanent { code, text },
        _ => PostopError::SipRetryable { code, text },
    }
}

/// `spec.md` §4.F step 6: 5 min, 15 min, 30 min, capped at 30 min from the
/// 3rd attempt onward (`spec.md` §8 invariant 5).
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    match attempt {
        1 => Duration::from_secs(300),
        2 => Duration::from_secs(900),
        _ => Duration::from_secs(1800),
    }
}

pub struct CallExecutor<S: AtomicStore, F: CallFabric> {
    store: Arc<S>,
    fabric: Arc<F>,
    agent_name: String,
    trunk_id: String,
    call_timeout: Duration,
}

impl<S: AtomicStore, F: CallFabric> CallExecutor<S, F> {
    pub fn new(store: Arc<S>, fabric: Arc<F>, agent_name: impl Into<String>, trunk_id: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            store,
            fabric,
            agent_name: agent_name.into(),
            trunk_id: trunk_id.into(),
            call_timeout,
        }
    }

    /// Run one claimed `CallScheduleItem` to completion, writing the final
    /// `CallRecord` and advancing `item`'s status via the Atomic Store's
    /// conditional primitives. Never surfaces a fabric/SIP failure as an
    /// `Err` — every outcome, success or failure, ends in a persisted
    /// `CallRecord` that the worker pool can log and move past.
    pub async fn execute(&self, item: &CallScheduleItem) -> Result<CallRecord, PostopError> {
        let room_name = format!("followup-{}", item.id);
        let mut record = CallRecord::new(item.id.clone(), item.patient_id.clone());
        record.started_at = Some(Utc::now());

        match tokio::time::timeout(self.call_timeout, self.run_call(item, &room_name)).await {
            Ok(Ok(())) => {
                record.ended_at = Some(Utc::now());
                record.status = CallStatus::Completed;
                self.store
                    .conditional_status_update(&item.id, CallStatus::InProgress, CallStatus::Completed, None)
                    .await?;
            }
            Ok(Err(e)) => {
                record.ended_at = Some(Utc::now());
                record.error_message = Some(e.to_string());
                self.apply_failure(item, &mut record, &e).await?;
            }
            Err(_) => {
                record.ended_at = Some(Utc::now());
                let timeout_err = PostopError::SipRetryable { code: 408, text: "call wall-clock timeout".into() };
                record.error_message = Some(timeout_err.to_string());
                self.apply_failure(item, &mut record, &timeout_err).await?;
            }
        }

        record.room_name = Some(room_name);
        record.participant_identity = Some("patient".into());
        self.store.put_record(&record).await?;
        Ok(record)
    }

    async fn run_call(&self, item: &CallScheduleItem, room_name: &str) -> Result<(), PostopError> {
        let metadata = serde_json::json!({
            "call_schedule_item": item.id,
            "patient_phone": item.patient_phone,
            "call_type": item.call_type.as_str(),
            "related_order_id": item.related_discharge_order_id,
        });

        self.fabric
            .create_agent_dispatch(AgentDispatchRequest {
                agent_name: self.agent_name.clone(),
                room_name: room_name.to_string(),
                metadata,
            })
            .await?;

        self.fabric
            .create_sip_participant(SipParticipantRequest {
                room_name: room_name.to_string(),
                trunk_id: self.trunk_id.clone(),
                phone_number: item.patient_phone.clone(),
                participant_identity: "patient".into(),
                wait_until_answered: true,
            })
            .await?;

        Ok(())
    }

    /// Applies `spec.md` §4.F steps 5-6: classify, then either re-arm via
    /// `increment_attempt` or mark the record terminal.
    async fn apply_failure(&self, item: &CallScheduleItem, record: &mut CallRecord, error: &PostopError) -> Result<(), PostopError> {
        if error.is_retryable() {
            let (_count, outcome) = self.store.increment_attempt(&item.id).await?;
            match outcome {
                IncrementOutcome::Retry => record.status = CallStatus::Failed,
                IncrementOutcome::MaxReached => record.status = CallStatus::Failed,
            }
        } else {
            self.store
                .conditional_status_update(&item.id, CallStatus::InProgress, CallStatus::Failed, Some(&error.to_string()))
                .await?;
            record.status = CallStatus::Failed;
        }
        Ok(())
    }
}
