//! # Scheduler (`spec.md` §4.C)
//!
//! Converts discharge orders and Transcript Analyzer recommendations into
//! `CallScheduleItem`s and persists them through the Atomic Store. The
//! Scheduler is the only writer of new schedule items; workers only ever
//! mutate status through `AtomicStore`'s conditional primitives.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::analyzer::TranscriptAnalysis;
use crate::error::PostopError;
use crate::model::{CallScheduleItem, CallType, DischargeOrder, TimingSpec};
use crate::store::AtomicStore;

/// A patient's identifying fields, filled in on every generated item —
/// the order/analysis carries the prompt text, never the phone number.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: String,
    pub phone: String,
    pub name: String,
}

pub struct Scheduler<S: AtomicStore> {
    store: Arc<S>,
}

impl<S: AtomicStore> Scheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Generation from templates (`spec.md` §4.C): for every order carrying
    /// a `call_template`, resolve its timing spec into one or more instants
    /// and create a `CallScheduleItem` per instant. A `WellnessCheck` 18h
    /// after discharge is always emitted as well, independent of any order.
    pub async fn schedule_from_orders(
        &self,
        patient: &Patient,
        discharge_time: DateTime<Utc>,
        orders: &[DischargeOrder],
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        let mut items = Vec::new();

        for order in orders {
            let Some(template) = &order.call_template else {
                continue;
            };
            let spec = TimingSpec::parse(&template.timing);
            let prompt = order.render_prompt(&template.prompt_template, &patient.name);
            for instant in spec.instants(discharge_time) {
                let mut item = CallScheduleItem::new(
                    patient.id.clone(),
                    patient.phone.clone(),
                    instant,
                    template.call_type,
                    template.priority,
                    prompt.clone(),
                );
                item.related_discharge_order_id = Some(order.id.clone());
                items.push(item);
            }
        }

        items.push(self.wellness_check(patient, discharge_time));

        self.store.batch_schedule(&items).await?;
        Ok(items)
    }

    /// Connects the Transcript Analyzer's output to the Scheduler, per the
    /// flow diagram in `spec.md` §2 ("D produces call recommendations → C
    /// persists them via A").
    pub async fn schedule_from_analysis(
        &self,
        patient: &Patient,
        discharge_time: DateTime<Utc>,
        analysis: &TranscriptAnalysis,
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        let mut items = Vec::with_capacity(analysis.recommendations.len());
        for rec in &analysis.recommendations {
            let scheduled_time = discharge_time + rec.timing_bucket.offset();
            let item = CallScheduleItem::new(
                patient.id.clone(),
                patient.phone.clone(),
                scheduled_time,
                rec.call_type,
                rec.priority,
                rec.prompt.clone(),
            );
            items.push(item);
        }
        self.store.batch_schedule(&items).await?;
        Ok(items)
    }

    fn wellness_check(&self, patient: &Patient, discharge_time: DateTime<Utc>) -> CallScheduleItem {
        CallScheduleItem::new(
            patient.id.clone(),
            patient.phone.clone(),
            discharge_time + chrono::Duration::hours(18),
            CallType::WellnessCheck,
            3,
            format!(
                "Check in warmly with {} about how they're feeling since discharge.",
                patient.name
            ),
        )
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<CallScheduleItem>, PostopError> {
        self.store.get_by_id(id).await
    }

    pub async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<CallScheduleItem>, PostopError> {
        self.store.list_by_patient(patient_id).await
    }

    /// Pending items due within `[start, end]`, tie-broken (priority asc,
    /// created_at asc) per `spec.md` §4.C.
    pub async fn list_pending_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        let mut items = self.store.list_pending_window(start, end).await?;
        items.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CallTemplate;
    use crate::store::SledStore;
    use chrono::TimeZone;

    fn patient() -> Patient {
        Patient {
            id: "patient-1".into(),
            phone: "+15551234567".into(),
            name: "Jordan".into(),
        }
    }

    async fn scheduler() -> (tempfile::TempDir, Scheduler<SledStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        (dir, Scheduler::new(store))
    }

    #[tokio::test]
    async fn scenario_a_simple_compression_reminder() {
        let (_dir, scheduler) = scheduler().await;
        let discharge = Utc.with_ymd_and_hms(2025, 1, 15, 15, 30, 0).unwrap();
        let order = DischargeOrder::new("vm_compression", "Compression", "Wear the compression sleeve daily.")
            .with_call_template(CallTemplate {
                timing: "24_hours_after_discharge".into(),
                call_type: CallType::CompressionCheck,
                priority: 2,
                prompt_template: "Remind {patient_name}: {discharge_order}".into(),
            });

        let items = scheduler
            .schedule_from_orders(&patient(), discharge, &[order])
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        let compression = items
            .iter()
            .find(|i| i.call_type == CallType::CompressionCheck)
            .unwrap();
        assert!(compression.llm_prompt.contains("Wear the compression sleeve daily."));
        assert_eq!(compression.status, crate::model::CallStatus::Pending);
        assert_eq!(compression.scheduled_time, Utc.with_ymd_and_hms(2025, 1, 16, 15, 30, 0).unwrap());

        let wellness = items.iter().find(|i| i.call_type == CallType::WellnessCheck).unwrap();
        assert_eq!(wellness.scheduled_time, discharge + chrono::Duration::hours(18));
    }

    #[tokio::test]
    async fn pending_window_ties_break_by_priority_then_created_at() {
        let (_dir, scheduler) = scheduler().await;
        let discharge = Utc::now();
        let order_a = DischargeOrder::new("a", "A", "text a").with_call_template(CallTemplate {
            timing: "1_hours_after_discharge".into(),
            call_type: CallType::FollowUp,
            priority: 3,
            prompt_template: "{patient_name} {discharge_order}".into(),
        });
        let order_b = DischargeOrder::new("b", "B", "text b").with_call_template(CallTemplate {
            timing: "1_hours_after_discharge".into(),
            call_type: CallType::Urgent,
            priority: 1,
            prompt_template: "{patient_name} {discharge_order}".into(),
        });

        scheduler
            .schedule_from_orders(&patient(), discharge, &[order_a, order_b])
            .await
            .unwrap();

        let window = scheduler
            .list_pending_window(discharge, discharge + chrono::Duration::hours(2))
            .await
            .unwrap();
        assert_eq!(window[0].priority, 1);
    }
}
