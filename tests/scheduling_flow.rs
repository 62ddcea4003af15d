//! Scheduler -> Atomic Store integration: both generation paths
//! (templated discharge orders and analyzer recommendations) land in the
//! same store and are queryable together per patient and per due window.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use postop_followup::analyzer::{CallRecommendation, Complexity, TimingBucket, TranscriptAnalysis};
use postop_followup::model::{CallStatus, CallTemplate, CallType, DischargeOrder};
use postop_followup::scheduler::{Patient, Scheduler};
use postop_followup::store::SledStore;

fn patient(id: &str) -> Patient {
    Patient {
        id: id.into(),
        phone: "+15557654321".into(),
        name: "Alex".into(),
    }
}

async fn scheduler() -> (tempfile::TempDir, Scheduler<SledStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    (dir, Scheduler::new(store))
}

#[tokio::test]
async fn templated_orders_and_analyzer_recommendations_coexist_per_patient() {
    let (_dir, scheduler) = scheduler().await;
    let discharge = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

    let order = DischargeOrder::new("vm_compression", "Compression", "Wear the compression sleeve daily.")
        .with_call_template(CallTemplate {
            timing: "24_hours_after_discharge".into(),
            call_type: CallType::CompressionCheck,
            priority: 2,
            prompt_template: "Ask {patient_name} about: {discharge_order}".into(),
        });

    let from_orders = scheduler
        .schedule_from_orders(&patient("p-a"), discharge, &[order])
        .await
        .unwrap();
    assert_eq!(from_orders.len(), 2); // templated item + always-on wellness check

    let analysis = TranscriptAnalysis {
        instruction_analyses: Vec::new(),
        recommendations: vec![CallRecommendation {
            call_type: CallType::MedicationReminder,
            timing_bucket: TimingBucket::TwoDays,
            priority: 1,
            prompt: "Check the patient took their antibiotics.".into(),
            instruction_refs: vec![0],
            language_notes: None,
        }],
        complexity: Complexity::Simple,
        confidence: 0.9,
        recovery_timeline: "standard".into(),
    };
    let from_analysis = scheduler
        .schedule_from_analysis(&patient("p-b"), discharge, &analysis)
        .await
        .unwrap();
    assert_eq!(from_analysis.len(), 1);
    assert_eq!(
        from_analysis[0].scheduled_time,
        discharge + chrono::Duration::hours(44)
    );

    let patient_a_calls = scheduler.list_by_patient("p-a").await.unwrap();
    assert_eq!(patient_a_calls.len(), 2);
    let patient_b_calls = scheduler.list_by_patient("p-b").await.unwrap();
    assert_eq!(patient_b_calls.len(), 1);
    assert_eq!(patient_b_calls[0].call_type, CallType::MedicationReminder);
    assert_eq!(patient_b_calls[0].status, CallStatus::Pending);

    // a window spanning both patients' earliest calls returns both, in
    // priority order
    let window = scheduler
        .list_pending_window(discharge, discharge + chrono::Duration::hours(48))
        .await
        .unwrap();
    assert!(window.iter().any(|i| i.patient_id == "p-a"));
    assert!(window.iter().any(|i| i.patient_id == "p-b"));
    assert_eq!(window[0].priority, 1);
}
