//! Corrupt-record quarantine (`spec.md` §7): a `StoreCorrupt` hit on the
//! claimed-call load path must quarantine the item (`status = Failed`,
//! `notes = "corrupt"`) rather than just logging and moving on.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use postop_followup::error::PostopError;
use postop_followup::executor::CallExecutor;
use postop_followup::fabric::MockCallFabric;
use postop_followup::model::{CallRecord, CallScheduleItem, CallStatus};
use postop_followup::store::{AtomicStore, IncrementOutcome};
use postop_followup::worker::{WorkerPool, WorkerPoolConfig};

const CORRUPT_ID: &str = "corrupt-item-1";

/// A store with exactly one claimable id whose record is corrupt: the
/// due-index entry `dequeue_due` scans is independent of whether the
/// full record still decodes, exactly as it is in `SledStore` — so the
/// ticker hands the id out, and the executor worker's subsequent
/// `get_by_id` is what actually hits `StoreCorrupt`.
struct CorruptRecordStore {
    claimed: Mutex<bool>,
    quarantine_call: Mutex<Option<(String, CallStatus, CallStatus, Option<String>)>>,
}

#[async_trait]
impl AtomicStore for CorruptRecordStore {
    async fn dequeue_due(&self, _now: DateTime<Utc>, _limit: usize) -> Result<Vec<String>, PostopError> {
        let mut claimed = self.claimed.lock().unwrap();
        if *claimed {
            return Ok(Vec::new());
        }
        *claimed = true;
        Ok(vec![CORRUPT_ID.to_string()])
    }

    async fn increment_attempt(&self, _id: &str) -> Result<(u32, IncrementOutcome), PostopError> {
        unimplemented!("not exercised by the quarantine path")
    }

    async fn conditional_status_update(
        &self,
        id: &str,
        expected: CallStatus,
        new: CallStatus,
        notes: Option<&str>,
    ) -> Result<bool, PostopError> {
        *self.quarantine_call.lock().unwrap() =
            Some((id.to_string(), expected, new, notes.map(str::to_string)));
        Ok(true)
    }

    async fn batch_schedule(&self, _items: &[CallScheduleItem]) -> Result<(), PostopError> {
        Ok(())
    }

    async fn archive_old(&self, _cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        Ok(0)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<CallScheduleItem>, PostopError> {
        if id == CORRUPT_ID {
            Err(PostopError::StoreCorrupt("missing field scheduled_time".into()))
        } else {
            Ok(None)
        }
    }

    async fn list_by_patient(&self, _patient_id: &str) -> Result<Vec<CallScheduleItem>, PostopError> {
        Ok(Vec::new())
    }

    async fn list_pending_window(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        Ok(Vec::new())
    }

    async fn put_record(&self, _record: &CallRecord) -> Result<(), PostopError> {
        Ok(())
    }

    async fn get_record(&self, _id: &str) -> Result<Option<CallRecord>, PostopError> {
        Ok(None)
    }

    async fn reap_stale_in_progress(&self, _cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        Ok(0)
    }

    async fn put_analysis(&self, _session_id: &str, _analysis_json: &str) -> Result<(), PostopError> {
        Ok(())
    }

    async fn get_analysis(&self, _session_id: &str) -> Result<Option<String>, PostopError> {
        Ok(None)
    }
}

#[tokio::test]
async fn claiming_a_corrupt_record_quarantines_it_as_failed() {
    let store = Arc::new(CorruptRecordStore {
        claimed: Mutex::new(false),
        quarantine_call: Mutex::new(None),
    });
    let fabric = Arc::new(MockCallFabric::new());
    let executor = Arc::new(CallExecutor::new(store.clone(), fabric, "agent", "trunk_main", Duration::from_secs(5)));

    let pool = WorkerPool::spawn(
        store.clone(),
        executor,
        WorkerPoolConfig { tick_interval: Duration::from_millis(20), max_batch: 10, concurrency: 1 },
        Duration::from_secs(5),
        Duration::from_secs(30),
    );

    let mut seen = None;
    for _ in 0..100 {
        if let Some(call) = store.quarantine_call.lock().unwrap().clone() {
            seen = Some(call);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pool.shutdown(Duration::from_secs(1)).await;

    let (id, expected, new, notes) = seen.expect("quarantine update was never issued");
    assert_eq!(id, CORRUPT_ID);
    assert_eq!(expected, CallStatus::InProgress);
    assert_eq!(new, CallStatus::Failed);
    assert_eq!(notes.as_deref(), Some("corrupt"));
}
