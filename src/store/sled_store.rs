//! `sled`-backed implementation of [`super::AtomicStore`], grounded on
//! `tmush::storage::TinyMushStore`'s multi-tree layout and cheap-clone
//! handle, adapted to the key layout in `spec.md` §6:
//!
//! - `scheduled_calls:{id}` → the `items` tree.
//! - `scheduled_calls:by_time` → the `by_time` tree (see `super::keys`).
//! - `scheduled_calls:patient:{patient_id}` → the `patient_index` tree,
//!   keyed `{patient_id}:{id}` since sled has no native set type.
//! - `call_records:{id}` → the `records` tree.
//! - `scheduled_calls:lock:{id}` → the `locks` tree.
//! - `scheduled_calls:archive` → the `archive` tree.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use super::keys;
use super::AtomicStore;
use crate::error::PostopError;
use crate::model::{CallRecord, CallScheduleItem, CallStatus};

/// Outcome of `increment_attempt` (`spec.md` §4.A primitive 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    Retry,
    MaxReached,
}

/// Sled-backed persistence for the Atomic Store. Cheap to clone: every
/// field is an `Arc`-based `sled` handle, so every worker task can hold its
/// own `SledStore` without contending on a shared reference.
#[derive(Clone)]
pub struct SledStore {
    _db: sled::Db,
    items: sled::Tree,
    by_time: sled::Tree,
    patient_index: sled::Tree,
    records: sled::Tree,
    locks: sled::Tree,
    archive: sled::Tree,
    analyses: sled::Tree,
}

fn abort(e: impl std::fmt::Display) -> ConflictableTransactionError<PostopError> {
    ConflictableTransactionError::Abort(PostopError::StoreCorrupt(e.to_string()))
}

fn decode_dict(raw: &[u8]) -> Result<HashMap<String, String>, PostopError> {
    serde_json::from_slice(raw).map_err(|e| PostopError::StoreCorrupt(e.to_string()))
}

fn encode_dict(dict: &HashMap<String, String>) -> Result<Vec<u8>, PostopError> {
    serde_json::to_vec(dict).map_err(|e| PostopError::StoreCorrupt(e.to_string()))
}

/// Build the due-index key for `id` from its own `scheduled_time`,
/// `priority`, and `created_at` fields (`spec.md` §4.C tie-break).
fn due_key_from_dict(id: &str, dict: &HashMap<String, String>) -> Option<Vec<u8>> {
    let scheduled_time = dict.get("scheduled_time").and_then(|s| DateTime::parse_from_rfc3339(s).ok())?;
    let priority: u8 = dict.get("priority").and_then(|s| s.parse().ok())?;
    let created_at = dict.get("created_at").and_then(|s| DateTime::parse_from_rfc3339(s).ok())?;
    Some(keys::encode(scheduled_time.timestamp(), priority, created_at.timestamp_micros(), id))
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PostopError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .map_err(|e| PostopError::StoreTransient(format!("creating store directory: {e}")))?;
        let db = sled::open(path)?;
        Ok(Self {
            items: db.open_tree("scheduled_calls")?,
            by_time: db.open_tree("scheduled_calls_by_time")?,
            patient_index: db.open_tree("scheduled_calls_patient")?,
            records: db.open_tree("call_records")?,
            locks: db.open_tree("scheduled_calls_lock")?,
            archive: db.open_tree("scheduled_calls_archive")?,
            analyses: db.open_tree("discharge_analyses")?,
            _db: db,
        })
    }

    // ===== synchronous core, wrapped by the async trait below =====

    fn dequeue_due_sync(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, PostopError> {
        let bound = keys::upper_bound(now.timestamp());
        let mut claimed = Vec::new();
        for entry in self.by_time.range(..bound) {
            if claimed.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let Some(id) = keys::decode_id(&key) else {
                continue;
            };
            if self.try_claim(&id, &key)? {
                claimed.push(id);
            }
        }
        Ok(claimed)
    }

    fn try_claim(&self, id: &str, due_key: &[u8]) -> Result<bool, PostopError> {
        let now = Utc::now();
        let result = (&self.items, &self.by_time).transaction(|(items, by_time)| {
            let Some(raw) = items.get(id.as_bytes())? else {
                return Ok(false);
            };
            let mut dict = decode_dict(&raw).map_err(abort)?;
            if dict.get("status").map(String::as_str) != Some(CallStatus::Pending.as_str()) {
                return Ok(false);
            }
            dict.insert("status".into(), CallStatus::InProgress.as_str().to_string());
            dict.insert("updated_at".into(), now.to_rfc3339());
            items.insert(id.as_bytes(), encode_dict(&dict).map_err(abort)?)?;
            by_time.remove(due_key)?;
            Ok(true)
        })?;
        Ok(result)
    }

    fn increment_attempt_sync(&self, id: &str) -> Result<(u32, IncrementOutcome), PostopError> {
        let now = Utc::now();
        let id_owned = id.to_string();
        let result = (&self.items, &self.by_time).transaction(move |(items, by_time)| {
            let Some(raw) = items.get(id_owned.as_bytes())? else {
                return Err(abort(format!("unknown schedule item {id_owned}")));
            };
            let mut dict = decode_dict(&raw).map_err(abort)?;
            let max_attempts: u32 = dict
                .get("max_attempts")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3);
            let count: u32 = dict
                .get("attempt_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
                + 1;
            dict.insert("attempt_count".into(), count.to_string());
            dict.insert("updated_at".into(), now.to_rfc3339());

            let outcome = if count >= max_attempts {
                dict.insert("status".into(), CallStatus::Failed.as_str().to_string());
                dict.insert("notes".into(), "Max retry attempts reached".into());
                IncrementOutcome::MaxReached
            } else {
                dict.insert("status".into(), CallStatus::Pending.as_str().to_string());
                if let Some(key) = due_key_from_dict(&id_owned, &dict) {
                    by_time.insert(key, id_owned.as_bytes())?;
                }
                IncrementOutcome::Retry
            };
            items.insert(id_owned.as_bytes(), encode_dict(&dict).map_err(abort)?)?;
            Ok((count, outcome))
        })?;
        Ok(result)
    }

    fn conditional_status_update_sync(
        &self,
        id: &str,
        expected: CallStatus,
        new: CallStatus,
        notes: Option<&str>,
    ) -> Result<bool, PostopError> {
        let now = Utc::now();
        let id_owned = id.to_string();
        let notes_owned = notes.map(|s| s.to_string());
        let result = (&self.items, &self.by_time).transaction(move |(items, by_time)| {
            let Some(raw) = items.get(id_owned.as_bytes())? else {
                return Ok(false);
            };
            let mut dict = decode_dict(&raw).map_err(abort)?;
            if dict.get("status").map(String::as_str) != Some(expected.as_str()) {
                return Ok(false);
            }
            dict.insert("status".into(), new.as_str().to_string());
            dict.insert("updated_at".into(), now.to_rfc3339());
            if let Some(n) = &notes_owned {
                if !n.is_empty() {
                    dict.insert("notes".into(), n.clone());
                }
            }
            if new.is_terminal() {
                if let Some(key) = due_key_from_dict(&id_owned, &dict) {
                    by_time.remove(key)?;
                }
            }
            items.insert(id_owned.as_bytes(), encode_dict(&dict).map_err(abort)?)?;
            Ok(true)
        })?;
        Ok(result)
    }

    fn batch_schedule_sync(&self, new_items: &[CallScheduleItem]) -> Result<(), PostopError> {
        let dicts: Vec<(String, String, HashMap<String, String>)> = new_items
            .iter()
            .map(|item| Ok((item.id.clone(), item.patient_id.clone(), item.to_dict()?)))
            .collect::<Result<_, PostopError>>()?;

        (&self.items, &self.by_time, &self.patient_index)
            .transaction(move |(items, by_time, patient_index)| {
                for (id, patient_id, dict) in &dicts {
                    let due_key = due_key_from_dict(id, dict)
                        .ok_or_else(|| abort("missing scheduled_time/priority/created_at"))?;
                    items.insert(id.as_bytes(), encode_dict(dict).map_err(abort)?)?;
                    by_time.insert(due_key, id.as_bytes())?;
                    let pkey = format!("{patient_id}:{id}");
                    patient_index.insert(pkey.as_bytes(), &[][..])?;
                }
                Ok(())
            })
            .map_err(PostopError::from)
    }

    fn archive_old_sync(&self, cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        let mut to_archive = Vec::new();
        for entry in self.items.iter() {
            let (key, raw) = entry?;
            let dict = decode_dict(&raw)?;
            let is_terminal = matches!(
                dict.get("status").map(String::as_str),
                Some("completed") | Some("failed") | Some("cancelled")
            );
            if !is_terminal {
                continue;
            }
            let stale = dict
                .get("updated_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc) < cutoff)
                .unwrap_or(false);
            if stale {
                to_archive.push((key.to_vec(), dict));
            }
        }

        let count = to_archive.len();
        for (key, dict) in to_archive {
            self.archive.insert(key.as_slice(), encode_dict(&dict)?)?;
            self.items.remove(key.as_slice())?;
            if let Some(patient_id) = dict.get("patient_id") {
                let id = String::from_utf8_lossy(&key);
                let pkey = format!("{patient_id}:{id}");
                self.patient_index.remove(pkey.as_bytes())?;
            }
        }
        Ok(count)
    }

    fn reap_stale_in_progress_sync(&self, cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        let mut stale_ids = Vec::new();
        for entry in self.items.iter() {
            let (key, raw) = entry?;
            let dict = decode_dict(&raw)?;
            if dict.get("status").map(String::as_str) != Some(CallStatus::InProgress.as_str()) {
                continue;
            }
            let stale = dict
                .get("updated_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc) < cutoff)
                .unwrap_or(false);
            if stale {
                stale_ids.push(String::from_utf8_lossy(&key).to_string());
            }
        }

        let now = Utc::now();
        let mut reclaimed = 0;
        for id in stale_ids {
            let id_owned = id.clone();
            let result = (&self.items, &self.by_time).transaction(move |(items, by_time)| {
                let Some(raw) = items.get(id_owned.as_bytes())? else {
                    return Ok(false);
                };
                let mut dict = decode_dict(&raw).map_err(abort)?;
                if dict.get("status").map(String::as_str) != Some(CallStatus::InProgress.as_str()) {
                    return Ok(false);
                }
                dict.insert("status".into(), CallStatus::Pending.as_str().to_string());
                dict.insert("updated_at".into(), now.to_rfc3339());
                if let Some(key) = due_key_from_dict(&id_owned, &dict) {
                    by_time.insert(key, id_owned.as_bytes())?;
                }
                items.insert(id_owned.as_bytes(), encode_dict(&dict).map_err(abort)?)?;
                Ok(true)
            })?;
            if result {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    fn get_by_id_sync(&self, id: &str) -> Result<Option<CallScheduleItem>, PostopError> {
        match self.items.get(id.as_bytes())? {
            Some(raw) => Ok(Some(CallScheduleItem::from_dict(&decode_dict(&raw)?)?)),
            None => Ok(None),
        }
    }

    fn list_by_patient_sync(&self, patient_id: &str) -> Result<Vec<CallScheduleItem>, PostopError> {
        let prefix = format!("{patient_id}:");
        let mut out = Vec::new();
        for entry in self.patient_index.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let full = String::from_utf8_lossy(&key).to_string();
            if let Some(id) = full.strip_prefix(&prefix) {
                if let Some(item) = self.get_by_id_sync(id)? {
                    out.push(item);
                }
            }
        }
        Ok(out)
    }

    fn list_pending_window_sync(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        let lower = keys::lower_bound(start.timestamp());
        let upper = keys::upper_bound(end.timestamp());
        let mut out = Vec::new();
        for entry in self.by_time.range(lower..upper) {
            let (key, _) = entry?;
            if let Some(id) = keys::decode_id(&key) {
                if let Some(item) = self.get_by_id_sync(&id)? {
                    out.push(item);
                }
            }
        }
        Ok(out)
    }

    fn put_record_sync(&self, record: &CallRecord) -> Result<(), PostopError> {
        self.records
            .insert(record.id.as_bytes(), encode_dict(&record.to_dict()?)?)?;
        Ok(())
    }

    fn get_record_sync(&self, id: &str) -> Result<Option<CallRecord>, PostopError> {
        match self.records.get(id.as_bytes())? {
            Some(raw) => Ok(Some(CallRecord::from_dict(&decode_dict(&raw)?)?)),
            None => Ok(None),
        }
    }

    fn put_analysis_sync(&self, session_id: &str, analysis_json: &str) -> Result<(), PostopError> {
        self.analyses.insert(session_id.as_bytes(), analysis_json.as_bytes())?;
        Ok(())
    }

    fn get_analysis_sync(&self, session_id: &str) -> Result<Option<String>, PostopError> {
        match self.analyses.get(session_id.as_bytes())? {
            Some(raw) => Ok(Some(
                String::from_utf8(raw.to_vec()).map_err(|e| PostopError::StoreCorrupt(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Acquire a named lock (`SET NX EX` equivalent) via `compare_and_swap`,
    /// retrying briefly if it's currently held by a live (non-expired)
    /// holder.
    async fn acquire_lock(&self, id: &str, ttl: Duration) -> Result<(), PostopError> {
        let key = format!("lock:{id}");
        let deadline = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        loop {
            let current = self.locks.get(key.as_bytes())?;
            let expired = current
                .as_ref()
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc) < Utc::now())
                .unwrap_or(true);
            if current.is_none() || expired {
                let cas = self.locks.compare_and_swap(
                    key.as_bytes(),
                    current.clone(),
                    Some(deadline.to_rfc3339().into_bytes()),
                )?;
                if cas.is_ok() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    async fn release_lock(&self, id: &str) -> Result<(), PostopError> {
        let key = format!("lock:{id}");
        self.locks.remove(key.as_bytes())?;
        Ok(())
    }

    /// `get_with_lock` (`spec.md` §4.A primitive 6) reshaped as a scoped
    /// closure rather than a manual acquire/release pair — the lock is
    /// always released once `f` resolves, success or failure, the same
    /// guarantee a `try/finally` would give.
    pub async fn with_lock<F, Fut, T>(&self, id: &str, ttl: Duration, f: F) -> Result<T, PostopError>
    where
        F: FnOnce(CallScheduleItem) -> Fut,
        Fut: Future<Output = Result<T, PostopError>>,
    {
        self.acquire_lock(id, ttl).await?;
        let item = self.get_by_id(id).await?;
        let result = match item {
            Some(item) => f(item).await,
            None => Err(PostopError::StoreCorrupt(format!("unknown schedule item {id}"))),
        };
        self.release_lock(id).await?;
        result
    }
}

/// Jittered delay (`spec.md` §7: `StoreTransient` "retried in place with
/// jitter") for the `n`th retry of a transient store operation. Distinct
/// from `executor::backoff_for_attempt`, whose 300/900/1800s schedule is
/// an exact, deterministic call-retry contract (`spec.md` §8 invariant 5)
/// that jitter must never touch.
fn jittered_retry_delay(attempt: u32) -> Duration {
    use rand::Rng;
    let base_ms = 20u64 * attempt as u64;
    Duration::from_millis(base_ms + rand::thread_rng().gen_range(0..20))
}

const MAX_TRANSIENT_RETRIES: u32 = 2;

macro_rules! blocking {
    ($self:ident, $method:ident $(, $arg:expr)*) => {{
        let mut attempt: u32 = 0;
        loop {
            let store = $self.clone();
            let joined = tokio::task::spawn_blocking(move || store.$method($($arg),*)).await;
            let outcome = match joined {
                Ok(inner) => inner,
                Err(e) => Err(PostopError::StoreTransient(format!("task join error: {e}"))),
            };
            match outcome {
                Ok(v) => break Ok(v),
                Err(PostopError::StoreTransient(msg)) if attempt < MAX_TRANSIENT_RETRIES => {
                    attempt += 1;
                    let delay = jittered_retry_delay(attempt);
                    log::warn!("store operation hit a transient error, retrying in {delay:?}: {msg}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        }
    }};
}

#[async_trait]
impl AtomicStore for SledStore {
    async fn dequeue_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, PostopError> {
        blocking!(self, dequeue_due_sync, now, limit)
    }

    async fn increment_attempt(&self, id: &str) -> Result<(u32, IncrementOutcome), PostopError> {
        let id = id.to_string();
        blocking!(self, increment_attempt_sync, &id)
    }

    async fn conditional_status_update(
        &self,
        id: &str,
        expected: CallStatus,
        new: CallStatus,
        notes: Option<&str>,
    ) -> Result<bool, PostopError> {
        let id = id.to_string();
        let notes = notes.map(|s| s.to_string());
        blocking!(self, conditional_status_update_sync, &id, expected, new, notes.as_deref())
    }

    async fn batch_schedule(&self, items: &[CallScheduleItem]) -> Result<(), PostopError> {
        let items = items.to_vec();
        blocking!(self, batch_schedule_sync, &items)
    }

    async fn archive_old(&self, cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        blocking!(self, archive_old_sync, cutoff)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<CallScheduleItem>, PostopError> {
        let id = id.to_string();
        blocking!(self, get_by_id_sync, &id)
    }

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<CallScheduleItem>, PostopError> {
        let patient_id = patient_id.to_string();
        blocking!(self, list_by_patient_sync, &patient_id)
    }

    async fn list_pending_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallScheduleItem>, PostopError> {
        blocking!(self, list_pending_window_sync, start, end)
    }

    async fn put_record(&self, record: &CallRecord) -> Result<(), PostopError> {
        let record = record.clone();
        blocking!(self, put_record_sync, &record)
    }

    async fn get_record(&self, id: &str) -> Result<Option<CallRecord>, PostopError> {
        let id = id.to_string();
        blocking!(self, get_record_sync, &id)
    }

    async fn reap_stale_in_progress(&self, cutoff: DateTime<Utc>) -> Result<usize, PostopError> {
        blocking!(self, reap_stale_in_progress_sync, cutoff)
    }

    async fn put_analysis(&self, session_id: &str, analysis_json: &str) -> Result<(), PostopError> {
        let session_id = session_id.to_string();
        let analysis_json = analysis_json.to_string();
        blocking!(self, put_analysis_sync, &session_id, &analysis_json)
    }

    async fn get_analysis(&self, session_id: &str) -> Result<Option<String>, PostopError> {
        let session_id = session_id.to_string();
        blocking!(self, get_analysis_sync, &session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CallType;

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn item(patient: &str, when: DateTime<Utc>) -> CallScheduleItem {
        CallScheduleItem::new(patient, "+15551234567", when, CallType::WellnessCheck, 3, "hi")
    }

    #[tokio::test]
    async fn batch_schedule_then_dequeue_due_claims_and_removes_from_index() {
        let (_dir, store) = store();
        let now = Utc::now();
        let due = item("p1", now - chrono::Duration::minutes(1));
        let id = due.id.clone();
        store.batch_schedule(&[due]).await.unwrap();

        let claimed = store.dequeue_due(now, 10).await.unwrap();
        assert_eq!(claimed, vec![id.clone()]);

        let again = store.dequeue_due(now, 10).await.unwrap();
        assert!(again.is_empty());

        let fetched = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CallStatus::InProgress);
    }

    #[tokio::test]
    async fn concurrent_dequeue_claims_are_disjoint() {
        let (_dir, store) = store();
        let now = Utc::now();
        let items: Vec<_> = (0..10)
            .map(|i| item(&format!("p{i}"), now - chrono::Duration::minutes(1)))
            .collect();
        store.batch_schedule(&items).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.dequeue_due(now, 100).await.unwrap() }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn increment_attempt_reindexes_until_max_then_fails() {
        let (_dir, store) = store();
        let mut due = item("p1", Utc::now() - chrono::Duration::minutes(1));
        due.max_attempts = 3;
        let id = due.id.clone();
        store.batch_schedule(&[due]).await.unwrap();
        store.dequeue_due(Utc::now(), 10).await.unwrap();

        let (c1, o1) = store.increment_attempt(&id).await.unwrap();
        assert_eq!((c1, o1), (1, IncrementOutcome::Retry));
        let item1 = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item1.status, CallStatus::Pending);

        let (c2, o2) = store.increment_attempt(&id).await.unwrap();
        assert_eq!((c2, o2), (2, IncrementOutcome::Retry));

        let (c3, o3) = store.increment_attempt(&id).await.unwrap();
        assert_eq!((c3, o3), (3, IncrementOutcome::MaxReached));
        let item3 = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(item3.status, CallStatus::Failed);

        let claimed = store.dequeue_due(Utc::now() + chrono::Duration::hours(1), 10).await.unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn conditional_status_update_rejects_mismatched_expected() {
        let (_dir, store) = store();
        let due = item("p1", Utc::now());
        let id = due.id.clone();
        store.batch_schedule(&[due]).await.unwrap();

        let ok = store
            .conditional_status_update(&id, CallStatus::InProgress, CallStatus::Completed, None)
            .await
            .unwrap();
        assert!(!ok);

        let ok = store
            .conditional_status_update(&id, CallStatus::Pending, CallStatus::Cancelled, Some("cancelled by test"))
            .await
            .unwrap();
        assert!(ok);
        let after = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(after.status, CallStatus::Cancelled);
    }

    #[tokio::test]
    async fn reap_stale_in_progress_returns_orphans_to_pending() {
        let (_dir, store) = store();
        let due = item("p1", Utc::now() - chrono::Duration::minutes(1));
        let id = due.id.clone();
        store.batch_schedule(&[due]).await.unwrap();
        store.dequeue_due(Utc::now(), 10).await.unwrap();

        let reclaimed = store.reap_stale_in_progress(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let after = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(after.status, CallStatus::Pending);

        let claimed_again = store.dequeue_due(Utc::now(), 10).await.unwrap();
        assert_eq!(claimed_again, vec![id]);
    }

    #[tokio::test]
    async fn dequeue_due_claims_simultaneous_items_by_priority_then_created_at() {
        let (_dir, store) = store();
        let when = Utc::now() - chrono::Duration::minutes(1);

        let mut low_priority_first = item("p1", when);
        low_priority_first.priority = 3;
        let mut high_priority_second = item("p2", when);
        high_priority_second.priority = 1;
        high_priority_second.created_at = low_priority_first.created_at + chrono::Duration::seconds(1);
        let mut high_priority_first = item("p3", when);
        high_priority_first.priority = 1;
        high_priority_first.created_at = low_priority_first.created_at - chrono::Duration::seconds(1);

        store
            .batch_schedule(&[low_priority_first.clone(), high_priority_second.clone(), high_priority_first.clone()])
            .await
            .unwrap();

        let claimed = store.dequeue_due(Utc::now(), 10).await.unwrap();
        assert_eq!(claimed, vec![high_priority_first.id, high_priority_second.id, low_priority_first.id]);
    }

    #[tokio::test]
    async fn archive_old_moves_stale_terminal_items() {
        let (_dir, store) = store();
        let due = item("p1", Utc::now());
        let id = due.id.clone();
        store.batch_schedule(&[due]).await.unwrap();
        store
            .conditional_status_update(&id, CallStatus::Pending, CallStatus::Cancelled, None)
            .await
            .unwrap();

        let archived = store.archive_old(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(archived, 1);
        assert!(store.get_by_id(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_analysis_then_get_analysis_round_trips_by_session_id() {
        let (_dir, store) = store();
        assert!(store.get_analysis("session-1").await.unwrap().is_none());

        store.put_analysis("session-1", r#"{"confidence":0.92}"#).await.unwrap();
        let fetched = store.get_analysis("session-1").await.unwrap();
        assert_eq!(fetched.as_deref(), Some(r#"{"confidence":0.92}"#));

        assert!(store.get_analysis("session-2").await.unwrap().is_none());

        store.put_analysis("session-1", r#"{"confidence":0.4}"#).await.unwrap();
        let overwritten = store.get_analysis("session-1").await.unwrap();
        assert_eq!(overwritten.as_deref(), Some(r#"{"confidence":0.4}"#));
    }
}
