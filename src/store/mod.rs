//! # Atomic Store (`spec.md` §4.A)
//!
//! The only source of truth for call state. Where the original system
//! leans on Redis Lua scripts to get "one round trip, one atomic
//! decision", this crate leans on `sled`'s transactional API across a
//! handful of trees opened from one `sled::Db` — the same shape
//! `tmush::storage::TinyMushStore` uses for the BBS's world database.
//! A `sled` transaction spanning the item tree and the due-index tree is
//! exactly as atomic as a Lua script touching a hash and a sorted set: both
//! commit or neither does, and no other transaction can observe a
//! half-applied state.
//!
//! [`SledStore`] is `Clone` (all its fields are `Arc`-backed `sled` handles)
//! so every worker task and the scheduler can hold their own handle to the
//! same database without coordinating a shared reference themselves.
//!
//! Synchronous `sled` calls are never awaited directly — the public
//! [`AtomicStore`] methods wrap the blocking implementation in
//! `tokio::task::spawn_blocking`, the same pattern the teacher uses for its
//! `_async` wrapper methods, so a slow disk never stalls the executor.

mod keys;
mod sled_store;

pub use sled_store::{IncrementOutcome, SledStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PostopError;
use crate::model::{CallRecord, CallScheduleItem, CallStatus};

/// The scripted atomic primitives from `spec.md` §4.A, plus the read
/// queries the Scheduler needs. Exists as a trait so the Scheduler, Worker
/// Pool, and Call Executor depend on a boundary rather than on `sled`
/// directly — tests can swap in any implementation.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Claim every `Pending` item due at or before `now`, up to `limit`.
    /// Returns only ids this call itself claimed; concurrent callers never
    /// receive overlapping ids for the same item (`spec.md` §8 invariant 1).
    async fn dequeue_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, PostopError>;

    /// Atomically increment `attempt_count`; re-arms the item to `Pending`
    /// at its original `scheduled_time` or marks it terminally `Failed` if
    /// `max_attempts` has been reached.
    async fn increment_attempt(&self, id: &str) -> Result<(u32, IncrementOutcome), PostopError>;

    /// Compare-and-swap on `status`. Removes the due-index entry iff `new`
    /// is terminal.
    async fn conditional_status_update(
        &self,
        id: &str,
        expected: CallStatus,
        new: CallStatus,
        notes: Option<&str>,
    ) -> Result<bool, PostopError>;

    /// Transactional multi-insert: writes every item's hash, due-index
    /// entry, and patient-set membership, all-or-nothing.
    async fn batch_schedule(&self, items: &[CallScheduleItem]) -> Result<(), PostopError>;

    /// Moves terminal items last updated before `cutoff` into the archive
    /// hash, deleting the originals and their patient-set membership.
    async fn archive_old(&self, cutoff: DateTime<Utc>) -> Result<usize, PostopError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<CallScheduleItem>, PostopError>;

    async fn list_by_patient(&self, patient_id: &str) -> Result<Vec<CallScheduleItem>, PostopError>;

    async fn list_pending_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CallScheduleItem>, PostopError>;

    async fn put_record(&self, record: &CallRecord) -> Result<(), PostopError>;

    async fn get_record(&self, id: &str) -> Result<Option<CallRecord>, PostopError>;

    /// Orphan reaper (`spec.md` §9): CAS every `InProgress` item whose
    /// `updated_at` is older than `cutoff` back to `Pending`, re-inserting
    /// it into the due index at its original `scheduled_time`. Returns the
    /// count reclaimed.
    async fn reap_stale_in_progress(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize, PostopError>;

    /// Persists a Transcript Analyzer result under the session id that
    /// produced it (`spec.md` §4.D step 4), as a pre-serialized JSON blob so
    /// the store never needs to know `analyzer::TranscriptAnalysis`'s shape.
    /// Overwrites any analysis already stored for that session.
    async fn put_analysis(&self, session_id: &str, analysis_json: &str) -> Result<(), PostopError>;

    /// Retrieves a previously persisted analysis by session id, if any.
    async fn get_analysis(&self, session_id: &str) -> Result<Option<String>, PostopError>;
}
