//! Orphan reaper (`spec.md` §9): a background task that periodically
//! returns `InProgress` items whose executor appears to have died — their
//! `updated_at` is older than `call_timeout + grace` — back to `Pending`
//! so a future tick can re-claim them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::store::AtomicStore;

/// `updated_at` cutoff below which an `InProgress` item is considered
/// orphaned (`spec.md` §9: `call_timeout_s + grace`).
fn stale_cutoff(now: chrono::DateTime<Utc>, call_timeout: Duration, grace: Duration) -> chrono::DateTime<Utc> {
    let stale_after = call_timeout + grace;
    now - chrono::Duration::from_std(stale_after).unwrap_or_default()
}

/// Runs every `grace` (itself a reasonable sweep cadence) until shutdown
/// is signalled, reclaiming calls whose `updated_at` is older than
/// `call_timeout + grace` (`spec.md` §9) each pass — a call still within
/// its own timeout window is never reclaimed out from under its worker.
pub async fn reaper_loop<S: AtomicStore + 'static>(
    store: Arc<S>,
    call_timeout: Duration,
    grace: Duration,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(grace.max(Duration::from_secs(5)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let cutoff = stale_cutoff(Utc::now(), call_timeout, grace);
                match store.reap_stale_in_progress(cutoff).await {
                    Ok(0) => {}
                    Ok(n) => log::info!("reaper reclaimed {n} orphaned in-progress call(s)"),
                    Err(e) => log::warn!("reaper pass failed: {e}"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}
