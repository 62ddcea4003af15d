//! Due-index key encoding: `<8-byte big-endian epoch seconds><1-byte
//! priority><8-byte big-endian created_at epoch micros><id>`, so a
//! `sled::Tree::range` scan over a byte prefix behaves like Redis'
//! `ZRANGEBYSCORE` (`spec.md` §4.A primitive 1) while also carrying the
//! tie-break `spec.md` §4.C demands for calls due at the same instant:
//! priority ascending, then created_at ascending.

/// Encode a due-index key for `id`, due at `epoch_seconds`, tie-broken by
/// `priority` then `created_at_micros`.
pub fn encode(epoch_seconds: i64, priority: u8, created_at_micros: i64, id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 1 + 8 + id.len());
    buf.extend_from_slice(&(epoch_seconds as u64).to_be_bytes());
    buf.push(priority);
    buf.extend_from_slice(&(created_at_micros as u64).to_be_bytes());
    buf.extend_from_slice(id.as_bytes());
    buf
}

/// The lowest possible key at `epoch_seconds` — priority 0, `created_at`
/// epoch 0, empty id — used as an inclusive lower bound for range scans.
pub fn lower_bound(epoch_seconds: i64) -> Vec<u8> {
    encode(epoch_seconds, 0, 0, "")
}

/// Exclusive upper bound covering every key with `epoch_seconds <= ts`,
/// regardless of priority/created_at/id.
pub fn upper_bound(ts: i64) -> Vec<u8> {
    lower_bound(ts + 1)
}

/// Split a due-index key back into its id. The timestamp/priority/
/// created_at prefix is only needed for sort order within the index —
/// `CallScheduleItem`'s own fields are the authoritative source once the
/// entry has been found.
pub fn decode_id(key: &[u8]) -> Option<String> {
    const PREFIX_LEN: usize = 8 + 1 + 8;
    if key.len() < PREFIX_LEN {
        return None;
    }
    String::from_utf8(key[PREFIX_LEN..].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_sort_by_timestamp_then_priority_then_created_at() {
        let a = encode(100, 1, 0, "a");
        let b = encode(100, 1, 0, "b");
        let c = encode(100, 2, 0, "a");
        let d = encode(101, 0, 0, "a");
        assert!(a < b); // same timestamp, same priority, same created_at: id breaks the tie
        assert!(b < c); // lower priority (more urgent) sorts first
        assert!(c < d); // earlier timestamp always sorts first regardless of priority
    }

    #[test]
    fn priority_tie_break_honors_created_at() {
        let earlier = encode(100, 2, 1_000, "b");
        let later = encode(100, 2, 2_000, "a");
        assert!(earlier < later);
    }

    #[test]
    fn upper_bound_excludes_later_timestamps() {
        let at_ts = encode(100, 255, i64::MAX, "zzzzzzzz");
        let later = encode(101, 0, 0, "a");
        let bound = upper_bound(100);
        assert!(at_ts < bound);
        assert!(bound <= later);
    }

    #[test]
    fn decode_id_round_trips() {
        let key = encode(12345, 2, 6789, "call-42");
        assert_eq!(decode_id(&key).as_deref(), Some("call-42"));
    }
}
