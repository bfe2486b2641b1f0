//! Size/quota-based eviction, weighted by a discounted age so a
//! brand-new payload can't immediately evict something larger and older.

use crate::db::{StoreRoot, DEFAULT_BUSY_DEADLINE};
use crate::error::StoreError;
use crate::retry::with_busy_retry;
use crate::time::now_ms;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// Weighted-age window subtracted from "now" when computing the cost of an
/// incoming payload, so a brand-new arrival is treated as if it had already
/// sat in the store for this long before it can evict anything.
const INCOMING_AGE_DISCOUNT_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupReport {
    pub deleted_expired_files: u64,
    pub freed_bytes: u64,
}

pub struct QuotaParams {
    pub database_size: u64,
    pub min_free_space: u64,
    pub free_space_available: u64,
}

fn effective_limit(params: &QuotaParams) -> u64 {
    if params.min_free_space == 0 {
        return params.database_size;
    }
    let floor = params.free_space_available.saturating_sub(params.min_free_space);
    params.database_size.min(floor)
}

/// Total bytes currently occupied by stored payloads, without running an
/// eviction pass.
pub fn current_usage(store: &StoreRoot) -> Result<u64, StoreError> {
    with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
        let conn = store.conn.lock().unwrap();
        conn.query_row("SELECT COALESCE(SUM(length), 0) FROM files", [], |r| r.get::<_, i64>(0))
    })
    .map(|n| n as u64)
}

/// Returns `true` if the incoming payload still exceeds the limit after
/// evicting everything this loop is willing to evict (caller should then
/// report `too_big`).
pub fn make_space(store: &StoreRoot, params: &QuotaParams, incoming_size: u64) -> Result<(bool, CleanupReport), StoreError> {
    let limit = effective_limit(params);
    if limit != 0 && incoming_size > limit {
        return Ok((true, CleanupReport::default()));
    }

    let mut report = CleanupReport::default();
    if limit == 0 {
        return Ok((false, report));
    }

    let incoming_cost = now_ms() - INCOMING_AGE_DISCOUNT_MS - incoming_size as i64;

    loop {
        let usage = current_usage(store)?;
        if usage + incoming_size <= limit {
            break;
        }
        let candidate = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = store.conn.lock().unwrap();
            conn.query_row(
                "SELECT id, length, inserttime FROM files ORDER BY (inserttime - length) ASC LIMIT 1",
                [],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)),
            )
            .optional()
        })?;
        let Some((id, length, inserttime)) = candidate else {
            // Nothing left to evict; the incoming payload simply doesn't fit.
            return Ok((true, report));
        };
        let candidate_cost = inserttime - length;
        if incoming_cost < candidate_cost {
            // The new arrival is "younger" than every remaining candidate;
            // it loses and nothing more is evicted.
            return Ok((true, report));
        }
        with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
            let conn = store.conn.lock().unwrap();
            conn.execute("DELETE FROM files WHERE id = ?1", [&id])?;
            conn.execute("DELETE FROM fileblobs WHERE id = ?1", [&id])
        })?;
        let _ = std::fs::remove_file(store.blob_path(&id));
        report.deleted_expired_files += 1;
        report.freed_bytes += length as u64;
    }

    maybe_vacuum(store)?;
    Ok((false, report))
}

fn maybe_vacuum(store: &StoreRoot) -> Result<(), StoreError> {
    let (page_count, free_count): (i64, i64) = with_busy_retry(DEFAULT_BUSY_DEADLINE, || {
        let conn = store.conn.lock().unwrap();
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let free_count: i64 = conn.query_row("PRAGMA freelist_count", [], |r| r.get(0))?;
        Ok((page_count, free_count))
    })?;
    if page_count > 0 && free_count > page_count / 4 {
        with_busy_retry(Duration::from_secs(30), || {
            let conn = store.conn.lock().unwrap();
            conn.execute_batch("VACUUM")
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{OpenWriteOutcome, Writer};
    use std::sync::Arc;

    fn insert_payload(store: &Arc<StoreRoot>, bytes: &[u8]) {
        let OpenWriteOutcome::Writer(mut w) = Writer::open(store.clone(), None, Some(bytes.len() as u64), None, 1024, 131072).unwrap() else {
            panic!()
        };
        w.write(bytes).unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn unlimited_quota_never_evicts() {
        let (s, _tmp) = StoreRoot::open_in_memory().unwrap();
        let store = Arc::new(s);
        insert_payload(&store, b"some bytes");
        let params = QuotaParams { database_size: 0, min_free_space: 0, free_space_available: 0 };
        let (too_big, report) = make_space(&store, &params, 1_000_000).unwrap();
        assert!(!too_big);
        assert_eq!(report.deleted_expired_files, 0);
    }

    #[test]
    fn incoming_larger_than_limit_is_too_big() {
        let (s, _tmp) = StoreRoot::open_in_memory().unwrap();
        let store = Arc::new(s);
        let params = QuotaParams { database_size: 100, min_free_space: 0, free_space_available: 0 };
        let (too_big, _) = make_space(&store, &params, 1000).unwrap();
        assert!(too_big);
    }

    #[test]
    fn eviction_makes_room_for_incoming_payload() {
        let (s, _tmp) = StoreRoot::open_in_memory().unwrap();
        let store = Arc::new(s);
        insert_payload(&store, &vec![0u8; 50]);
        let params = QuotaParams { database_size: 60, min_free_space: 0, free_space_available: 0 };
        let (too_big, report) = make_space(&store, &params, 50).unwrap();
        assert!(!too_big);
        assert_eq!(report.deleted_expired_files, 1);
    }
}
