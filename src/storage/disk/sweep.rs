//! Eviction plan for the disk tier sweep
//!
//! Live records are ordered from "keep longest" to "keep shortest": latest
//! deadline first, and among equal deadlines the most recently created
//! first. The byte budget keeps the longest prefix that fits; the count
//! budget then truncates what is left. Everything else goes, expired records
//! included. Size plays no part in the ordering, so a large entry that
//! expires late outlives a small one that expires soon.

use crate::storage::disk::manifest::ManifestRecord;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Why a record was chosen for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Deadline passed
    Expired,

    /// Did not fit the byte budget
    ByteLimit,

    /// Did not fit the count budget
    CountLimit,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::ByteLimit => write!(f, "byte limit"),
            EvictionReason::CountLimit => write!(f, "count limit"),
        }
    }
}

/// Keep order: later deadline, then later creation, then key
pub(crate) fn keep_order(a: &ManifestRecord, b: &ManifestRecord) -> Ordering {
    b.expire
        .cmp(&a.expire)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.key.cmp(&b.key))
}

/// Which records survive a sweep and which are evicted
#[derive(Debug, Default)]
pub struct SweepPlan {
    /// Survivors, in keep order
    pub keep: Vec<ManifestRecord>,

    /// Evicted records with the reason for each
    pub evict: Vec<(ManifestRecord, EvictionReason)>,
}

impl SweepPlan {
    /// Plan a sweep over `records`. A budget of `0` is not enforced.
    pub fn compute(
        records: impl IntoIterator<Item = ManifestRecord>,
        now: DateTime<Utc>,
        byte_limit: u64,
        count_limit: usize,
    ) -> Self {
        let mut plan = SweepPlan::default();

        let (mut live, expired): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| !record.is_expired(now));
        plan.evict
            .extend(expired.into_iter().map(|record| (record, EvictionReason::Expired)));

        live.sort_by(keep_order);

        if byte_limit > 0 {
            let mut used: u64 = 0;
            let overflow = live.iter().position(|record| {
                used = used.saturating_add(record.size);
                used > byte_limit
            });
            if let Some(index) = overflow {
                plan.evict.extend(
                    live.split_off(index)
                        .into_iter()
                        .map(|record| (record, EvictionReason::ByteLimit)),
                );
            }
        }

        if count_limit > 0 && live.len() > count_limit {
            plan.evict.extend(
                live.split_off(count_limit)
                    .into_iter()
                    .map(|record| (record, EvictionReason::CountLimit)),
            );
        }

        plan.keep = live;
        plan
    }

    /// Number of records evicted for `reason`
    pub fn count(&self, reason: EvictionReason) -> usize {
        self.evict.iter().filter(|(_, r)| *r == reason).count()
    }

    pub fn is_noop(&self) -> bool {
        self.evict.is_empty()
    }
}
