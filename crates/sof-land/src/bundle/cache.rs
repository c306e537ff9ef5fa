//! Short-lived cache of bundle results nobody was waiting for yet.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use super::{BundleId, BundleOutcome};

/// Holds unmatched results for a bounded time window.
///
/// A relay can report a result before the dispatcher that sent the bundle registers its
/// correlation id. Unmatched results are parked here so the owning dispatch can still claim
/// them; nothing is ever delivered to a different id.
#[derive(Debug)]
pub(crate) struct RecentResults {
    /// Time-to-live for parked results.
    ttl: Duration,
    /// Maximum number of parked results.
    capacity: usize,
    /// Parked outcomes with their arrival time.
    parked: HashMap<BundleId, (BundleOutcome, Instant)>,
}

impl RecentResults {
    /// Creates a cache with a minimum TTL of one millisecond and capacity of one.
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: ttl.max(Duration::from_millis(1)),
            capacity: capacity.max(1),
            parked: HashMap::new(),
        }
    }

    /// Parks one unmatched outcome, evicting the oldest entry when full.
    pub(crate) fn insert(&mut self, bundle_id: BundleId, outcome: BundleOutcome, now: Instant) {
        self.evict_expired(now);
        if self.parked.len() >= self.capacity && !self.parked.contains_key(&bundle_id) {
            let oldest = self
                .parked
                .iter()
                .min_by_key(|(_, (_, arrived))| *arrived)
                .map(|(bundle_id, _)| bundle_id.clone());
            if let Some(oldest) = oldest {
                let _ = self.parked.remove(&oldest);
            }
        }
        let _ = self.parked.insert(bundle_id, (outcome, now));
    }

    /// Removes a parked outcome and returns it when it arrived at or after `since`.
    ///
    /// Outcomes parked before `since` predate the caller's send and are discarded.
    pub(crate) fn take(
        &mut self,
        bundle_id: &BundleId,
        since: Instant,
        now: Instant,
    ) -> Option<BundleOutcome> {
        self.evict_expired(now);
        self.parked
            .remove(bundle_id)
            .filter(|(_, arrived)| *arrived >= since)
            .map(|(outcome, _)| outcome)
    }

    /// Returns number of parked results.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.parked.len()
    }

    /// Removes all expired entries.
    fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.parked
            .retain(|_, (_, arrived)| now.saturating_duration_since(*arrived) < ttl);
    }
}
