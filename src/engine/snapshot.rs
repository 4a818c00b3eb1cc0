use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use super::column_store::ColumnStore;
use super::hotel_table::HotelTable;
use super::index::IndexSet;
use super::string_pool::StringPool;

/// Counters recorded while building a [`Snapshot`], surfaced through the
/// `/api/v1/stats` diagnostic and logged at each ingest stage transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub hotels_ingested: u64,
    pub offers_ingested: u64,
    pub rows_dropped: u64,
    pub build_duration: Duration,
}

/// An immutable bundle of catalog, columns, string pool and indexes
/// representing one version of the data. Once built, nothing in a
/// `Snapshot` ever mutates — concurrent readers need no locks. Built by the
/// ingestor, referenced by the [`super::query::QueryPlanner`] and by
/// [`crate::cache::ResultCache`] keys, and released once a newer snapshot
/// replaces it and every outstanding borrow of it is dropped.
pub struct Snapshot {
    pub strings: StringPool,
    pub columns: ColumnStore,
    pub hotels: HotelTable,
    pub indexes: IndexSet,
    pub stats: IngestStats,
}

impl Snapshot {
    pub fn from_parts(
        strings: StringPool,
        columns: ColumnStore,
        hotels: HotelTable,
        indexes: IndexSet,
    ) -> Self {
        Self {
            strings,
            columns,
            hotels,
            indexes,
            stats: IngestStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: IngestStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn empty() -> Self {
        Self {
            strings: StringPool::new(),
            columns: ColumnStore::new(),
            hotels: HotelTable::new(),
            indexes: IndexSet::default(),
            stats: IngestStats::default(),
        }
    }
}

/// Owns exactly one published [`Snapshot`] at a time. `current()` hands
/// readers a cheap `Arc` clone that stays valid for the lifetime of their
/// request even if `swap` publishes a newer snapshot concurrently — a
/// reload mid-query can never be observed as a partially built index set.
pub struct SnapshotManager {
    current: ArcSwap<Snapshot>,
}

impl SnapshotManager {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Atomically replaces the published snapshot. The previous one is
    /// dropped once every `Arc` handed out by an earlier `current()` call
    /// goes out of scope.
    pub fn swap(&self, new_snapshot: Snapshot) {
        self.current.store(Arc::new(new_snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_is_visible_to_subsequent_reads_but_not_to_handles_taken_before_it() {
        let manager = SnapshotManager::new(Snapshot::empty());
        let before = manager.current();
        assert_eq!(before.columns.len(), 0);

        let mut replacement = Snapshot::empty();
        replacement.stats.offers_ingested = 42;
        manager.swap(replacement);

        // The handle taken before the swap still observes the old snapshot.
        assert_eq!(before.stats.offers_ingested, 0);
        // A fresh handle observes the new one.
        assert_eq!(manager.current().stats.offers_ingested, 42);
    }
}
