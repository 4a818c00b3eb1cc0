use ahash::AHashMap;

/// A catalog hotel as ingested from the hotels source. Immutable once
/// published in a [`super::Snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hotel {
    pub id: u32,
    pub name: String,
    pub stars: f32,
}

/// What callers get back from [`HotelTable::resolve`] — catalog metadata, or
/// a synthetic stand-in when an offer references a hotel id absent from the
/// catalog. Callers cannot otherwise tell the two apart, hence
/// `has_catalog_entry`.
#[derive(Debug, Clone, PartialEq)]
pub struct HotelInfo {
    pub id: u32,
    pub name: String,
    pub stars: f32,
    pub dense_index: u32,
    pub has_catalog_entry: bool,
}

/// Authoritative hotel catalog plus the hotel-id → dense-index mapping that
/// every secondary index (see [`super::index::IndexSet`]) is built against.
/// The two input streams commonly diverge — offers reference hotel ids the
/// catalog never mentions, and the catalog can list hotels with no offers —
/// so dense indices are assigned lazily, in first-seen order, covering
/// whichever stream sees a given id first.
#[derive(Debug, Default)]
pub struct HotelTable {
    known: AHashMap<u32, Hotel>,
    dense_index: AHashMap<u32, u32>,
    next_dense_index: u32,
}

impl HotelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes both lookup maps to `capacity`, the `maxHotels` configured
    /// cap — avoids the rehash storm a 3·10^5-hotel catalog would otherwise
    /// cause growing from an empty map one insert at a time.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            known: AHashMap::with_capacity(capacity),
            dense_index: AHashMap::with_capacity(capacity),
            next_dense_index: 0,
        }
    }

    /// Registers a catalog hotel, assigning it a dense index if it hasn't
    /// been seen yet (e.g. via an earlier offer row).
    pub fn insert_catalog_hotel(&mut self, hotel: Hotel) {
        self.ensure_dense_index(hotel.id);
        self.known.insert(hotel.id, hotel);
    }

    /// Returns the dense index for `hotel_id`, assigning a fresh one in
    /// first-seen order if this is the first time this id has appeared in
    /// either input stream.
    pub fn ensure_dense_index(&mut self, hotel_id: u32) -> u32 {
        *self.dense_index.entry(hotel_id).or_insert_with(|| {
            let idx = self.next_dense_index;
            self.next_dense_index += 1;
            idx
        })
    }

    pub fn dense_index_of(&self, hotel_id: u32) -> Option<u32> {
        self.dense_index.get(&hotel_id).copied()
    }

    /// Number of distinct hotel ids seen across both input streams — the
    /// size every per-hotel index array must be allocated to.
    pub fn dense_count(&self) -> u32 {
        self.next_dense_index
    }

    /// Resolves `hotel_id` to its catalog entry, or a deterministic
    /// synthetic one (`"Hotel <id>"`, `stars = hash(id) % 3 + 3`) if the
    /// catalog never mentioned it. Only ids seen by at least one offer or
    /// catalog row have a meaningful dense index; callers that already hold
    /// a `row_id` always have one.
    pub fn resolve(&self, hotel_id: u32) -> HotelInfo {
        let dense_index = self.dense_index.get(&hotel_id).copied().unwrap_or(u32::MAX);
        match self.known.get(&hotel_id) {
            Some(hotel) => HotelInfo {
                id: hotel.id,
                name: hotel.name.clone(),
                stars: hotel.stars,
                dense_index,
                has_catalog_entry: true,
            },
            None => HotelInfo {
                id: hotel_id,
                name: format!("Hotel {hotel_id}"),
                stars: (deterministic_hash(hotel_id) % 3) as f32 + 3.0,
                dense_index,
                has_catalog_entry: false,
            },
        }
    }

    pub fn iter_known(&self) -> impl Iterator<Item = &Hotel> {
        self.known.values()
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }
}

/// A small, stable hash used only to pick a deterministic synthetic star
/// rating — not a cryptographic hash, just FNV-1a over the id's bytes so the
/// same id always yields the same synthetic rating across snapshots.
fn deterministic_hash(id: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in id.to_le_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_catalog_hotels_verbatim() {
        let mut table = HotelTable::new();
        table.insert_catalog_hotel(Hotel { id: 1, name: "Paradise".into(), stars: 4.0 });
        let info = table.resolve(1);
        assert!(info.has_catalog_entry);
        assert_eq!(info.name, "Paradise");
        assert_eq!(info.stars, 4.0);
    }

    #[test]
    fn synthesizes_unknown_hotels_deterministically() {
        let table = HotelTable::new();
        let a = table.resolve(999);
        let b = table.resolve(999);
        assert!(!a.has_catalog_entry);
        assert_eq!(a.name, "Hotel 999");
        assert_eq!(a.stars, b.stars);
        assert!((3.0..6.0).contains(&a.stars));
    }

    #[test]
    fn dense_indices_are_assigned_in_first_seen_order_and_shared() {
        let mut table = HotelTable::new();
        assert_eq!(table.ensure_dense_index(42), 0);
        assert_eq!(table.ensure_dense_index(7), 1);
        assert_eq!(table.ensure_dense_index(42), 0);
        table.insert_catalog_hotel(Hotel { id: 42, name: "X".into(), stars: 1.0 });
        assert_eq!(table.dense_index_of(42), Some(0));
        assert_eq!(table.dense_count(), 2);
    }
}
