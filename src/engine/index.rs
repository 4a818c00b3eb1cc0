use ahash::AHashMap;
use chrono::Datelike;

use super::column_store::ColumnStore;
use super::hotel_table::HotelTable;

/// Packs `(year, month)` into a dense `u16` bucket key. Valid for years
/// 2000-4095, comfortably covering any travel-offer dataset this engine
/// will see.
pub fn month_key(year: i32, month: u32) -> u16 {
    ((year - 2000).max(0) as u16) * 16 + month as u16
}

pub fn month_key_from_ts(ts_ms: i64) -> u16 {
    let dt = chrono::DateTime::from_timestamp_millis(ts_ms).unwrap_or_default();
    month_key(dt.year(), dt.month())
}

/// Packs `(adults, children)` into a single byte. `adults` is 1..=10 and
/// `children` is 0..=10, so `adults * 11 + children` fits comfortably under
/// 128 — the "7-bit composite" the index design calls for.
pub fn pax_key(adults: u8, children: u8) -> u8 {
    adults * 11 + children
}

/// Secondary indexes built after the [`ColumnStore`] is finalized. Every
/// index stores `row_id` values only — no back-references to offer data, so
/// the lifetime of an index never depends on anything but the snapshot's own
/// arena of `u32`s.
#[derive(Debug, Default)]
pub struct IndexSet {
    /// Dense hotel index → row ids at that hotel, sorted ascending by price.
    by_hotel: Vec<Box<[u32]>>,
    /// Outbound departure airport string id → unsorted posting list.
    by_airport: AHashMap<u32, Box<[u32]>>,
    /// `(year, month)` bucket (derived from outbound departure) → unsorted
    /// posting list.
    by_month: AHashMap<u16, Box<[u32]>>,
    /// `(adults, children)` composite → unsorted posting list.
    by_pax: AHashMap<u8, Box<[u32]>>,
}

impl IndexSet {
    /// Builds all four indexes in a single counting pre-pass (to size exact
    /// arrays up front, avoiding reallocation storms) followed by one
    /// sequential fill pass. `by_hotel` slices are sorted by price exactly
    /// once, in place, after the fill pass.
    pub fn build(columns: &ColumnStore, hotels: &HotelTable) -> Self {
        let dense_count = hotels.dense_count() as usize;
        let mut hotel_counts = vec![0u32; dense_count];
        let mut airport_counts: AHashMap<u32, u32> = AHashMap::new();
        let mut month_counts: AHashMap<u16, u32> = AHashMap::new();
        let mut pax_counts: AHashMap<u8, u32> = AHashMap::new();

        for row in columns.iter_row_ids() {
            let dense = hotels
                .dense_index_of(columns.hotel_id_of(row))
                .expect("every offer's hotel_id has a dense index assigned during ingest");
            hotel_counts[dense as usize] += 1;
            *airport_counts.entry(columns.outbound_depart_airport_of(row)).or_insert(0) += 1;
            *month_counts
                .entry(month_key_from_ts(columns.outbound_depart_ts_of(row)))
                .or_insert(0) += 1;
            *pax_counts
                .entry(pax_key(columns.adults_of(row), columns.children_of(row)))
                .or_insert(0) += 1;
        }

        let mut by_hotel: Vec<Vec<u32>> =
            hotel_counts.iter().map(|&c| Vec::with_capacity(c as usize)).collect();
        let mut by_airport: AHashMap<u32, Vec<u32>> = airport_counts
            .into_iter()
            .map(|(k, c)| (k, Vec::with_capacity(c as usize)))
            .collect();
        let mut by_month: AHashMap<u16, Vec<u32>> = month_counts
            .into_iter()
            .map(|(k, c)| (k, Vec::with_capacity(c as usize)))
            .collect();
        let mut by_pax: AHashMap<u8, Vec<u32>> = pax_counts
            .into_iter()
            .map(|(k, c)| (k, Vec::with_capacity(c as usize)))
            .collect();

        for row in columns.iter_row_ids() {
            let dense = hotels.dense_index_of(columns.hotel_id_of(row)).unwrap();
            by_hotel[dense as usize].push(row);
            by_airport.get_mut(&columns.outbound_depart_airport_of(row)).unwrap().push(row);
            by_month
                .get_mut(&month_key_from_ts(columns.outbound_depart_ts_of(row)))
                .unwrap()
                .push(row);
            by_pax
                .get_mut(&pax_key(columns.adults_of(row), columns.children_of(row)))
                .unwrap()
                .push(row);
        }

        for bucket in &mut by_hotel {
            // Stable sort: rows were appended in ascending row_id order, so
            // equal prices keep row_id ascending — the hotel-detail tie-break.
            bucket.sort_by(|&a, &b| columns.price_of(a).partial_cmp(&columns.price_of(b)).unwrap());
        }

        Self {
            by_hotel: by_hotel.into_iter().map(Vec::into_boxed_slice).collect(),
            by_airport: by_airport.into_iter().map(|(k, v)| (k, v.into_boxed_slice())).collect(),
            by_month: by_month.into_iter().map(|(k, v)| (k, v.into_boxed_slice())).collect(),
            by_pax: by_pax.into_iter().map(|(k, v)| (k, v.into_boxed_slice())).collect(),
        }
    }

    /// Row ids at `dense_index`, sorted ascending by price. Empty slice for
    /// a dense index that was allocated but never had any offer appended.
    pub fn by_hotel(&self, dense_index: u32) -> &[u32] {
        self.by_hotel.get(dense_index as usize).map_or(&[], |b| b)
    }

    pub fn by_airport(&self, airport_id: u32) -> &[u32] {
        self.by_airport.get(&airport_id).map_or(&[], |b| b)
    }

    pub fn by_pax(&self, adults: u8, children: u8) -> &[u32] {
        self.by_pax.get(&pax_key(adults, children)).map_or(&[], |b| b)
    }

    /// Every row id whose outbound-departure month bucket overlaps
    /// `[from_ts, to_ts]` (both month-granular bounds, inclusive). Buckets
    /// are disjoint by construction (one offer belongs to exactly one
    /// month), so concatenating them needs no deduplication.
    pub fn by_month_range(&self, from_ts: i64, to_ts: i64) -> Vec<u32> {
        let from_key = month_key_from_ts(from_ts);
        let to_key = month_key_from_ts(to_ts);
        let mut out = Vec::new();
        for key in from_key..=to_key {
            if let Some(bucket) = self.by_month.get(&key) {
                out.extend_from_slice(bucket);
            }
        }
        out
    }

    pub fn hotel_count(&self) -> usize {
        self.by_hotel.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::column_store::OfferRecord;
    use crate::engine::hotel_table::Hotel;

    fn offer(hotel_id: u32, price: f32, depart_ts: i64, airport: u32, adults: u8, children: u8) -> OfferRecord {
        OfferRecord {
            hotel_id,
            price,
            adults,
            children,
            outbound_depart_ts: depart_ts,
            outbound_arrive_ts: depart_ts + 7_200_000,
            inbound_depart_ts: depart_ts + 7 * 86_400_000,
            inbound_arrive_ts: depart_ts + 7 * 86_400_000 + 7_200_000,
            outbound_depart_airport: airport,
            inbound_depart_airport: airport,
            outbound_arrive_airport: 99,
            inbound_arrive_airport: 99,
            meal_type: 0,
            room_type: 0,
            ocean_view: false,
        }
    }

    #[test]
    fn by_hotel_is_sorted_ascending_by_price_and_covers_every_row() {
        let mut hotels = HotelTable::new();
        hotels.insert_catalog_hotel(Hotel { id: 1, name: "A".into(), stars: 4.0 });
        let mut columns = ColumnStore::new();
        columns.append(offer(1, 900.0, 1_717_200_000_000, 0, 2, 0));
        columns.append(offer(1, 1200.0, 1_717_286_400_000, 0, 2, 0));

        let index = IndexSet::build(&columns, &hotels);
        let dense = hotels.dense_index_of(1).unwrap();
        let rows = index.by_hotel(dense);
        assert_eq!(rows.len(), 2);
        assert!(columns.price_of(rows[0]) <= columns.price_of(rows[1]));
    }

    #[test]
    fn by_month_range_unions_disjoint_buckets() {
        let mut hotels = HotelTable::new();
        hotels.insert_catalog_hotel(Hotel { id: 1, name: "A".into(), stars: 4.0 });
        let mut columns = ColumnStore::new();
        // June 2024 and July 2024 departures.
        columns.append(offer(1, 100.0, 1_717_200_000_000, 0, 2, 0));
        columns.append(offer(1, 100.0, 1_719_878_400_000, 0, 2, 0));

        let index = IndexSet::build(&columns, &hotels);
        let union = index.by_month_range(1_717_200_000_000, 1_719_878_400_000);
        assert_eq!(union.len(), 2);
    }
}
