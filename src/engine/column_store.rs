/// Milliseconds in a day, used to derive `duration_nights` from the two
/// outbound/inbound departure timestamps.
const MS_PER_DAY: i64 = 86_400_000;

/// One fully-parsed, ingest-ready offer row, prior to being appended to the
/// [`ColumnStore`]. String fields have already been run through the
/// [`super::string_pool::StringPool`] and arrive as dense ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfferRecord {
    pub hotel_id: u32,
    pub price: f32,
    pub adults: u8,
    pub children: u8,
    pub outbound_depart_ts: i64,
    pub outbound_arrive_ts: i64,
    pub inbound_depart_ts: i64,
    pub inbound_arrive_ts: i64,
    pub outbound_depart_airport: u32,
    pub inbound_depart_airport: u32,
    pub outbound_arrive_airport: u32,
    pub inbound_arrive_airport: u32,
    pub meal_type: u32,
    pub room_type: u32,
    pub ocean_view: bool,
}

/// Derives `duration_nights` the same way for ingest-time validation and for
/// runtime row access, so invariant (a) from the data model always holds.
pub fn duration_nights(outbound_depart_ts: i64, inbound_depart_ts: i64) -> i64 {
    (inbound_depart_ts - outbound_depart_ts).div_euclid(MS_PER_DAY)
}

/// Append-only columnar record of offers: one contiguous array per
/// attribute, all indexed by the same dense `row_id`. Narrow types are
/// chosen to fit each attribute's value domain; `ocean_view` is packed one
/// bit per row. Nothing here ever shrinks or mutates in place once a row has
/// been appended — the store only grows during ingest, then is frozen into
/// a [`super::Snapshot`].
#[derive(Debug, Default)]
pub struct ColumnStore {
    hotel_id: Vec<u32>,
    price: Vec<f32>,
    adults: Vec<u8>,
    children: Vec<u8>,
    outbound_depart_ts: Vec<i64>,
    outbound_arrive_ts: Vec<i64>,
    inbound_depart_ts: Vec<i64>,
    inbound_arrive_ts: Vec<i64>,
    outbound_depart_airport: Vec<u32>,
    inbound_depart_airport: Vec<u32>,
    outbound_arrive_airport: Vec<u32>,
    inbound_arrive_airport: Vec<u32>,
    meal_type: Vec<u32>,
    room_type: Vec<u32>,
    duration_nights: Vec<u8>,
    ocean_view: Vec<u64>,
}

impl ColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(rows: usize) -> Self {
        Self {
            hotel_id: Vec::with_capacity(rows),
            price: Vec::with_capacity(rows),
            adults: Vec::with_capacity(rows),
            children: Vec::with_capacity(rows),
            outbound_depart_ts: Vec::with_capacity(rows),
            outbound_arrive_ts: Vec::with_capacity(rows),
            inbound_depart_ts: Vec::with_capacity(rows),
            inbound_arrive_ts: Vec::with_capacity(rows),
            outbound_depart_airport: Vec::with_capacity(rows),
            inbound_depart_airport: Vec::with_capacity(rows),
            outbound_arrive_airport: Vec::with_capacity(rows),
            inbound_arrive_airport: Vec::with_capacity(rows),
            meal_type: Vec::with_capacity(rows),
            room_type: Vec::with_capacity(rows),
            duration_nights: Vec::with_capacity(rows),
            ocean_view: Vec::with_capacity(rows / 64 + 1),
        }
    }

    /// Appends one offer, recomputing `duration_nights` from the two
    /// departure timestamps regardless of whatever the source row claimed.
    /// Returns the assigned dense `row_id`.
    pub fn append(&mut self, offer: OfferRecord) -> u32 {
        let row_id = self.hotel_id.len() as u32;
        let nights = duration_nights(offer.outbound_depart_ts, offer.inbound_depart_ts)
            .clamp(0, u8::MAX as i64) as u8;

        self.hotel_id.push(offer.hotel_id);
        self.price.push(offer.price);
        self.adults.push(offer.adults);
        self.children.push(offer.children);
        self.outbound_depart_ts.push(offer.outbound_depart_ts);
        self.outbound_arrive_ts.push(offer.outbound_arrive_ts);
        self.inbound_depart_ts.push(offer.inbound_depart_ts);
        self.inbound_arrive_ts.push(offer.inbound_arrive_ts);
        self.outbound_depart_airport.push(offer.outbound_depart_airport);
        self.inbound_depart_airport.push(offer.inbound_depart_airport);
        self.outbound_arrive_airport.push(offer.outbound_arrive_airport);
        self.inbound_arrive_airport.push(offer.inbound_arrive_airport);
        self.meal_type.push(offer.meal_type);
        self.room_type.push(offer.room_type);
        self.duration_nights.push(nights);

        let word = row_id as usize / 64;
        if word >= self.ocean_view.len() {
            self.ocean_view.resize(word + 1, 0);
        }
        if offer.ocean_view {
            self.ocean_view[word] |= 1 << (row_id as usize % 64);
        }

        row_id
    }

    pub fn len(&self) -> u32 {
        self.hotel_id.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.hotel_id.is_empty()
    }

    pub fn iter_row_ids(&self) -> impl Iterator<Item = u32> {
        0..self.len()
    }

    #[inline]
    pub fn hotel_id_of(&self, row_id: u32) -> u32 {
        self.hotel_id[row_id as usize]
    }

    #[inline]
    pub fn price_of(&self, row_id: u32) -> f32 {
        self.price[row_id as usize]
    }

    #[inline]
    pub fn adults_of(&self, row_id: u32) -> u8 {
        self.adults[row_id as usize]
    }

    #[inline]
    pub fn children_of(&self, row_id: u32) -> u8 {
        self.children[row_id as usize]
    }

    #[inline]
    pub fn outbound_depart_ts_of(&self, row_id: u32) -> i64 {
        self.outbound_depart_ts[row_id as usize]
    }

    #[inline]
    pub fn outbound_arrive_ts_of(&self, row_id: u32) -> i64 {
        self.outbound_arrive_ts[row_id as usize]
    }

    #[inline]
    pub fn inbound_depart_ts_of(&self, row_id: u32) -> i64 {
        self.inbound_depart_ts[row_id as usize]
    }

    #[inline]
    pub fn inbound_arrive_ts_of(&self, row_id: u32) -> i64 {
        self.inbound_arrive_ts[row_id as usize]
    }

    #[inline]
    pub fn outbound_depart_airport_of(&self, row_id: u32) -> u32 {
        self.outbound_depart_airport[row_id as usize]
    }

    #[inline]
    pub fn inbound_depart_airport_of(&self, row_id: u32) -> u32 {
        self.inbound_depart_airport[row_id as usize]
    }

    #[inline]
    pub fn outbound_arrive_airport_of(&self, row_id: u32) -> u32 {
        self.outbound_arrive_airport[row_id as usize]
    }

    #[inline]
    pub fn inbound_arrive_airport_of(&self, row_id: u32) -> u32 {
        self.inbound_arrive_airport[row_id as usize]
    }

    #[inline]
    pub fn meal_type_of(&self, row_id: u32) -> u32 {
        self.meal_type[row_id as usize]
    }

    #[inline]
    pub fn room_type_of(&self, row_id: u32) -> u32 {
        self.room_type[row_id as usize]
    }

    #[inline]
    pub fn duration_nights_of(&self, row_id: u32) -> u8 {
        self.duration_nights[row_id as usize]
    }

    #[inline]
    pub fn ocean_view_of(&self, row_id: u32) -> bool {
        let word = row_id as usize / 64;
        let bit = row_id as usize % 64;
        self.ocean_view.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    /// Rough per-row memory footprint, for the `/api/v1/stats` diagnostic.
    /// Not exact (ignores `Vec` overhead) but close enough to compare against
    /// the ≤70 bytes/offer budget.
    pub fn memory_footprint_bytes(&self) -> u64 {
        let rows = self.len() as u64;
        // u32 + f32 + u8 + u8 + i64*4 + u32*6 + u8 + ~1 bit for ocean_view
        rows * (4 + 4 + 1 + 1 + 8 * 4 + 4 * 6 + 1) + self.ocean_view.len() as u64 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hotel_id: u32, price: f32, nights: i64) -> OfferRecord {
        let outbound = 1_717_200_000_000; // arbitrary ms timestamp
        OfferRecord {
            hotel_id,
            price,
            adults: 2,
            children: 0,
            outbound_depart_ts: outbound,
            outbound_arrive_ts: outbound + 2 * 3_600_000,
            inbound_depart_ts: outbound + nights * MS_PER_DAY,
            inbound_arrive_ts: outbound + nights * MS_PER_DAY + 2 * 3_600_000,
            outbound_depart_airport: 0,
            inbound_depart_airport: 0,
            outbound_arrive_airport: 1,
            inbound_arrive_airport: 1,
            meal_type: 0,
            room_type: 0,
            ocean_view: hotel_id % 2 == 0,
        }
    }

    #[test]
    fn append_assigns_dense_sequential_row_ids() {
        let mut store = ColumnStore::new();
        assert_eq!(store.append(sample(1, 100.0, 7)), 0);
        assert_eq!(store.append(sample(2, 200.0, 7)), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duration_nights_is_always_the_derived_value() {
        let mut store = ColumnStore::new();
        let row = store.append(sample(1, 100.0, 9));
        assert_eq!(store.duration_nights_of(row), 9);
    }

    #[test]
    fn ocean_view_bitset_roundtrips_across_word_boundaries() {
        let mut store = ColumnStore::new();
        for i in 0..130u32 {
            store.append(sample(i, 1.0, 1));
        }
        for i in 0..130u32 {
            assert_eq!(store.ocean_view_of(i), i % 2 == 0, "row {i}");
        }
    }
}
