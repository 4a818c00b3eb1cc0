use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};

use super::column_store::{duration_nights, ColumnStore};
use super::snapshot::Snapshot;

const MS_PER_DAY: i64 = 86_400_000;

/// The internal, already-validated search query both access paths plan
/// against. Airport codes are expected pre-normalized (uppercase, trimmed)
/// by the surface adapter; dates are unix-ms timestamps at UTC midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub departure_airports: Vec<String>,
    pub earliest_depart: i64,
    pub latest_return: i64,
    pub duration_nights: u16,
    pub adults: u8,
    pub children: u8,
}

/// Execution knobs a query runs under — distinct from [`Query`] itself so a
/// single `Query` can be replanned under different deadlines/caps without
/// reconstructing it (and so `Query::fingerprint` in [`crate::cache`] never
/// has to account for them).
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub deadline: Duration,
    pub max_results_best_per_hotel: usize,
    pub max_results_per_hotel: usize,
}

/// The single cheapest qualifying offer for one hotel, plus how many
/// qualifying offers that hotel had in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestPerHotelRow {
    pub hotel_id: u32,
    pub row_id: u32,
    pub price: f32,
    pub available_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestPerHotelOutcome {
    pub rows: Vec<BestPerHotelRow>,
    /// `true` if the deadline was hit before the full candidate set was
    /// scanned — the returned rows are still correctly ordered, just
    /// possibly incomplete.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotelDetailOutcome {
    pub hotel_id: u32,
    pub rows: Vec<u32>,
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotelNotFound;

/// Chooses an access path, intersects posting lists, applies the residual
/// predicate, and produces either the `best_per_hotel` aggregate or the
/// `hotel_detail` listing. Holds no state of its own — every call takes the
/// [`Snapshot`] it plans against explicitly.
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn find_best_per_hotel(
        snapshot: &Snapshot,
        query: &Query,
        limits: &QueryLimits,
    ) -> BestPerHotelOutcome {
        let airport_ids = resolve_airport_ids(snapshot, query);
        let airport_candidates: Vec<u32> = airport_ids
            .iter()
            .flat_map(|&id| snapshot.indexes.by_airport(id).iter().copied())
            .collect();
        let month_candidates =
            snapshot.indexes.by_month_range(query.earliest_depart, query.latest_return);
        let pax_candidates = snapshot.indexes.by_pax(query.adults, query.children).to_vec();

        let mut lists = [airport_candidates, month_candidates, pax_candidates];
        lists.sort_by_key(|l| l.len());
        let [driver, probe_a_list, probe_b_list] = lists;
        let probe_a: AHashSet<u32> = probe_a_list.into_iter().collect();
        let probe_b: AHashSet<u32> = probe_b_list.into_iter().collect();

        let deadline = Instant::now() + limits.deadline;
        let mut best: AHashMap<u32, (u32, f32)> = AHashMap::new();
        let mut counts: AHashMap<u32, u32> = AHashMap::new();
        let mut partial = false;

        for (i, &row) in driver.iter().enumerate() {
            if i % 4096 == 0 && Instant::now() >= deadline {
                partial = true;
                break;
            }
            if !probe_a.contains(&row) || !probe_b.contains(&row) {
                continue;
            }
            if !matches_predicate(&snapshot.columns, row, &airport_ids, query) {
                continue;
            }

            let hotel_id = snapshot.columns.hotel_id_of(row);
            let price = snapshot.columns.price_of(row);
            *counts.entry(hotel_id).or_insert(0) += 1;
            best.entry(hotel_id)
                .and_modify(|(cur_row, cur_price)| {
                    if price < *cur_price {
                        *cur_row = row;
                        *cur_price = price;
                    }
                })
                .or_insert((row, price));
        }

        let mut rows: Vec<BestPerHotelRow> = best
            .into_iter()
            .map(|(hotel_id, (row_id, price))| BestPerHotelRow {
                hotel_id,
                row_id,
                price,
                available_count: counts[&hotel_id],
            })
            .collect();
        rows.sort_by(|a, b| {
            a.price
                .partial_cmp(&b.price)
                .unwrap()
                .then(a.hotel_id.cmp(&b.hotel_id))
        });
        rows.truncate(limits.max_results_best_per_hotel);

        BestPerHotelOutcome { rows, partial }
    }

    pub fn find_hotel_detail(
        snapshot: &Snapshot,
        hotel_id: u32,
        query: &Query,
        limits: &QueryLimits,
    ) -> Result<HotelDetailOutcome, HotelNotFound> {
        let hotel_info = snapshot.hotels.resolve(hotel_id);
        if hotel_info.dense_index == u32::MAX {
            return Err(HotelNotFound);
        }

        let airport_ids = resolve_airport_ids(snapshot, query);
        let sorted_rows = snapshot.indexes.by_hotel(hotel_info.dense_index);
        let deadline = Instant::now() + limits.deadline;

        let mut rows = Vec::new();
        let mut partial = false;
        for (i, &row) in sorted_rows.iter().enumerate() {
            if rows.len() >= limits.max_results_per_hotel {
                break;
            }
            if i % 4096 == 0 && Instant::now() >= deadline {
                partial = true;
                break;
            }
            if matches_predicate(&snapshot.columns, row, &airport_ids, query) {
                rows.push(row);
            }
        }

        Ok(HotelDetailOutcome { hotel_id, rows, partial })
    }
}

fn resolve_airport_ids(snapshot: &Snapshot, query: &Query) -> AHashSet<u32> {
    query
        .departure_airports
        .iter()
        .filter_map(|code| snapshot.strings.lookup(code))
        .collect()
}

fn matches_predicate(
    columns: &ColumnStore,
    row: u32,
    airport_ids: &AHashSet<u32>,
    query: &Query,
) -> bool {
    airport_ids.contains(&columns.outbound_depart_airport_of(row))
        && columns.outbound_depart_ts_of(row) >= query.earliest_depart
        && columns.inbound_depart_ts_of(row) <= query.latest_return + MS_PER_DAY
        && duration_nights(columns.outbound_depart_ts_of(row), columns.inbound_depart_ts_of(row))
            == query.duration_nights as i64
        && columns.adults_of(row) == query.adults
        && columns.children_of(row) == query.children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::column_store::OfferRecord;
    use crate::engine::hotel_table::Hotel;
    use crate::engine::snapshot::Snapshot;
    use crate::engine::string_pool::StringPool;
    use crate::engine::hotel_table::HotelTable;
    use crate::engine::index::IndexSet;

    fn ymd_ms(y: i32, m: u32, d: u32) -> i64 {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn build_sample_snapshot() -> Snapshot {
        let mut strings = StringPool::new();
        let fra = strings.intern("FRA");
        let muc = strings.intern("MUC");
        strings.intern("All-Inclusive");
        strings.intern("Double");

        let mut hotels = HotelTable::new();
        hotels.insert_catalog_hotel(Hotel { id: 1, name: "Paradise".into(), stars: 4.0 });
        hotels.insert_catalog_hotel(Hotel { id: 2, name: "Beach".into(), stars: 3.5 });
        hotels.insert_catalog_hotel(Hotel { id: 3, name: "Luxury".into(), stars: 5.0 });

        let mut columns = ColumnStore::new();
        let offer = |hotel_id, price, depart: i64, nights: i64, airport, adults, children| OfferRecord {
            hotel_id,
            price,
            adults,
            children,
            outbound_depart_ts: depart,
            outbound_arrive_ts: depart + 7_200_000,
            inbound_depart_ts: depart + nights * 86_400_000,
            inbound_arrive_ts: depart + nights * 86_400_000 + 7_200_000,
            outbound_depart_airport: airport,
            inbound_depart_airport: airport,
            outbound_arrive_airport: airport,
            inbound_arrive_airport: airport,
            meal_type: 0,
            room_type: 1,
            ocean_view: false,
        };

        columns.append(offer(1, 1200.0, ymd_ms(2024, 6, 1), 7, fra, 2, 0));
        columns.append(offer(1, 900.0, ymd_ms(2024, 6, 2), 7, fra, 2, 0));
        columns.append(offer(2, 1500.0, ymd_ms(2024, 6, 10), 9, muc, 1, 1));
        columns.append(offer(3, 2000.0, ymd_ms(2024, 6, 15), 7, fra, 2, 0));

        let indexes = IndexSet::build(&columns, &hotels);
        Snapshot::from_parts(strings, columns, hotels, indexes)
    }

    fn default_limits() -> QueryLimits {
        QueryLimits {
            deadline: Duration::from_millis(5000),
            max_results_best_per_hotel: 100,
            max_results_per_hotel: 1000,
        }
    }

    #[test]
    fn scenario_1_best_per_hotel_orders_by_price_with_counts() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["FRA".into()],
            earliest_depart: ymd_ms(2024, 6, 1),
            latest_return: ymd_ms(2024, 6, 30),
            duration_nights: 7,
            adults: 2,
            children: 0,
        };
        let outcome = QueryPlanner::find_best_per_hotel(&snapshot, &query, &default_limits());
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].hotel_id, 1);
        assert_eq!(outcome.rows[0].price, 900.0);
        assert_eq!(outcome.rows[0].available_count, 2);
        assert_eq!(outcome.rows[1].hotel_id, 3);
        assert_eq!(outcome.rows[1].price, 2000.0);
        assert_eq!(outcome.rows[1].available_count, 1);
    }

    #[test]
    fn scenario_2_duration_mismatch_yields_no_results() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["MUC".into()],
            earliest_depart: ymd_ms(2024, 7, 1),
            latest_return: ymd_ms(2024, 7, 31),
            duration_nights: 7,
            adults: 1,
            children: 1,
        };
        let outcome = QueryPlanner::find_best_per_hotel(&snapshot, &query, &default_limits());
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn scenario_3_matching_duration_returns_single_hotel() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["MUC".into()],
            earliest_depart: ymd_ms(2024, 6, 1),
            latest_return: ymd_ms(2024, 6, 30),
            duration_nights: 9,
            adults: 1,
            children: 1,
        };
        let outcome = QueryPlanner::find_best_per_hotel(&snapshot, &query, &default_limits());
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].hotel_id, 2);
        assert_eq!(outcome.rows[0].price, 1500.0);
        assert_eq!(outcome.rows[0].available_count, 1);
    }

    #[test]
    fn scenario_4_hotel_detail_orders_all_matching_offers_by_price() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["FRA".into()],
            earliest_depart: ymd_ms(2024, 6, 1),
            latest_return: ymd_ms(2024, 6, 30),
            duration_nights: 7,
            adults: 2,
            children: 0,
        };
        let outcome = QueryPlanner::find_hotel_detail(&snapshot, 1, &query, &default_limits()).unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(snapshot.columns.price_of(outcome.rows[0]), 900.0);
        assert_eq!(snapshot.columns.price_of(outcome.rows[1]), 1200.0);
    }

    #[test]
    fn scenario_5_unknown_hotel_is_not_found() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["FRA".into()],
            earliest_depart: ymd_ms(2024, 6, 1),
            latest_return: ymd_ms(2024, 6, 30),
            duration_nights: 7,
            adults: 2,
            children: 0,
        };
        let result = QueryPlanner::find_hotel_detail(&snapshot, 999, &query, &default_limits());
        assert_eq!(result, Err(HotelNotFound));
    }

    #[test]
    fn best_per_hotel_never_returns_duplicate_hotel_ids() {
        let snapshot = build_sample_snapshot();
        let query = Query {
            departure_airports: vec!["FRA".into()],
            earliest_depart: ymd_ms(2024, 6, 1),
            latest_return: ymd_ms(2024, 6, 30),
            duration_nights: 7,
            adults: 2,
            children: 0,
        };
        let outcome = QueryPlanner::find_best_per_hotel(&snapshot, &query, &default_limits());
        let mut ids: Vec<u32> = outcome.rows.iter().map(|r| r.hotel_id).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
