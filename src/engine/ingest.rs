use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use memchr::memchr;
use rayon::prelude::*;
use thiserror::Error;

use super::column_store::{ColumnStore, OfferRecord};
use super::hotel_table::{Hotel, HotelTable};
use super::index::IndexSet;
use super::snapshot::{IngestStats, Snapshot};
use super::string_pool::StringPool;

/// Tunables for one ingest run. Mirrors the `ingest.*` section of the
/// running configuration. `max_offers`/`max_hotels` double as the
/// pre-allocation hint for the `ColumnStore`/`HotelTable` being built and as
/// the hard cap whose breach raises [`IngestError::OverCapacity`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub chunk_bytes: usize,
    pub workers: usize,
    pub skip_errors: bool,
    pub max_offers: u64,
    pub max_hotels: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 8 * 1024 * 1024,
            workers: num_cpus(),
            skip_errors: true,
            max_offers: 100_000_000,
            max_hotels: 500_000,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Named stages reported through [`IngestProgress`], in the order an ingest
/// run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    ParsingHotels,
    ParsingOffers,
    BuildingIndexes,
    Finalize,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::ParsingHotels => "parsing_hotels",
            IngestStage::ParsingOffers => "parsing_offers",
            IngestStage::BuildingIndexes => "building_indexes",
            IngestStage::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestProgress {
    pub stage: IngestStage,
    pub percentage: u8,
    pub message: String,
}

/// Callback invoked as ingest advances. Called from whichever thread is
/// driving the stage at the time (the calling thread for hotels parsing and
/// index building, a rayon worker thread for offer chunks), so implementers
/// must be `Sync`.
pub type ProgressCallback = dyn Fn(IngestProgress) + Send + Sync;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable { path: String, #[source] source: std::io::Error },
    #[error("hotels source contained zero rows")]
    ZeroHotels,
    #[error("row {row} failed validation and ingest.skipErrors is false: {reason}")]
    HardParseFailure { row: u64, reason: String },
    #[error("{actual} {resource} exceed the configured cap of {limit}")]
    OverCapacity { resource: &'static str, limit: u64, actual: u64 },
}

/// Streams the `;`-delimited hotel catalog, building a [`HotelTable`].
/// Returns [`IngestError::ZeroHotels`] if the source yields no rows — ingest
/// cannot proceed on an empty catalog even though offers may still reference
/// hotel ids that were never catalogued.
fn parse_hotels(
    path: &Path,
    config: &IngestConfig,
    on_progress: Option<&ProgressCallback>,
) -> Result<HotelTable, IngestError> {
    let file = File::open(path)
        .map_err(|source| IngestError::SourceUnavailable { path: path.display().to_string(), source })?;
    let reader = BufReader::with_capacity(config.chunk_bytes, file);
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut table = HotelTable::with_capacity(config.max_hotels.min(1_000_000) as usize);
    let mut row_count: u64 = 0;
    for (i, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(_) if !config.skip_errors => {
                return Err(IngestError::HardParseFailure { row: i as u64, reason: "malformed hotel row".into() })
            }
            Err(_) => continue,
        };
        let Some(hotel) = parse_hotel_row(&record) else {
            if !config.skip_errors {
                return Err(IngestError::HardParseFailure { row: i as u64, reason: "malformed hotel row".into() });
            }
            continue;
        };
        table.insert_catalog_hotel(hotel);
        row_count += 1;
        if row_count > config.max_hotels {
            return Err(IngestError::OverCapacity {
                resource: "catalog hotels",
                limit: config.max_hotels,
                actual: row_count,
            });
        }
        if row_count % 50_000 == 0 {
            report(on_progress, IngestStage::ParsingHotels, 0, format!("{row_count} hotels parsed"));
        }
    }

    if row_count == 0 {
        return Err(IngestError::ZeroHotels);
    }
    Ok(table)
}

fn parse_hotel_row(record: &csv::StringRecord) -> Option<Hotel> {
    let id: u32 = record.get(0)?.trim().parse().ok()?;
    let name = record.get(1)?.trim().to_string();
    let stars: f32 = record.get(2)?.trim().parse().ok()?;
    Some(Hotel { id, name, stars })
}

/// A single parsed, not-yet-interned offer row. Categorical fields stay as
/// owned strings so each rayon worker can parse its byte range without
/// touching a shared interner; the reducer interns them while merging shards
/// back into a single [`StringPool`] and [`ColumnStore`], sequentially, in
/// shard order, so row ids stay deterministic across runs of the same file.
struct RawOfferRow {
    hotel_id: u32,
    price: f32,
    adults: u8,
    children: u8,
    outbound_depart_ts: i64,
    outbound_arrive_ts: i64,
    inbound_depart_ts: i64,
    inbound_arrive_ts: i64,
    outbound_depart_airport: String,
    inbound_depart_airport: String,
    outbound_arrive_airport: String,
    inbound_arrive_airport: String,
    meal_type: String,
    room_type: String,
    ocean_view: bool,
}

struct ShardResult {
    rows: Vec<RawOfferRow>,
    dropped: u64,
}

/// Splits `data` (the offer file's body, header already stripped) into
/// `workers` byte ranges, each boundary pushed forward to the next newline so
/// no shard ever starts or ends mid-record.
fn shard_boundaries(data: &[u8], workers: usize) -> Vec<(usize, usize)> {
    if data.is_empty() || workers <= 1 {
        return vec![(0, data.len())];
    }
    let target = data.len() / workers;
    let mut bounds = Vec::with_capacity(workers);
    let mut start = 0usize;
    for _ in 0..workers - 1 {
        if start >= data.len() {
            break;
        }
        let probe = (start + target).min(data.len());
        let end = match memchr(b'\n', &data[probe..]) {
            Some(offset) => probe + offset + 1,
            None => data.len(),
        };
        bounds.push((start, end));
        start = end;
        if start >= data.len() {
            break;
        }
    }
    if start < data.len() {
        bounds.push((start, data.len()));
    }
    bounds
}

fn parse_offer_shard(bytes: &[u8], skip_errors: bool) -> Result<ShardResult, IngestError> {
    let mut csv_reader =
        csv::ReaderBuilder::new().delimiter(b',').has_headers(false).flexible(true).from_reader(bytes);
    let mut rows = Vec::new();
    let mut dropped = 0u64;
    for record in csv_reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(_) if skip_errors => {
                dropped += 1;
                continue;
            }
            Err(_) => return Err(IngestError::HardParseFailure { row: 0, reason: "malformed offer row".into() }),
        };
        match parse_offer_row(&record) {
            Some(row) => rows.push(row),
            None if skip_errors => dropped += 1,
            None => {
                return Err(IngestError::HardParseFailure {
                    row: 0,
                    reason: "offer row failed field validation".into(),
                })
            }
        }
    }
    Ok(ShardResult { rows, dropped })
}

/// Column order in the offers source:
/// `hotelid,departuredate,returndate,countadults,countchildren,price,
/// inbounddepartureairport,inboundarrivalairport,inboundarrivaldatetime,
/// outbounddepartureairport,outboundarrivalairport,outboundarrivaldatetime,
/// mealtype,oceanview,roomtype`.
fn parse_offer_row(record: &csv::StringRecord) -> Option<RawOfferRow> {
    let hotel_id: u32 = record.get(0)?.trim().parse().ok()?;
    let outbound_depart_ts = parse_flexible_timestamp(record.get(1)?.trim())?;
    let inbound_depart_ts = parse_flexible_timestamp(record.get(2)?.trim())?;
    let adults: u8 = record.get(3)?.trim().parse().ok()?;
    let children: u8 = record.get(4)?.trim().parse().ok()?;
    let price: f32 = record.get(5)?.trim().parse().ok()?;
    let inbound_depart_airport = record.get(6)?.trim().to_string();
    let inbound_arrive_airport = record.get(7)?.trim().to_string();
    let inbound_arrive_ts = match record.get(8).map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_flexible_timestamp(s)?,
        None => inbound_depart_ts + 2 * 3_600_000,
    };
    let outbound_depart_airport = record.get(9)?.trim().to_string();
    let outbound_arrive_airport = record.get(10)?.trim().to_string();
    let outbound_arrive_ts = match record.get(11).map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_flexible_timestamp(s)?,
        None => outbound_depart_ts + 2 * 3_600_000,
    };
    let meal_type = record.get(12)?.trim().to_string();
    let ocean_view = parse_flexible_bool(record.get(13).unwrap_or(""));
    let room_type = record.get(14)?.trim().to_string();

    if !price.is_finite() || price < 0.0 {
        return None;
    }
    if !(1..=10).contains(&adults) || children > 10 {
        return None;
    }

    Some(RawOfferRow {
        hotel_id,
        price,
        adults,
        children,
        outbound_depart_ts,
        outbound_arrive_ts,
        inbound_depart_ts,
        inbound_arrive_ts,
        outbound_depart_airport,
        inbound_depart_airport,
        outbound_arrive_airport,
        inbound_arrive_airport,
        meal_type,
        room_type,
        ocean_view,
    })
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, and
/// either datetime form with a trailing `±HH:MM` offset. Returns milliseconds
/// since the epoch, UTC.
pub fn parse_flexible_timestamp(s: &str) -> Option<i64> {
    use chrono::{NaiveDate, NaiveDateTime};

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%:z") {
        return Some(dt.timestamp_millis());
    }
    None
}

/// `true`/`1`/`yes`, case-insensitive; anything else is `false`.
pub fn parse_flexible_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn report(on_progress: Option<&ProgressCallback>, stage: IngestStage, percentage: u8, message: impl Into<String>) {
    if let Some(cb) = on_progress {
        cb(IngestProgress { stage, percentage, message: message.into() });
    }
}

/// Runs the full hotels + offers ingest, producing a ready-to-publish
/// [`Snapshot`]. Blocking and CPU-bound throughout (the offers pass parallel
/// over `config.workers` rayon threads) — callers on an async runtime should
/// drive this through `spawn_blocking`.
///
/// A missing source file, an empty hotel catalog, or (with
/// `ingest.skipErrors = false`) the first malformed row are fatal. An offers
/// source that parses to zero usable rows is not fatal: the returned
/// snapshot simply answers every query with no results, and the caller is
/// expected to log a warning from `stats.offers_ingested == 0`.
pub fn ingest(
    hotels_path: &Path,
    offers_path: &Path,
    config: &IngestConfig,
    on_progress: Option<&ProgressCallback>,
) -> Result<Snapshot, IngestError> {
    let started = Instant::now();

    report(on_progress, IngestStage::ParsingHotels, 0, "reading hotel catalog");
    let hotels = parse_hotels(hotels_path, config, on_progress)?;
    let hotels_ingested = hotels.known_len() as u64;
    report(on_progress, IngestStage::ParsingHotels, 100, format!("{hotels_ingested} hotels loaded"));

    report(on_progress, IngestStage::ParsingOffers, 0, "reading offers");
    let file = File::open(offers_path)
        .map_err(|source| IngestError::SourceUnavailable { path: offers_path.display().to_string(), source })?;
    let mmap = map_readonly(file, offers_path)?;
    let data: &[u8] = &mmap;

    let header_end = memchr(b'\n', data).map(|i| i + 1).unwrap_or(data.len());
    let body = &data[header_end..];
    let bounds = shard_boundaries(body, config.workers.max(1));

    let shard_results: Vec<Result<ShardResult, IngestError>> =
        bounds.par_iter().map(|&(start, end)| parse_offer_shard(&body[start..end], config.skip_errors)).collect();

    let mut hotels = hotels;
    let mut strings = StringPool::new();
    // Capped to a sane eager-allocation ceiling even when `max_offers` is set
    // to the full ~10^8-offer production target; the hard cap below is what
    // actually enforces `max_offers`, this is just the pre-sizing hint.
    let mut columns = ColumnStore::with_capacity(config.max_offers.min(16_000_000) as usize);
    let mut rows_dropped = 0u64;
    let mut offers_seen = 0u64;

    for shard in shard_results {
        let shard = shard?;
        rows_dropped += shard.dropped;
        for row in shard.rows {
            offers_seen += 1;
            if offers_seen > config.max_offers {
                return Err(IngestError::OverCapacity {
                    resource: "offers",
                    limit: config.max_offers,
                    actual: offers_seen,
                });
            }
            hotels.ensure_dense_index(row.hotel_id);
            let record = OfferRecord {
                hotel_id: row.hotel_id,
                price: row.price,
                adults: row.adults,
                children: row.children,
                outbound_depart_ts: row.outbound_depart_ts,
                outbound_arrive_ts: row.outbound_arrive_ts,
                inbound_depart_ts: row.inbound_depart_ts,
                inbound_arrive_ts: row.inbound_arrive_ts,
                outbound_depart_airport: strings.intern(&row.outbound_depart_airport),
                inbound_depart_airport: strings.intern(&row.inbound_depart_airport),
                outbound_arrive_airport: strings.intern(&row.outbound_arrive_airport),
                inbound_arrive_airport: strings.intern(&row.inbound_arrive_airport),
                meal_type: strings.intern(&row.meal_type),
                room_type: strings.intern(&row.room_type),
                ocean_view: row.ocean_view,
            };
            columns.append(record);
            if offers_seen % 500_000 == 0 {
                report(on_progress, IngestStage::ParsingOffers, 0, format!("{offers_seen} offers merged"));
            }
        }
    }
    report(on_progress, IngestStage::ParsingOffers, 100, format!("{offers_seen} offers merged"));

    report(on_progress, IngestStage::BuildingIndexes, 0, "building secondary indexes");
    let indexes = IndexSet::build(&columns, &hotels);
    report(on_progress, IngestStage::BuildingIndexes, 100, "indexes built");

    report(on_progress, IngestStage::Finalize, 0, "publishing snapshot");
    let stats = IngestStats {
        hotels_ingested,
        offers_ingested: offers_seen,
        rows_dropped,
        build_duration: started.elapsed(),
    };
    report(on_progress, IngestStage::Finalize, 100, "snapshot ready");

    Ok(Snapshot::from_parts(strings, columns, hotels, indexes).with_stats(stats))
}

fn map_readonly(file: File, path: &Path) -> Result<memmap2::Mmap, IngestError> {
    // SAFETY: the offers source is treated as read-only input for the
    // lifetime of this ingest run; nothing else in this process writes to it.
    unsafe { memmap2::Mmap::map(&file) }
        .map_err(|source| IngestError::SourceUnavailable { path: path.display().to_string(), source })
}

/// Reads a whole small file into memory. Used only by tests, which write
/// fixtures smaller than any sane `chunk_bytes`.
#[cfg(test)]
fn read_to_string(path: &Path) -> String {
    let mut s = String::new();
    File::open(path).unwrap().read_to_string(&mut s).unwrap();
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_all_four_timestamp_formats() {
        assert!(parse_flexible_timestamp("2024-06-01").is_some());
        assert!(parse_flexible_timestamp("2024-06-01 10:30:00").is_some());
        assert!(parse_flexible_timestamp("2024-06-01T10:30:00").is_some());
        assert!(parse_flexible_timestamp("2024-06-01T10:30:00+02:00").is_some());
        assert!(parse_flexible_timestamp("not-a-date").is_none());
    }

    #[test]
    fn offset_timestamps_normalize_to_the_same_instant_as_utc_equivalent() {
        let utc = parse_flexible_timestamp("2024-06-01T08:30:00").unwrap();
        let plus_two = parse_flexible_timestamp("2024-06-01T10:30:00+02:00").unwrap();
        assert_eq!(utc, plus_two);
    }

    #[test]
    fn boolean_parsing_accepts_the_documented_truthy_spellings() {
        assert!(parse_flexible_bool("true"));
        assert!(parse_flexible_bool("TRUE"));
        assert!(parse_flexible_bool("1"));
        assert!(parse_flexible_bool("yes"));
        assert!(!parse_flexible_bool("0"));
        assert!(!parse_flexible_bool("no"));
        assert!(!parse_flexible_bool(""));
    }

    #[test]
    fn shard_boundaries_never_split_a_record() {
        let data = b"abc\ndefg\nhi\njklmno\n".to_vec();
        let bounds = shard_boundaries(&data, 3);
        let mut seen = Vec::new();
        for (start, end) in &bounds {
            seen.extend_from_slice(&data[*start..*end]);
        }
        assert_eq!(seen, data);
        for (_, end) in &bounds {
            assert!(*end == data.len() || data[*end - 1] == b'\n');
        }
    }

    #[test]
    fn missing_arrival_timestamps_synthesize_as_two_hours_after_departure() {
        let record = csv::StringRecord::from(vec![
            "1",
            "2024-06-01",
            "2024-06-08",
            "2",
            "0",
            "199.99",
            "FRA",
            "PMI",
            "",
            "FRA",
            "PMI",
            "",
            "HB",
            "true",
            "DBL",
        ]);
        let row = parse_offer_row(&record).unwrap();
        assert_eq!(row.outbound_arrive_ts, row.outbound_depart_ts + 2 * 3_600_000);
        assert_eq!(row.inbound_arrive_ts, row.inbound_depart_ts + 2 * 3_600_000);
    }

    #[test]
    fn negative_price_rows_are_rejected() {
        let record = csv::StringRecord::from(vec![
            "1",
            "2024-06-01",
            "2024-06-08",
            "2",
            "0",
            "-5.0",
            "FRA",
            "PMI",
            "2024-06-01T12:00:00",
            "FRA",
            "PMI",
            "2024-06-01T10:00:00",
            "HB",
            "false",
            "DBL",
        ]);
        assert!(parse_offer_row(&record).is_none());
    }

    #[test]
    fn end_to_end_ingest_over_small_fixture_files_builds_a_queryable_snapshot() {
        static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
        let unique = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("farecore-ingest-test-{}-{unique}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let hotels_path = write_fixture(
            &dir,
            "hotels.csv",
            "hotelid;hotelname;hotelstars\n1;Seaside Resort;4.5\n2;Old Town Inn;3.0\n",
        );
        let offers_path = write_fixture(
            &dir,
            "offers.csv",
            "hotelid,departuredate,returndate,countadults,countchildren,price,inbounddepartureairport,inboundarrivalairport,inboundarrivaldatetime,outbounddepartureairport,outboundarrivalairport,outboundarrivaldatetime,mealtype,oceanview,roomtype\n\
             1,2024-06-01,2024-06-08,2,0,899.00,PMI,FRA,2024-06-08T12:00:00,FRA,PMI,2024-06-01T10:00:00,HB,true,DBL\n\
             2,2024-07-01,2024-07-05,2,1,450.50,FRA,OPO,,OPO,FRA,,BB,false,TWN\n",
        );

        let config = IngestConfig {
            chunk_bytes: 4096,
            workers: 2,
            skip_errors: false,
            max_offers: 100,
            max_hotels: 100,
        };
        let snapshot = ingest(&hotels_path, &offers_path, &config, None).unwrap();

        assert_eq!(snapshot.stats.hotels_ingested, 2);
        assert_eq!(snapshot.stats.offers_ingested, 2);
        assert_eq!(snapshot.stats.rows_dropped, 0);
        assert_eq!(snapshot.columns.len(), 2);

        let _ = read_to_string(&hotels_path);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn ingest_over_a_configured_max_offers_cap_fails_with_over_capacity() {
        static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
        let unique = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("farecore-ingest-cap-test-{}-{unique}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let hotels_path =
            write_fixture(&dir, "hotels.csv", "hotelid;hotelname;hotelstars\n1;Seaside Resort;4.5\n");
        let offers_path = write_fixture(
            &dir,
            "offers.csv",
            "hotelid,departuredate,returndate,countadults,countchildren,price,inbounddepartureairport,inboundarrivalairport,inboundarrivaldatetime,outbounddepartureairport,outboundarrivalairport,outboundarrivaldatetime,mealtype,oceanview,roomtype\n\
             1,2024-06-01,2024-06-08,2,0,899.00,PMI,FRA,2024-06-08T12:00:00,FRA,PMI,2024-06-01T10:00:00,HB,true,DBL\n\
             1,2024-07-01,2024-07-05,2,1,450.50,FRA,OPO,,OPO,FRA,,BB,false,TWN\n",
        );

        let config = IngestConfig {
            chunk_bytes: 4096,
            workers: 1,
            skip_errors: false,
            max_offers: 1,
            max_hotels: 100,
        };
        let err = ingest(&hotels_path, &offers_path, &config, None).unwrap_err();
        assert!(matches!(err, IngestError::OverCapacity { resource: "offers", limit: 1, actual: 2 }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
