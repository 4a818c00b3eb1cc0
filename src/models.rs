use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{BestPerHotelRow, HotelDetailOutcome, HotelInfo, Query, Snapshot};
use crate::error::AppError;

/// Raw `GET /api/v1/search` / `GET /api/v1/hotels/{hotelId}` query
/// parameters, exactly as the surface-adapter contract names them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub departure_airports: String,
    pub earliest_departure_date: String,
    pub latest_return_date: String,
    pub duration: u16,
    pub count_adults: u8,
    pub count_children: u8,
}

impl SearchParams {
    /// Validates and translates these parameters into an internal [`Query`].
    /// Every failing field is collected rather than returned on the first
    /// miss, so a caller that gets several fields wrong at once sees all of
    /// them in a single round trip.
    pub fn into_query(self) -> Result<Query, AppError> {
        let mut fields: Vec<String> = Vec::new();
        let mut messages: Vec<String> = Vec::new();
        let mut fail = |field: &str, message: &str| {
            fields.push(field.to_string());
            messages.push(message.to_string());
        };

        let departure_airports: Vec<String> = self
            .departure_airports
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if departure_airports.is_empty() {
            fail("departureAirports", "departureAirports must be non-empty");
        } else if departure_airports.iter().any(|code| code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic())) {
            fail("departureAirports", "departureAirports must be 3-letter codes");
        }

        let earliest_depart = parse_date_midnight_utc(&self.earliest_departure_date);
        if earliest_depart.is_none() {
            fail("earliestDepartureDate", "earliestDepartureDate must be YYYY-MM-DD");
        }
        let latest_return = parse_date_midnight_utc(&self.latest_return_date);
        if latest_return.is_none() {
            fail("latestReturnDate", "latestReturnDate must be YYYY-MM-DD");
        }
        if let (Some(earliest), Some(latest)) = (earliest_depart, latest_return) {
            if earliest >= latest {
                fail("earliestDepartureDate", "earliestDepartureDate must be strictly before latestReturnDate");
            }
        }

        if !(1..=365).contains(&self.duration) {
            fail("duration", "duration must be between 1 and 365");
        }
        if !(1..=10).contains(&self.count_adults) {
            fail("countAdults", "countAdults must be between 1 and 10");
        }
        if self.count_children > 10 {
            fail("countChildren", "countChildren must be between 0 and 10");
        }

        if !fields.is_empty() {
            return Err(AppError::Validation { message: messages.join("; "), fields });
        }

        Ok(Query {
            departure_airports,
            earliest_depart: earliest_depart.expect("validated above"),
            latest_return: latest_return.expect("validated above"),
            duration_nights: self.duration,
            adults: self.count_adults,
            children: self.count_children,
        })
    }
}

fn parse_date_midnight_utc(s: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp_millis())
}

fn format_date(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct HotelSummary {
    pub id: u32,
    pub name: String,
    pub stars: f32,
}

impl From<&HotelInfo> for HotelSummary {
    fn from(info: &HotelInfo) -> Self {
        Self { id: info.id, name: info.name.clone(), stars: info.stars }
    }
}

/// One entry of the `best_per_hotel` response array.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestPerHotelEntry {
    pub hotel: HotelSummary,
    pub min_price: f32,
    pub departure_date: String,
    pub return_date: String,
    pub room_type: String,
    pub meal_type: String,
    pub count_adults: u8,
    pub count_children: u8,
    pub duration: u16,
    pub count_available_offers: u32,
}

pub fn render_best_per_hotel(snapshot: &Snapshot, query: &Query, rows: &[BestPerHotelRow]) -> Vec<BestPerHotelEntry> {
    rows.iter()
        .map(|row| {
            let hotel = snapshot.hotels.resolve(row.hotel_id);
            let departure_date = format_date(snapshot.columns.outbound_depart_ts_of(row.row_id));
            let return_date = format_date(snapshot.columns.inbound_depart_ts_of(row.row_id));
            let room_type = snapshot.strings.resolve(snapshot.columns.room_type_of(row.row_id)).to_string();
            let meal_type = snapshot.strings.resolve(snapshot.columns.meal_type_of(row.row_id)).to_string();
            BestPerHotelEntry {
                hotel: HotelSummary::from(&hotel),
                min_price: row.price,
                departure_date,
                return_date,
                room_type,
                meal_type,
                count_adults: query.adults,
                count_children: query.children,
                duration: query.duration_nights,
                count_available_offers: row.available_count,
            }
        })
        .collect()
}

/// One offer line in a `hotel_detail` response. The outbound-departure field
/// keeps the historical `outbundDepartureDatetime` spelling for API
/// compatibility with clients written against the original surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelDetailItem {
    pub outbound_depart_airport: String,
    pub outbound_arrive_airport: String,
    #[serde(rename = "outbundDepartureDatetime")]
    pub outbound_departure_datetime: String,
    pub outbound_arrival_datetime: String,
    pub inbound_depart_airport: String,
    pub inbound_arrive_airport: String,
    pub inbound_departure_datetime: String,
    pub inbound_arrival_datetime: String,
    pub room_type: String,
    pub meal_type: String,
    pub ocean_view: bool,
    pub price: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelDetailResponse {
    pub hotel: HotelSummary,
    pub items: Vec<HotelDetailItem>,
    pub partial: bool,
}

fn format_iso8601(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms).map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

pub fn render_hotel_detail(snapshot: &Snapshot, outcome: &HotelDetailOutcome) -> HotelDetailResponse {
    let hotel_info = snapshot.hotels.resolve(outcome.hotel_id);
    let items = outcome
        .rows
        .iter()
        .map(|&row_id| HotelDetailItem {
            outbound_depart_airport: snapshot
                .strings
                .resolve(snapshot.columns.outbound_depart_airport_of(row_id))
                .to_string(),
            outbound_arrive_airport: snapshot
                .strings
                .resolve(snapshot.columns.outbound_arrive_airport_of(row_id))
                .to_string(),
            outbound_departure_datetime: format_iso8601(snapshot.columns.outbound_depart_ts_of(row_id)),
            outbound_arrival_datetime: format_iso8601(snapshot.columns.outbound_arrive_ts_of(row_id)),
            inbound_depart_airport: snapshot
                .strings
                .resolve(snapshot.columns.inbound_depart_airport_of(row_id))
                .to_string(),
            inbound_arrive_airport: snapshot
                .strings
                .resolve(snapshot.columns.inbound_arrive_airport_of(row_id))
                .to_string(),
            inbound_departure_datetime: format_iso8601(snapshot.columns.inbound_depart_ts_of(row_id)),
            inbound_arrival_datetime: format_iso8601(snapshot.columns.inbound_arrive_ts_of(row_id)),
            room_type: snapshot.strings.resolve(snapshot.columns.room_type_of(row_id)).to_string(),
            meal_type: snapshot.strings.resolve(snapshot.columns.meal_type_of(row_id)).to_string(),
            ocean_view: snapshot.columns.ocean_view_of(row_id),
            price: snapshot.columns.price_of(row_id),
        })
        .collect();

    HotelDetailResponse { hotel: HotelSummary::from(&hotel_info), items, partial: outcome.partial }
}

/// `/api/v1/stats` response — passive performance and memory counters, never
/// a self-tuning knob.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub hotels_ingested: u64,
    pub offers_ingested: u64,
    pub rows_dropped: u64,
    pub distinct_hotels_indexed: usize,
    pub memory_footprint_bytes: u64,
    pub string_pool_size: usize,
    pub cache_entries: usize,
    pub last_build_duration_ms: u128,
    pub query_count: u64,
    pub cache_hit_rate: f64,
    pub average_query_latency_micros: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatusResponse {
    pub stage: &'static str,
    pub percentage: u8,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_three_letter_airport_codes() {
        let params = SearchParams {
            departure_airports: "FRANKFURT".into(),
            earliest_departure_date: "2024-06-01".into(),
            latest_return_date: "2024-06-10".into(),
            duration: 7,
            count_adults: 2,
            count_children: 0,
        };
        assert!(params.into_query().is_err());
    }

    #[test]
    fn rejects_reversed_date_range() {
        let params = SearchParams {
            departure_airports: "FRA".into(),
            earliest_departure_date: "2024-06-10".into(),
            latest_return_date: "2024-06-01".into(),
            duration: 7,
            count_adults: 2,
            count_children: 0,
        };
        assert!(params.into_query().is_err());
    }

    #[test]
    fn valid_params_normalize_airport_codes_to_uppercase() {
        let params = SearchParams {
            departure_airports: " fra, muc ".into(),
            earliest_departure_date: "2024-06-01".into(),
            latest_return_date: "2024-06-10".into(),
            duration: 7,
            count_adults: 2,
            count_children: 0,
        };
        let query = params.into_query().unwrap();
        assert_eq!(query.departure_airports, vec!["FRA".to_string(), "MUC".to_string()]);
    }

    #[test]
    fn rejects_duration_out_of_range() {
        let params = SearchParams {
            departure_airports: "FRA".into(),
            earliest_departure_date: "2024-06-01".into(),
            latest_return_date: "2024-06-10".into(),
            duration: 0,
            count_adults: 2,
            count_children: 0,
        };
        assert!(params.into_query().is_err());
    }
}
