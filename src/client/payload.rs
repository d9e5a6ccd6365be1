//! Request payload construction and response parsing.
//!
//! The upstream exposes a GraphQL-flavoured HTTP surface: every operation is
//! a POST with a persisted-query envelope, and responses nest the useful data
//! several layers deep. Builders here produce the request bodies and the
//! `parse_*` functions pull typed values back out, reporting
//! [`ApiError::Schema`] when the expected structure is missing.

use crate::client::{
    Amenity, ApiError, ApiResult, CalendarDay, Description, Review, ReviewPage, SearchPage,
    SEARCH_PAGE_SIZE,
};
use crate::periods::StayWindow;
use crate::{BoundingBox, Listing};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{json, Value};

/// Map-search operation path.
pub const SEARCH_ENDPOINT: &str = "/api/v3/StaysSearch";

/// Availability-calendar operation path.
pub const CALENDAR_ENDPOINT: &str = "/api/v3/PdpAvailabilityCalendar";

/// Reviews operation path.
pub const REVIEWS_ENDPOINT: &str = "/api/v3/StaysPdpReviewsQuery";

/// Listing-detail sections operation path (description, amenities).
pub const PDP_SECTIONS_ENDPOINT: &str = "/api/v3/StaysPdpSections";

/// Browser user-agent strings rotated per request.
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// Walk a nested JSON value along a path of object keys.
pub fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn dig_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    dig(value, path).and_then(Value::as_str)
}

/// Opaque pagination cursor: base64 of a fixed JSON envelope carrying the
/// item offset.
fn page_cursor(offset: u32) -> String {
    let envelope = json!({
        "section_offset": 0,
        "items_offset": offset,
        "version": 1,
    });
    BASE64.encode(envelope.to_string())
}

/// Decode an opaque listing identifier to its numeric form.
///
/// Identifiers arrive base64-encoded with a type prefix such as
/// `DemandStayListing:12345` or `StayListing:12345`.
pub fn decode_listing_id(raw: &str) -> ApiResult<String> {
    let bytes = BASE64
        .decode(raw)
        .map_err(|e| ApiError::Schema(format!("undecodable listing id: {e}")))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| ApiError::Schema("listing id is not UTF-8".to_string()))?;

    let id = decoded
        .rsplit_once(':')
        .map(|(_, id)| id)
        .unwrap_or(&decoded);
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::Schema(format!("malformed listing id: {decoded}")));
    }
    Ok(id.to_string())
}

/// Encode a numeric listing identifier into the opaque form detail
/// operations expect.
pub fn encode_listing_id(id: &str) -> String {
    BASE64.encode(format!("StayListing:{id}"))
}

/// Parse the leading integer out of a display string like "1,024 homes".
fn leading_count(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Build the map-search request body for one page of results.
pub fn search_payload(
    area: &BoundingBox,
    zoom: u8,
    offset: u32,
    stay: Option<(&StayWindow, u8)>,
    currency: &str,
) -> Value {
    let mut raw_params = vec![
        json!({"filterName": "neLat", "filterValues": [area.ne_lat.to_string()]}),
        json!({"filterName": "neLng", "filterValues": [area.ne_lng.to_string()]}),
        json!({"filterName": "swLat", "filterValues": [area.sw_lat.to_string()]}),
        json!({"filterName": "swLng", "filterValues": [area.sw_lng.to_string()]}),
        json!({"filterName": "zoomLevel", "filterValues": [zoom.to_string()]}),
        json!({"filterName": "searchByMap", "filterValues": ["true"]}),
        json!({"filterName": "itemsPerGrid", "filterValues": [SEARCH_PAGE_SIZE.to_string()]}),
        json!({"filterName": "displayCurrency", "filterValues": [currency]}),
    ];
    if let Some((window, guests)) = stay {
        raw_params.push(json!({
            "filterName": "checkin",
            "filterValues": [window.check_in.to_string()],
        }));
        raw_params.push(json!({
            "filterName": "checkout",
            "filterValues": [window.check_out.to_string()],
        }));
        raw_params.push(json!({
            "filterName": "adults",
            "filterValues": [guests.to_string()],
        }));
    }

    json!({
        "operationName": "StaysSearch",
        "variables": {
            "staysSearchRequest": {
                "cursor": page_cursor(offset),
                "requestedPageType": "STAYS_SEARCH",
                "metadataOnly": false,
                "searchType": "user_map_move",
                "rawParams": raw_params,
            },
        },
    })
}

/// Build the availability-calendar request body: twelve months starting from
/// the given date's month.
pub fn calendar_payload(listing_id: &str, from: NaiveDate) -> Value {
    json!({
        "operationName": "PdpAvailabilityCalendar",
        "variables": {
            "request": {
                "listingId": listing_id,
                "month": from.month(),
                "year": from.year(),
                "count": 12,
            },
        },
    })
}

/// Build the reviews request body for one page.
pub fn reviews_payload(listing_id: &str, offset: u32) -> Value {
    json!({
        "operationName": "StaysPdpReviewsQuery",
        "variables": {
            "id": encode_listing_id(listing_id),
            "pdpReviewsRequest": {
                "fieldSelector": "for_p3_translation_only",
                "limit": super::REVIEW_PAGE_SIZE,
                "offset": offset.to_string(),
                "sortingPreference": "MOST_RECENT",
            },
        },
    })
}

/// Build the listing-detail sections request body used for descriptions and
/// amenities.
pub fn pdp_sections_payload(listing_id: &str, translate: bool) -> Value {
    json!({
        "operationName": "StaysPdpSections",
        "variables": {
            "id": encode_listing_id(listing_id),
            "pdpSectionsRequest": {
                "layouts": ["SIDEBAR", "SINGLE_COLUMN"],
                "translateUgc": translate,
            },
        },
    })
}

fn listing_from_result(item: &Value) -> ApiResult<Option<Listing>> {
    // Multi-listing bundles carry no single coordinate and are skipped
    if item.get("splitStaysListings").is_some() {
        return Ok(None);
    }
    let listing = dig(item, &["listing"])
        .ok_or_else(|| ApiError::Schema("search result without listing".to_string()))?;

    let raw_id = dig_str(listing, &["id"])
        .ok_or_else(|| ApiError::Schema("listing without id".to_string()))?;
    let id = decode_listing_id(raw_id)?;

    let lat = dig(listing, &["coordinate", "latitude"])
        .and_then(Value::as_f64)
        .ok_or_else(|| ApiError::Schema("listing without latitude".to_string()))?;
    let lng = dig(listing, &["coordinate", "longitude"])
        .and_then(Value::as_f64)
        .ok_or_else(|| ApiError::Schema("listing without longitude".to_string()))?;

    let rating_line = dig_str(listing, &["avgRatingLocalized"]);
    let (avg_rating, review_count) = match rating_line {
        // Formatted as "4.85 (123)"
        Some(line) => {
            let mut parts = line.split_whitespace();
            let rating = parts.next().and_then(|r| r.parse().ok());
            let count = parts
                .next()
                .map(|c| c.trim_matches(|ch| ch == '(' || ch == ')'))
                .and_then(|c| c.parse().ok());
            (rating, count)
        }
        None => (None, None),
    };

    let parsed = Listing {
        id,
        lat,
        lng,
        title: dig_str(listing, &["title"]).map(str::to_string),
        room_type: dig_str(listing, &["roomTypeCategory"]).map(str::to_string),
        person_capacity: dig(listing, &["personCapacity"])
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        bedrooms: dig(listing, &["bedrooms"])
            .and_then(Value::as_u64)
            .map(|n| n as u32),
        host_name: dig_str(listing, &["primaryHostPassport", "name"]).map(str::to_string),
        review_count,
        avg_rating,
    };
    parsed.validate().map_err(ApiError::Schema)?;
    Ok(Some(parsed))
}

/// Parse one page of map-search results.
pub fn parse_search_page(body: &Value) -> ApiResult<SearchPage> {
    let results = dig(
        body,
        &["data", "presentation", "staysSearch", "results"],
    )
    .ok_or_else(|| ApiError::Schema("missing search results".to_string()))?;

    let total_count = dig_str(results, &["paginationInfo", "totalCountDisplay"])
        .and_then(leading_count)
        .or_else(|| {
            dig(results, &["paginationInfo", "totalCount"])
                .and_then(Value::as_u64)
                .map(|n| n as u32)
        })
        .ok_or_else(|| ApiError::Schema("missing result count".to_string()))?;

    let items = dig(results, &["searchResults"])
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Schema("missing search result items".to_string()))?;

    let mut listings = Vec::with_capacity(items.len());
    for item in items {
        if let Some(listing) = listing_from_result(item)? {
            listings.push(listing);
        }
    }
    Ok(SearchPage {
        total_count,
        listings,
    })
}

/// Parse the calendar response, keeping only days within a forward window of
/// 365 days from `today`.
pub fn parse_calendar(body: &Value, today: NaiveDate) -> ApiResult<Vec<CalendarDay>> {
    let months = dig(
        body,
        &["data", "merlin", "pdpAvailabilityCalendar", "calendarMonths"],
    )
    .and_then(Value::as_array)
    .ok_or_else(|| ApiError::Schema("missing calendar months".to_string()))?;

    let horizon = today + Duration::days(365);
    let mut days = Vec::new();
    for month in months {
        let month_days = dig(month, &["days"])
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Schema("calendar month without days".to_string()))?;
        for day in month_days {
            let date = dig_str(day, &["calendarDate"])
                .and_then(|d| d.parse().ok())
                .ok_or_else(|| ApiError::Schema("calendar day without date".to_string()))?;
            if date < today || date >= horizon {
                continue;
            }
            days.push(CalendarDay {
                date,
                available: dig(day, &["available"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                min_nights: dig(day, &["minNights"])
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
                max_nights: dig(day, &["maxNights"])
                    .and_then(Value::as_u64)
                    .map(|n| n as u32),
                available_for_checkin: dig(day, &["availableForCheckin"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                bookable: dig(day, &["bookable"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            });
        }
    }
    days.sort_by_key(|d| d.date);
    Ok(days)
}

/// Parse one page of reviews.
pub fn parse_reviews(body: &Value) -> ApiResult<ReviewPage> {
    let section = dig(body, &["data", "merlin", "pdpReviews"])
        .ok_or_else(|| ApiError::Schema("missing reviews section".to_string()))?;

    let total_count = dig(section, &["metadata", "reviewsCount"])
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .ok_or_else(|| ApiError::Schema("missing review count".to_string()))?;

    let items = dig(section, &["reviews"])
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Schema("missing review items".to_string()))?;

    let mut reviews = Vec::with_capacity(items.len());
    for item in items {
        let id = dig_str(item, &["id"])
            .ok_or_else(|| ApiError::Schema("review without id".to_string()))?
            .to_string();
        reviews.push(Review {
            id,
            date: dig_str(item, &["createdAt"])
                .and_then(|raw| raw.get(..10))
                .and_then(|d| d.parse().ok()),
            rating: dig(item, &["rating"])
                .and_then(Value::as_u64)
                .map(|n| n as u8),
            comments: dig_str(item, &["comments"]).unwrap_or_default().to_string(),
        });
    }
    Ok(ReviewPage {
        total_count,
        reviews,
    })
}

/// Parse a formatted money string like "€1,234" or "$89.50" to its amount.
fn money_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}

/// Pull the quoted stay price for one listing out of a dated search page.
///
/// `Ok(None)` means the listing was absent from the results, which the
/// upstream uses to signal the window is not bookable.
pub fn parse_price_quote(body: &Value, listing_id: &str) -> ApiResult<Option<f64>> {
    let items = dig(
        body,
        &["data", "presentation", "staysSearch", "results", "searchResults"],
    )
    .and_then(Value::as_array)
    .ok_or_else(|| ApiError::Schema("missing search result items".to_string()))?;

    for item in items {
        if item.get("splitStaysListings").is_some() {
            continue;
        }
        let raw_id = dig_str(item, &["listing", "id"])
            .ok_or_else(|| ApiError::Schema("listing without id".to_string()))?;
        if decode_listing_id(raw_id)? != listing_id {
            continue;
        }

        let price_line = dig(item, &["pricingQuote", "structuredStayDisplayPrice", "primaryLine"])
            .ok_or_else(|| ApiError::Schema("quoted listing without price line".to_string()))?;
        // Discounted quotes put the payable amount in a separate field
        let display = dig_str(price_line, &["discountedPrice"])
            .or_else(|| dig_str(price_line, &["price"]))
            .ok_or_else(|| ApiError::Schema("price line without amount".to_string()))?;
        let amount = money_amount(display)
            .ok_or_else(|| ApiError::Schema(format!("unparseable price: {display}")))?;
        return Ok(Some(amount));
    }
    Ok(None)
}

fn sections(body: &Value) -> ApiResult<&Vec<Value>> {
    dig(
        body,
        &["data", "merlin", "pdpSections", "sections", "sections"],
    )
    .and_then(Value::as_array)
    .ok_or_else(|| ApiError::Schema("missing detail sections".to_string()))
}

/// Parse the description document out of a listing-detail response.
pub fn parse_description(body: &Value, listing_id: &str) -> ApiResult<Description> {
    let description_section = sections(body)?
        .iter()
        .find(|s| dig_str(s, &["sectionId"]) == Some("DESCRIPTION_DEFAULT"))
        .ok_or_else(|| ApiError::Schema("missing description section".to_string()))?;

    let text = dig_str(
        description_section,
        &["section", "htmlDescription", "htmlText"],
    )
    .ok_or_else(|| ApiError::Schema("description without text".to_string()))?;

    Ok(Description {
        listing_id: listing_id.to_string(),
        text: text.to_string(),
        language: dig_str(description_section, &["section", "descriptionLanguage"])
            .map(str::to_string),
    })
}

/// Parse the amenity inventory out of a listing-detail response.
pub fn parse_amenities(body: &Value) -> ApiResult<Vec<Amenity>> {
    let amenities_section = sections(body)?
        .iter()
        .find(|s| dig_str(s, &["sectionId"]) == Some("AMENITIES_DEFAULT"))
        .ok_or_else(|| ApiError::Schema("missing amenities section".to_string()))?;

    let groups = dig(amenities_section, &["section", "seeAllAmenitiesGroups"])
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Schema("missing amenity groups".to_string()))?;

    let mut amenities = Vec::new();
    for group in groups {
        let items = dig(group, &["amenities"])
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Schema("amenity group without items".to_string()))?;
        for item in items {
            let title = dig_str(item, &["title"])
                .ok_or_else(|| ApiError::Schema("amenity without title".to_string()))?;
            amenities.push(Amenity {
                title: title.to_string(),
                subtitle: dig_str(item, &["subtitle"]).map(str::to_string),
                available: dig(item, &["available"])
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            });
        }
    }
    Ok(amenities)
}
