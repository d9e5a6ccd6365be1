//! Shared test fixtures: a deterministic in-memory upstream and helpers for
//! building fast harvest rigs.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use doorstep_harvester::client::{
    Amenity, ApiError, ApiResult, CalendarDay, Description, Review, ReviewPage, SearchApi,
    SearchPage, REVIEW_PAGE_SIZE, SEARCH_PAGE_SIZE,
};
use doorstep_harvester::limiter::RateController;
use doorstep_harvester::periods::{PeriodType, StayWindow};
use doorstep_harvester::pricing::PriceObservation;
use doorstep_harvester::shutdown::SharedShutdown;
use doorstep_harvester::{BoundingBox, HarvestConfig, Listing};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct FakeState {
    calls: u32,
    detail_calls: HashMap<String, u32>,
    transient_remaining: HashMap<String, u32>,
    terminal: HashSet<String>,
    review_counts: HashMap<String, u32>,
    shutdown_after: Option<(u32, SharedShutdown)>,
    search_poison: Option<BoundingBox>,
}

/// In-memory stand-in for the upstream API.
///
/// Searches filter a fixed listing vector by bounding box, report the true
/// match count, and serve at most `result_capacity` listings in pages of
/// [`SEARCH_PAGE_SIZE`]. Detail operations are generated deterministically
/// from the listing ID. Price quotes come back for even guest counts only;
/// odd counts are reported unavailable so imputation has gaps to fill.
pub struct FakeSearchApi {
    listings: Vec<Listing>,
    result_capacity: u32,
    state: Mutex<FakeState>,
}

impl FakeSearchApi {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self {
            listings,
            result_capacity: 300,
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_capacity(mut self, cap: u32) -> Self {
        self.result_capacity = cap;
        self
    }

    /// Make the next `times` detail calls for a listing fail transiently.
    pub fn fail_transient(&self, listing_id: &str, times: u32) {
        let mut state = self.state.lock().unwrap();
        state
            .transient_remaining
            .insert(listing_id.to_string(), times);
    }

    /// Make every detail call for a listing fail terminally.
    pub fn fail_terminal(&self, listing_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.terminal.insert(listing_id.to_string());
    }

    /// Make every search whose query box lies inside `area` fail terminally,
    /// as if the upstream blocked that region.
    pub fn fail_search_within(&self, area: BoundingBox) {
        let mut state = self.state.lock().unwrap();
        state.search_poison = Some(area);
    }

    /// Set how many reviews a listing has.
    pub fn set_reviews(&self, listing_id: &str, count: u32) {
        let mut state = self.state.lock().unwrap();
        state.review_counts.insert(listing_id.to_string(), count);
    }

    /// Request shutdown on the given handle once `calls` total API calls
    /// have been made.
    pub fn shutdown_after(&self, calls: u32, shutdown: SharedShutdown) {
        let mut state = self.state.lock().unwrap();
        state.shutdown_after = Some((calls, shutdown));
    }

    /// Detail calls made for one listing so far.
    pub fn detail_calls(&self, listing_id: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.detail_calls.get(listing_id).copied().unwrap_or(0)
    }

    /// Total API calls made so far.
    pub fn total_calls(&self) -> u32 {
        self.state.lock().unwrap().calls
    }

    fn tick(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some((threshold, shutdown)) = &state.shutdown_after {
            if state.calls >= *threshold {
                shutdown.request_shutdown();
            }
        }
    }

    /// Count a detail call and apply any planned failure for the listing.
    fn gate(&self, listing_id: &str) -> ApiResult<()> {
        self.tick();
        let mut state = self.state.lock().unwrap();
        *state
            .detail_calls
            .entry(listing_id.to_string())
            .or_insert(0) += 1;

        if state.terminal.contains(listing_id) {
            return Err(ApiError::Http(403));
        }
        if let Some(remaining) = state.transient_remaining.get_mut(listing_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::Throttled);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SearchApi for FakeSearchApi {
    async fn search(&self, area: &BoundingBox, _zoom: u8, offset: u32) -> ApiResult<SearchPage> {
        self.tick();
        {
            let state = self.state.lock().unwrap();
            if let Some(poison) = &state.search_poison {
                if poison.contains(area.ne_lat, area.ne_lng)
                    && poison.contains(area.sw_lat, area.sw_lng)
                {
                    return Err(ApiError::Http(403));
                }
            }
        }
        let within: Vec<&Listing> = self
            .listings
            .iter()
            .filter(|l| area.contains(l.lat, l.lng))
            .collect();
        let total_count = within.len() as u32;

        let listings = within
            .into_iter()
            .take(self.result_capacity as usize)
            .skip(offset as usize)
            .take(SEARCH_PAGE_SIZE as usize)
            .cloned()
            .collect();
        Ok(SearchPage {
            total_count,
            listings,
        })
    }

    async fn fetch_calendar(&self, listing_id: &str) -> ApiResult<Vec<CalendarDay>> {
        self.gate(listing_id)?;
        let start = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        Ok((0..30)
            .map(|i| CalendarDay {
                date: start + Duration::days(i),
                available: i % 3 != 0,
                min_nights: Some(2),
                max_nights: Some(28),
                available_for_checkin: i % 3 != 0,
                bookable: i % 3 != 0,
            })
            .collect())
    }

    async fn fetch_price_quote(
        &self,
        listing: &Listing,
        window: &StayWindow,
        guests: u8,
    ) -> ApiResult<Option<PriceObservation>> {
        self.gate(&listing.id)?;
        if guests % 2 != 0 {
            return Ok(None);
        }
        let base = match window.period {
            PeriodType::Weekday => 100.0,
            PeriodType::Weekend => 200.0,
        };
        Ok(Some(PriceObservation {
            listing_id: listing.id.clone(),
            period: window.period,
            guests,
            check_in: window.check_in,
            price: base + 20.0 * f64::from(guests),
            available: true,
        }))
    }

    async fn fetch_description(&self, listing_id: &str) -> ApiResult<Description> {
        self.gate(listing_id)?;
        Ok(Description {
            listing_id: listing_id.to_string(),
            text: format!("Generated description for {listing_id}"),
            language: Some("en".to_string()),
        })
    }

    async fn fetch_reviews(&self, listing_id: &str, offset: u32) -> ApiResult<ReviewPage> {
        self.gate(listing_id)?;
        let total_count = {
            let state = self.state.lock().unwrap();
            state.review_counts.get(listing_id).copied().unwrap_or(0)
        };
        let end = total_count.min(offset + REVIEW_PAGE_SIZE);
        let reviews = (offset..end)
            .map(|n| Review {
                id: format!("{listing_id}-r{n}"),
                date: NaiveDate::from_ymd_opt(2026, 6, 1),
                rating: Some(5),
                comments: format!("Review {n}"),
            })
            .collect();
        Ok(ReviewPage {
            total_count,
            reviews,
        })
    }

    async fn fetch_amenities(&self, listing_id: &str) -> ApiResult<Vec<Amenity>> {
        self.gate(listing_id)?;
        Ok(vec![
            Amenity {
                title: "Wifi".to_string(),
                subtitle: None,
                available: true,
            },
            Amenity {
                title: "Free parking".to_string(),
                subtitle: None,
                available: false,
            },
        ])
    }
}

/// A single listing at a coordinate.
pub fn listing(id: &str, lat: f64, lng: f64) -> Listing {
    Listing {
        id: id.to_string(),
        lat,
        lng,
        title: Some(format!("Listing {id}")),
        room_type: Some("entire_home".to_string()),
        person_capacity: Some(4),
        bedrooms: Some(2),
        host_name: None,
        review_count: Some(10),
        avg_rating: Some(4.7),
    }
}

/// `n` listings spread on a uniform grid over the area's interior.
pub fn grid_listings(n: usize, area: &BoundingBox) -> Vec<Listing> {
    let side = (n as f64).sqrt().ceil() as usize;
    (0..n)
        .map(|i| {
            let row = i / side;
            let col = i % side;
            let lat = area.sw_lat + area.lat_span() * (row as f64 + 0.5) / side as f64;
            let lng = area.sw_lng + area.lng_span() * (col as f64 + 0.5) / side as f64;
            listing(&format!("{:06}", i + 1), lat, lng)
        })
        .collect()
}

/// The region every test harvests.
pub fn test_area() -> BoundingBox {
    BoundingBox::new(49.5, 8.6, 49.3, 8.3).unwrap()
}

/// Config with zero pacing delays, tight budgets, and all categories off;
/// each test enables what it exercises.
pub fn test_config() -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.scrape_calendar = false;
    config.scrape_weekly_pricing = false;
    config.scrape_description = false;
    config.scrape_reviews = false;
    config.scrape_amenities = false;
    config.max_retries = 3;
    config.weeks_ahead = 1;
    config.guest_counts = vec![2, 3, 4];
    config.result_capacity = 300;
    config.min_request_interval_ms = 0;
    config.request_jitter_ms = 0;
    config.initial_backoff_ms = 0;
    config.max_backoff_ms = 0;
    config
}

/// Rate controller matching a test config.
pub fn controller_for(config: &HarvestConfig) -> Arc<RateController> {
    RateController::shared(config.pacer())
}
