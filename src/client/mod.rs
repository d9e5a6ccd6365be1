//! Upstream search/listing API access.
//!
//! The [`SearchApi`] trait is the seam between the harvest engine and the
//! network: the engine schedules and retries against the trait, while
//! [`http::HarvesterClient`] implements it over HTTPS and the tests
//! substitute a deterministic fake.

use crate::limiter::PacerError;
use crate::periods::StayWindow;
use crate::pricing::PriceObservation;
use crate::{BoundingBox, Listing};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod http;
pub mod payload;

/// Listings per search results page.
pub const SEARCH_PAGE_SIZE: u32 = 18;

/// Reviews per review results page.
pub const REVIEW_PAGE_SIZE: u32 = 24;

/// Errors surfaced by upstream API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Connection-level failure (DNS, TLS, timeouts, resets)
    #[error("network error: {0}")]
    Network(String),

    /// The upstream signalled throttling or returned a blocked response
    #[error("request throttled by upstream")]
    Throttled,

    /// Unexpected HTTP status
    #[error("unexpected HTTP status {0}")]
    Http(u16),

    /// Response decoded but did not match the expected shape
    #[error("unexpected response shape: {0}")]
    Schema(String),

    /// Rate controller failure
    #[error(transparent)]
    Pacing(#[from] PacerError),
}

impl ApiError {
    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// Throttling, server errors, and connection failures are transient;
    /// client errors other than 429 and schema mismatches are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Throttled => true,
            ApiError::Http(status) => *status == 429 || *status >= 500,
            ApiError::Schema(_) | ApiError::Pacing(_) => false,
        }
    }
}

/// Result alias for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// One page of map-search results for a bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    /// Total listings the upstream reports for the queried region, clamped
    /// by it to the result cap
    pub total_count: u32,
    /// Listings on this page, at most [`SEARCH_PAGE_SIZE`]
    pub listings: Vec<Listing>,
}

/// Availability for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDay {
    /// The day
    pub date: NaiveDate,
    /// Whether any stay can cover this day
    pub available: bool,
    /// Minimum stay length if checking in here
    pub min_nights: Option<u32>,
    /// Maximum stay length if checking in here
    pub max_nights: Option<u32>,
    /// Whether check-in on this day is allowed
    pub available_for_checkin: bool,
    /// Whether the day is bookable at all
    pub bookable: bool,
}

/// One guest review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Stable review identifier
    pub id: String,
    /// Creation date
    pub date: Option<NaiveDate>,
    /// Star rating, 1 to 5
    pub rating: Option<u8>,
    /// Review text
    pub comments: String,
}

/// One page of reviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPage {
    /// Total reviews the upstream reports for the listing
    pub total_count: u32,
    /// Reviews on this page, at most [`REVIEW_PAGE_SIZE`]
    pub reviews: Vec<Review>,
}

/// A listing's description document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    /// Listing the description belongs to
    pub listing_id: String,
    /// Concatenated description sections
    pub text: String,
    /// BCP-47 language tag the text was served in, when reported
    pub language: Option<String>,
}

/// One amenity entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amenity {
    /// Amenity name
    pub title: String,
    /// Optional detail line
    pub subtitle: Option<String>,
    /// Whether the listing offers it
    pub available: bool,
}

/// Upstream operations the harvest engine depends on.
///
/// Implementations are expected to consult the shared rate controller before
/// each request and to classify failures per [`ApiError::is_transient`].
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Fetch one page of map-search results for a region.
    async fn search(&self, area: &BoundingBox, zoom: u8, offset: u32) -> ApiResult<SearchPage>;

    /// Fetch the 365-day forward availability calendar for a listing.
    async fn fetch_calendar(&self, listing_id: &str) -> ApiResult<Vec<CalendarDay>>;

    /// Quote one stay window for a listing at a guest count.
    ///
    /// `Ok(None)` means the listing did not come back for that window, i.e.
    /// it is unavailable rather than the request having failed.
    async fn fetch_price_quote(
        &self,
        listing: &Listing,
        window: &StayWindow,
        guests: u8,
    ) -> ApiResult<Option<PriceObservation>>;

    /// Fetch a listing's description document.
    async fn fetch_description(&self, listing_id: &str) -> ApiResult<Description>;

    /// Fetch one page of a listing's reviews.
    async fn fetch_reviews(&self, listing_id: &str, offset: u32) -> ApiResult<ReviewPage>;

    /// Fetch a listing's amenity inventory.
    async fn fetch_amenities(&self, listing_id: &str) -> ApiResult<Vec<Amenity>>;
}
