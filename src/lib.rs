//! # Doorstep Harvester Library
//!
//! A harvesting engine for short-term-rental listing data. Given a geographic
//! bounding box, it discovers every listing in the region and collects five
//! categories of per-listing data (calendar availability, time-windowed
//! pricing, description text, reviews, amenities) from an
//! upstream map-search API that caps results per query and throttles
//! aggressively.
//!
//! ## Features
//!
//! - **Tile Partitioning**: Recursive quadrant subdivision of the search area
//!   until every tile's listing count fits under the upstream result cap
//! - **Deduplication**: First-wins merge of listings across overlapping tiles
//! - **Rate Control**: Shared request pacing with exponential backoff on
//!   throttling signals
//! - **Scheduling**: Bounded-concurrency worker pool with per-category
//!   enable flags, preview caps, and bounded retries
//! - **Price Imputation**: Per-listing nearest-neighbor regression that fills
//!   unobserved (period, guest count) pricing cells from sparse observations
//!
//! ## Quick Start
//!
//! ```no_run
//! use doorstep_harvester::{BoundingBox, HarvestConfig, Scheduler};
//! use doorstep_harvester::client::http::HarvesterClient;
//! use doorstep_harvester::limiter::RateController;
//! use doorstep_harvester::shutdown::ShutdownCoordinator;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::default();
//! let area = BoundingBox::new(49.517, 8.612, 49.303, 8.324)?;
//!
//! let controller = Arc::new(RateController::new(config.pacer()));
//! let client = Arc::new(HarvesterClient::new(controller.clone(), &config)?);
//! let shutdown = ShutdownCoordinator::shared();
//!
//! let scheduler = Scheduler::new(client, controller, shutdown, &config);
//! let outcome = scheduler.harvest(area).await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`harvest::tiles`] - Bounding-box partitioning against the result cap
//! - [`harvest::dedup`] - Duplicate-free listing set across tiles
//! - [`harvest::scheduler`] - Per-listing, per-category job execution
//! - [`limiter`] - Shared request pacing and backoff state
//! - [`pricing`] - Nearest-neighbor price imputation
//! - [`client`] - Upstream search/listing API access

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Upstream API client and response parsing
pub mod client;

/// Harvest configuration snapshot
pub mod config;

/// Discovery and per-listing data collection
pub mod harvest;

/// Shared request pacing and backoff
pub mod limiter;

/// Weekday/weekend stay-window schedule
pub mod periods;

/// Sparse price observations and imputation
pub mod pricing;

/// Graceful shutdown coordination shared across tasks
pub mod shutdown;

pub use config::HarvestConfig;
pub use harvest::scheduler::Scheduler;

/// A rectangular geographic region, oriented north-east / south-west.
///
/// Children produced by [`BoundingBox::split_quadrants`] exactly tile the
/// parent: no gaps, no overlap beyond the shared bisection edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// North-east corner latitude
    pub ne_lat: f64,
    /// North-east corner longitude
    pub ne_lng: f64,
    /// South-west corner latitude
    pub sw_lat: f64,
    /// South-west corner longitude
    pub sw_lng: f64,
}

impl BoundingBox {
    /// Create a bounding box, validating that the north-east corner is
    /// strictly north and east of the south-west corner.
    pub fn new(ne_lat: f64, ne_lng: f64, sw_lat: f64, sw_lng: f64) -> Result<Self, String> {
        if !(ne_lat.is_finite() && ne_lng.is_finite() && sw_lat.is_finite() && sw_lng.is_finite()) {
            return Err("Bounding box coordinates must be finite".to_string());
        }
        if ne_lat <= sw_lat {
            return Err(format!(
                "North-east latitude ({ne_lat}) must be north of south-west latitude ({sw_lat})"
            ));
        }
        if ne_lng <= sw_lng {
            return Err(format!(
                "North-east longitude ({ne_lng}) must be east of south-west longitude ({sw_lng})"
            ));
        }
        Ok(Self {
            ne_lat,
            ne_lng,
            sw_lat,
            sw_lng,
        })
    }

    /// Latitude extent in degrees.
    pub fn lat_span(&self) -> f64 {
        self.ne_lat - self.sw_lat
    }

    /// Longitude extent in degrees.
    pub fn lng_span(&self) -> f64 {
        self.ne_lng - self.sw_lng
    }

    /// Whether a coordinate falls inside this box (inclusive of edges).
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.sw_lat && lat <= self.ne_lat && lng >= self.sw_lng && lng <= self.ne_lng
    }

    /// Split into four equal quadrants by bisecting both axes.
    ///
    /// Order: NE, SE, NW, SW. Adjacent quadrants share a zero-width edge;
    /// their union is exactly the parent box.
    pub fn split_quadrants(&self) -> [BoundingBox; 4] {
        let half_lat = self.lat_span() / 2.0;
        let half_lng = self.lng_span() / 2.0;

        [
            BoundingBox {
                ne_lat: self.ne_lat,
                ne_lng: self.ne_lng,
                sw_lat: self.sw_lat + half_lat,
                sw_lng: self.sw_lng + half_lng,
            },
            BoundingBox {
                ne_lat: self.ne_lat - half_lat,
                ne_lng: self.ne_lng,
                sw_lat: self.sw_lat,
                sw_lng: self.sw_lng + half_lng,
            },
            BoundingBox {
                ne_lat: self.ne_lat,
                ne_lng: self.ne_lng - half_lng,
                sw_lat: self.sw_lat + half_lat,
                sw_lng: self.sw_lng,
            },
            BoundingBox {
                ne_lat: self.ne_lat - half_lat,
                ne_lng: self.ne_lng - half_lng,
                sw_lat: self.sw_lat,
                sw_lng: self.sw_lng,
            },
        ]
    }
}

/// A single rentable property record with a stable identifier.
///
/// Built from the first search result that mentions the listing; later
/// sightings from adjacent tiles are dropped by the deduplicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    /// Stable upstream listing identifier
    pub id: String,
    /// Latitude of the property
    pub lat: f64,
    /// Longitude of the property
    pub lng: f64,
    /// Listing title as shown in search results
    pub title: Option<String>,
    /// Room/property type label (e.g. "Entire home")
    pub room_type: Option<String>,
    /// Maximum number of guests
    pub person_capacity: Option<u32>,
    /// Number of bedrooms
    pub bedrooms: Option<u32>,
    /// Host display name
    pub host_name: Option<String>,
    /// Number of reviews at discovery time
    pub review_count: Option<u32>,
    /// Average review score at discovery time
    pub avg_rating: Option<f64>,
}

impl Listing {
    /// Validate listing data integrity.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Listing ID cannot be empty".to_string());
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(format!("Latitude out of range: {}", self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(format!("Longitude out of range: {}", self.lng));
        }
        Ok(())
    }
}

/// Per-listing data collection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// 365-day forward availability calendar
    #[serde(rename = "calendar")]
    Calendar,
    /// Weekday/weekend pricing grid across guest counts
    #[serde(rename = "pricing")]
    Pricing,
    /// Property description document
    #[serde(rename = "description")]
    Description,
    /// Paginated guest reviews
    #[serde(rename = "reviews")]
    Reviews,
    /// Amenity inventory
    #[serde(rename = "amenities")]
    Amenities,
}

impl Category {
    /// All categories, in scheduling order.
    pub const ALL: [Category; 5] = [
        Category::Calendar,
        Category::Pricing,
        Category::Description,
        Category::Reviews,
        Category::Amenities,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Calendar => "calendar",
            Category::Pricing => "pricing",
            Category::Description => "description",
            Category::Reviews => "reviews",
            Category::Amenities => "amenities",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calendar" => Ok(Category::Calendar),
            "pricing" => Ok(Category::Pricing),
            "description" => Ok(Category::Description),
            "reviews" => Ok(Category::Reviews),
            "amenities" => Ok(Category::Amenities),
            _ => Err(format!("Invalid category: {s}")),
        }
    }
}
