//! Discovery and per-listing data collection.
//!
//! [`tiles`] partitions the search area under the upstream result cap,
//! [`dedup`] merges tile results into a duplicate-free listing set, and
//! [`scheduler`] runs the per-listing, per-category harvest jobs.

use crate::client::{Amenity, ApiError, CalendarDay, Description, Review};
use crate::pricing::PricingGrid;
use crate::Category;
use serde::{Deserialize, Serialize};

pub mod dedup;
pub mod scheduler;
pub mod tiles;

/// Harvest errors.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Upstream API failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The job was abandoned because shutdown was requested
    #[error("harvest cancelled by shutdown")]
    Cancelled,

    /// Transient failures persisted past the retry budget
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// How many attempts were made
        attempts: u32,
        /// The final transient error
        last: ApiError,
    },
}

/// Lifecycle state of one harvest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, not yet started
    Pending,
    /// A worker is executing it
    InFlight,
    /// Completed with data
    Succeeded,
    /// Failed transiently; another attempt is scheduled
    FailedRetryable,
    /// Failed for good: schema mismatch, non-retryable status, or an
    /// exhausted retry budget
    FailedTerminal,
    /// Abandoned due to shutdown
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::FailedTerminal | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InFlight => "in_flight",
            JobStatus::Succeeded => "succeeded",
            JobStatus::FailedRetryable => "failed_retryable",
            JobStatus::FailedTerminal => "failed_terminal",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One unit of work: collect one data category for one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestJob {
    /// Listing the job targets
    pub listing_id: String,
    /// Data category to collect
    pub category: Category,
    /// Current lifecycle state
    pub status: JobStatus,
    /// Attempts made so far
    pub attempts: u32,
    /// Final error message for failed jobs
    pub error: Option<String>,
}

impl HarvestJob {
    /// Create a pending job.
    pub fn new(listing_id: impl Into<String>, category: Category) -> Self {
        Self {
            listing_id: listing_id.into(),
            category,
            status: JobStatus::Pending,
            attempts: 0,
            error: None,
        }
    }
}

/// Collected data for one completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CategoryData {
    /// Forward availability calendar
    Calendar(Vec<CalendarDay>),
    /// Completed pricing grid
    Pricing(PricingGrid),
    /// Description document
    Description(Description),
    /// Collected reviews, newest first
    Reviews(Vec<Review>),
    /// Amenity inventory
    Amenities(Vec<Amenity>),
}

/// Outcome of one job: its final record plus any collected data.
#[derive(Debug)]
pub struct JobReport {
    /// Final job record
    pub job: HarvestJob,
    /// Collected data, present only for succeeded jobs
    pub data: Option<CategoryData>,
}

/// Aggregate counts for a completed harvest run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HarvestSummary {
    /// Unique listings discovered across all tiles
    pub discovered_listings: usize,
    /// Tiles accepted at the minimum span despite exceeding the result cap
    pub truncated_tiles: usize,
    /// Tiles abandoned because their probe query failed for good; each one
    /// is a coverage hole in the discovery set
    pub failed_probes: usize,
    /// Jobs that completed with data
    pub succeeded: usize,
    /// Jobs that reached a failed state
    pub failed: usize,
    /// Jobs abandoned by shutdown
    pub cancelled: usize,
    /// (listing, category) pairs that failed, for operator follow-up
    pub failures: Vec<(String, Category)>,
}

impl std::fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discovered {} listings ({} truncated tiles, {} failed probes); jobs: {} succeeded, {} failed, {} cancelled",
            self.discovered_listings,
            self.truncated_tiles,
            self.failed_probes,
            self.succeeded,
            self.failed,
            self.cancelled,
        )
    }
}

/// Result of a full harvest run.
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Deduplicated listing summaries the run discovered, in discovery order
    pub listings: Vec<crate::Listing>,
    /// Per-job reports in completion order
    pub reports: Vec<JobReport>,
    /// Aggregate counts
    pub summary: HarvestSummary,
}
