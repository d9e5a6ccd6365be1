//! Per-listing, per-category harvest job execution.
//!
//! The [`Scheduler`] runs a harvest in two phases. Discovery partitions the
//! root region into tiles and merges every tile's paged search results into
//! a duplicate-free listing set. Collection then creates one job per
//! (listing, enabled category) pair and drives them through a
//! bounded-concurrency worker pool with per-job retry budgets.

use crate::client::{ApiResult, SearchApi, REVIEW_PAGE_SIZE, SEARCH_PAGE_SIZE};
use crate::config::HarvestConfig;
use crate::harvest::dedup::ListingSet;
use crate::harvest::tiles::{self, PartitionConfig};
use crate::harvest::{
    CategoryData, HarvestError, HarvestJob, HarvestOutcome, HarvestSummary, JobReport, JobStatus,
};
use crate::limiter::RateController;
use crate::periods::stay_windows;
use crate::pricing;
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::{BoundingBox, Category, Listing};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

/// Guard against runaway pagination loops.
const MAX_PAGES: u32 = 10_000;

/// Scheduler tuning derived from [`HarvestConfig`].
#[derive(Debug, Clone)]
struct SchedulerConfig {
    enabled: Vec<Category>,
    preview: bool,
    preview_cap: usize,
    review_preview_cap: usize,
    max_concurrency: usize,
    max_retries: u32,
    partition: PartitionConfig,
    weeks_ahead: u32,
    guest_counts: Vec<u8>,
    knn_neighbors: usize,
}

/// Result of the discovery phase.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    /// Duplicate-free listings across all tiles
    pub listings: ListingSet,
    /// Tiles accepted truncated at the minimum span
    pub truncated_tiles: usize,
    /// Tiles dropped because their probe failed for good
    pub failed_probes: usize,
    /// Whether discovery stopped early for shutdown
    pub cancelled: bool,
}

/// Orchestrates discovery and per-listing data collection.
pub struct Scheduler {
    api: Arc<dyn SearchApi>,
    controller: Arc<RateController>,
    shutdown: SharedShutdown,
    cfg: Arc<SchedulerConfig>,
}

impl Scheduler {
    /// Create a scheduler from shared collaborators and the run config.
    pub fn new(
        api: Arc<dyn SearchApi>,
        controller: Arc<RateController>,
        shutdown: SharedShutdown,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            api,
            controller,
            shutdown,
            cfg: Arc::new(SchedulerConfig {
                enabled: config.enabled_categories(),
                preview: config.is_web_preview,
                preview_cap: config.preview_cap,
                review_preview_cap: config.review_preview_cap,
                max_concurrency: config.max_concurrency,
                max_retries: config.max_retries,
                partition: PartitionConfig {
                    result_capacity: config.result_capacity,
                    min_span_deg: config.min_tile_span_deg,
                    max_retries: config.max_retries,
                },
                weeks_ahead: config.weeks_ahead,
                guest_counts: config.guest_counts.clone(),
                knn_neighbors: config.knn_neighbors,
            }),
        }
    }

    /// Run a complete harvest: discovery, then collection.
    pub async fn harvest(&self, root: BoundingBox) -> Result<HarvestOutcome, HarvestError> {
        let discovery = self.discover(root).await?;
        let mut outcome = self.run(&discovery.listings).await;
        outcome.summary.truncated_tiles = discovery.truncated_tiles;
        outcome.summary.failed_probes = discovery.failed_probes;
        if discovery.cancelled {
            info!("harvest ran on a partial discovery set due to shutdown");
        }
        info!(summary = %outcome.summary, "harvest complete");
        Ok(outcome)
    }

    /// Discovery phase: partition the region and page every tile.
    pub async fn discover(&self, root: BoundingBox) -> Result<DiscoveryOutcome, HarvestError> {
        let partition = tiles::partition(
            self.api.as_ref(),
            &self.controller,
            &self.shutdown,
            root,
            &self.cfg.partition,
        )
        .await?;

        let mut listings = ListingSet::new();
        let mut cancelled = partition.cancelled;

        'tiles: for (tile_index, tile) in partition.tiles.iter().enumerate() {
            listings.merge_page(tile_index, &tile.first_page);

            // The upstream never returns more than the cap even from a
            // truncated tile
            let expected = tile.listing_count.min(self.cfg.partition.result_capacity);
            let mut fetched = tile.first_page.len() as u32;
            let mut offset = SEARCH_PAGE_SIZE;
            let mut pages = 1;

            while fetched < expected && pages < MAX_PAGES {
                let (_, result) = with_retry(
                    &self.controller,
                    &self.shutdown,
                    self.cfg.max_retries,
                    || {
                        let api = Arc::clone(&self.api);
                        let bounds = tile.bounds;
                        let zoom = tile.zoom;
                        async move { api.search(&bounds, zoom, offset).await }
                    },
                    || {},
                )
                .await;

                let page = match result {
                    Ok(page) => page,
                    Err(HarvestError::Cancelled) => {
                        cancelled = true;
                        break 'tiles;
                    }
                    Err(e) => {
                        warn!(tile_index, offset, error = %e, "tile page abandoned");
                        break;
                    }
                };
                if page.listings.is_empty() {
                    break;
                }
                fetched += page.listings.len() as u32;
                listings.merge_page(tile_index, &page.listings);
                offset += SEARCH_PAGE_SIZE;
                pages += 1;
            }
        }

        info!(
            listings = listings.len(),
            tiles = partition.tiles.len(),
            truncated = partition.truncated_tiles,
            cancelled,
            "discovery complete"
        );
        Ok(DiscoveryOutcome {
            listings,
            truncated_tiles: partition.truncated_tiles,
            failed_probes: partition.failed_probes,
            cancelled,
        })
    }

    /// Collection phase: run jobs for every enabled category over the set.
    pub async fn run(&self, listings: &ListingSet) -> HarvestOutcome {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrency));
        let mut join_set: JoinSet<JobReport> = JoinSet::new();

        for &category in &self.cfg.enabled {
            let targets = self.targets(listings);
            info!(%category, jobs = targets.len(), "scheduling category");

            for listing in targets {
                let api = Arc::clone(&self.api);
                let controller = Arc::clone(&self.controller);
                let shutdown = Arc::clone(&self.shutdown);
                let cfg = Arc::clone(&self.cfg);
                let semaphore = Arc::clone(&semaphore);

                let span =
                    info_span!("harvest_job", listing = %listing.id, category = %category);
                join_set.spawn(
                    async move {
                        run_job(api, controller, shutdown, cfg, semaphore, listing, category)
                            .await
                    }
                    .instrument(span),
                );
            }
        }

        let mut reports = Vec::new();
        let mut summary = HarvestSummary {
            discovered_listings: listings.len(),
            ..HarvestSummary::default()
        };
        while let Some(joined) = join_set.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "harvest job task failed to join");
                    continue;
                }
            };
            match report.job.status {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
                JobStatus::FailedTerminal => {
                    summary.failed += 1;
                    summary
                        .failures
                        .push((report.job.listing_id.clone(), report.job.category));
                }
                JobStatus::Pending | JobStatus::InFlight | JobStatus::FailedRetryable => {
                    // run_job always finishes jobs
                    warn!(listing = %report.job.listing_id, "job finished in a non-terminal state");
                }
            }
            reports.push(report);
        }

        HarvestOutcome {
            listings: listings.listings().to_vec(),
            reports,
            summary,
        }
    }

    /// The listings a category run targets: the whole set, or a stride
    /// sample of `preview_cap` in preview mode.
    fn targets(&self, listings: &ListingSet) -> Vec<Listing> {
        let all = listings.listings();
        if !self.cfg.preview || all.len() <= self.cfg.preview_cap {
            return all.to_vec();
        }
        sample_indices(all.len(), self.cfg.preview_cap)
            .into_iter()
            .map(|i| all[i].clone())
            .collect()
    }
}

/// Evenly spaced sample of `cap` indices out of `n`.
fn sample_indices(n: usize, cap: usize) -> Vec<usize> {
    if n <= cap {
        return (0..n).collect();
    }
    (0..cap).map(|i| i * n / cap).collect()
}

/// Execute one job to a terminal state.
async fn run_job(
    api: Arc<dyn SearchApi>,
    controller: Arc<RateController>,
    shutdown: SharedShutdown,
    cfg: Arc<SchedulerConfig>,
    semaphore: Arc<Semaphore>,
    listing: Listing,
    category: Category,
) -> JobReport {
    let mut job = HarvestJob::new(listing.id.clone(), category);

    let permit = match Arc::clone(&semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            job.status = JobStatus::Cancelled;
            return JobReport { job, data: None };
        }
    };
    if shutdown.is_shutdown_requested() {
        job.status = JobStatus::Cancelled;
        return JobReport { job, data: None };
    }
    job.status = JobStatus::InFlight;

    let status = &mut job.status;
    let (attempts, result) = match category {
        Category::Calendar => {
            execute_calendar(&api, &controller, &shutdown, &cfg, &listing, status).await
        }
        Category::Pricing => {
            execute_pricing(&api, &controller, &shutdown, &cfg, &listing, status).await
        }
        Category::Description => {
            execute_description(&api, &controller, &shutdown, &cfg, &listing, status).await
        }
        Category::Reviews => {
            execute_reviews(&api, &controller, &shutdown, &cfg, &listing, status).await
        }
        Category::Amenities => {
            execute_amenities(&api, &controller, &shutdown, &cfg, &listing, status).await
        }
    };
    drop(permit);

    job.attempts = attempts;
    match result {
        Ok(data) => {
            job.status = JobStatus::Succeeded;
            JobReport {
                job,
                data: Some(data),
            }
        }
        Err(HarvestError::Cancelled) => {
            job.status = JobStatus::Cancelled;
            JobReport { job, data: None }
        }
        Err(e @ HarvestError::RetriesExhausted { .. }) => {
            warn!(error = %e, "retry budget exhausted, escalating to terminal failure");
            job.status = JobStatus::FailedTerminal;
            job.error = Some(e.to_string());
            JobReport { job, data: None }
        }
        Err(e) => {
            warn!(error = %e, "job failed terminally");
            job.status = JobStatus::FailedTerminal;
            job.error = Some(e.to_string());
            JobReport { job, data: None }
        }
    }
}

/// Run one API call under the retry budget.
///
/// Transient failures back off between attempts, invoking `on_retry` before
/// each wait; a shutdown request during a backoff wait cancels the call.
/// Returns the attempts made alongside the result.
async fn with_retry<T, F, Fut, R>(
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    max_retries: u32,
    mut call: F,
    mut on_retry: R,
) -> (u32, Result<T, HarvestError>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
    R: FnMut(),
{
    let mut attempts = 0;
    loop {
        if shutdown.is_shutdown_requested() {
            return (attempts, Err(HarvestError::Cancelled));
        }
        attempts += 1;
        match call().await {
            Ok(value) => return (attempts, Ok(value)),
            Err(e) if e.is_transient() => {
                if attempts > max_retries || controller.ceiling_exceeded() {
                    return (
                        attempts,
                        Err(HarvestError::RetriesExhausted { attempts, last: e }),
                    );
                }
                on_retry();
                let delay = controller.backoff_delay(attempts);
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.wait_for_shutdown() => {
                        return (attempts, Err(HarvestError::Cancelled));
                    }
                }
            }
            Err(e) => return (attempts, Err(HarvestError::Api(e))),
        }
    }
}

async fn execute_calendar(
    api: &Arc<dyn SearchApi>,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    cfg: &SchedulerConfig,
    listing: &Listing,
    status: &mut JobStatus,
) -> (u32, Result<CategoryData, HarvestError>) {
    let (attempts, result) = with_retry(
        controller,
        shutdown,
        cfg.max_retries,
        || {
            let api = Arc::clone(api);
            let id = listing.id.clone();
            async move { api.fetch_calendar(&id).await }
        },
        || *status = JobStatus::FailedRetryable,
    )
    .await;
    (attempts, result.map(CategoryData::Calendar))
}

/// Quote every (stay window, guest count) cell, then impute the gaps.
///
/// Individual quote failures skip their cell rather than failing the job;
/// the job only fails when no quote succeeded and at least one errored.
async fn execute_pricing(
    api: &Arc<dyn SearchApi>,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    cfg: &SchedulerConfig,
    listing: &Listing,
    status: &mut JobStatus,
) -> (u32, Result<CategoryData, HarvestError>) {
    let windows = stay_windows(Utc::now().date_naive(), cfg.weeks_ahead);
    let mut observations = Vec::new();
    let mut total_attempts = 0;
    let mut last_error: Option<HarvestError> = None;
    let mut any_quote_ok = false;

    for window in &windows {
        for &guests in &cfg.guest_counts {
            let (attempts, result) = with_retry(
                controller,
                shutdown,
                cfg.max_retries,
                || {
                    let api = Arc::clone(api);
                    let listing = listing.clone();
                    let window = *window;
                    async move { api.fetch_price_quote(&listing, &window, guests).await }
                },
                || *status = JobStatus::FailedRetryable,
            )
            .await;
            *status = JobStatus::InFlight;
            total_attempts += attempts;

            match result {
                Ok(Some(observation)) => {
                    any_quote_ok = true;
                    observations.push(observation);
                }
                Ok(None) => any_quote_ok = true,
                Err(HarvestError::Cancelled) => {
                    return (total_attempts, Err(HarvestError::Cancelled));
                }
                Err(e) => {
                    warn!(guests, check_in = %window.check_in, error = %e, "quote cell skipped");
                    last_error = Some(e);
                }
            }
        }
    }

    if !any_quote_ok {
        if let Some(e) = last_error {
            return (total_attempts, Err(e));
        }
    }
    let grid = pricing::impute(
        &listing.id,
        &observations,
        &cfg.guest_counts,
        cfg.knn_neighbors,
    );
    (total_attempts, Ok(CategoryData::Pricing(grid)))
}

async fn execute_description(
    api: &Arc<dyn SearchApi>,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    cfg: &SchedulerConfig,
    listing: &Listing,
    status: &mut JobStatus,
) -> (u32, Result<CategoryData, HarvestError>) {
    let (attempts, result) = with_retry(
        controller,
        shutdown,
        cfg.max_retries,
        || {
            let api = Arc::clone(api);
            let id = listing.id.clone();
            async move { api.fetch_description(&id).await }
        },
        || *status = JobStatus::FailedRetryable,
    )
    .await;
    (attempts, result.map(CategoryData::Description))
}

/// Page through a listing's reviews, newest first.
///
/// Preview mode stops at the review cap instead of draining the full set.
async fn execute_reviews(
    api: &Arc<dyn SearchApi>,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    cfg: &SchedulerConfig,
    listing: &Listing,
    status: &mut JobStatus,
) -> (u32, Result<CategoryData, HarvestError>) {
    let cap = cfg.preview.then_some(cfg.review_preview_cap);
    let mut reviews = Vec::new();
    let mut total_attempts = 0;
    let mut offset = 0;
    let mut pages = 0;

    loop {
        let (attempts, result) = with_retry(
            controller,
            shutdown,
            cfg.max_retries,
            || {
                let api = Arc::clone(api);
                let id = listing.id.clone();
                async move { api.fetch_reviews(&id, offset).await }
            },
            || *status = JobStatus::FailedRetryable,
        )
        .await;
        *status = JobStatus::InFlight;
        total_attempts += attempts;

        let page = match result {
            Ok(page) => page,
            Err(e) => return (total_attempts, Err(e)),
        };
        if page.reviews.is_empty() {
            break;
        }
        reviews.extend(page.reviews);

        if let Some(cap) = cap {
            if reviews.len() >= cap {
                reviews.truncate(cap);
                break;
            }
        }
        if reviews.len() as u32 >= page.total_count {
            break;
        }
        offset += REVIEW_PAGE_SIZE;
        pages += 1;
        if pages >= MAX_PAGES {
            warn!(offset, "review page ceiling reached");
            break;
        }
    }
    (total_attempts, Ok(CategoryData::Reviews(reviews)))
}

async fn execute_amenities(
    api: &Arc<dyn SearchApi>,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    cfg: &SchedulerConfig,
    listing: &Listing,
    status: &mut JobStatus,
) -> (u32, Result<CategoryData, HarvestError>) {
    let (attempts, result) = with_retry(
        controller,
        shutdown,
        cfg.max_retries,
        || {
            let api = Arc::clone(api);
            let id = listing.id.clone();
            async move { api.fetch_amenities(&id).await }
        },
        || *status = JobStatus::FailedRetryable,
    )
    .await;
    (attempts, result.map(CategoryData::Amenities))
}
