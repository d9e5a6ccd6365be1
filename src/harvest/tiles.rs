//! Bounding-box partitioning against the upstream result cap.
//!
//! The upstream clamps any search to a fixed number of results, so a region
//! is covered by probing its listing count and splitting into quadrants
//! until every tile fits under the cap. Splitting uses an explicit work
//! stack rather than recursion, and a tile whose span has shrunk to the
//! configured minimum is accepted as truncated instead of splitting further.

use crate::client::SearchApi;
use crate::harvest::HarvestError;
use crate::limiter::RateController;
use crate::shutdown::ShutdownCoordinator;
use crate::{BoundingBox, Listing};
use tracing::{debug, info, warn};

/// Zoom level reported for the root probe.
const ROOT_ZOOM: u8 = 12;

/// Deepest zoom level reported to the upstream.
const MAX_ZOOM: u8 = 22;

/// Hard ceiling on probes per partition run, against pathological inputs.
const MAX_PROBES: usize = 16_384;

/// Partitioning parameters.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Upstream per-query result cap
    pub result_capacity: u32,
    /// Minimum tile span in degrees before accepting truncation
    pub min_span_deg: f64,
    /// Retry budget per probe for transient failures
    pub max_retries: u32,
}

/// An accepted tile whose listing count fits under the cap (or was truncated
/// at the minimum span).
#[derive(Debug, Clone)]
pub struct Tile {
    /// Tile region
    pub bounds: BoundingBox,
    /// Zoom level the tile was probed at
    pub zoom: u8,
    /// Listing count the upstream reported for the tile
    pub listing_count: u32,
    /// Whether the tile still exceeds the cap at the minimum span
    pub truncated: bool,
    /// First page of results from the accepting probe, reused so discovery
    /// does not refetch it
    pub first_page: Vec<Listing>,
}

/// Result of a partition run.
#[derive(Debug, Default)]
pub struct PartitionOutcome {
    /// Accepted tiles covering the root region
    pub tiles: Vec<Tile>,
    /// How many tiles were accepted truncated
    pub truncated_tiles: usize,
    /// Probes abandoned after a terminal failure or exhausted retries
    pub failed_probes: usize,
    /// Whether partitioning stopped early for shutdown
    pub cancelled: bool,
}

/// Partition `root` into tiles that each fit under the result cap.
///
/// Probes are paced by the shared controller and retried with backoff on
/// transient failures. A shutdown request stops the run at the next probe
/// boundary with whatever tiles were already accepted.
pub async fn partition(
    api: &dyn SearchApi,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    root: BoundingBox,
    cfg: &PartitionConfig,
) -> Result<PartitionOutcome, HarvestError> {
    let mut outcome = PartitionOutcome::default();
    let mut stack = vec![(root, ROOT_ZOOM)];
    let mut probes = 0usize;

    while let Some((bounds, zoom)) = stack.pop() {
        if shutdown.is_shutdown_requested() {
            info!(
                accepted = outcome.tiles.len(),
                pending = stack.len() + 1,
                "partitioning stopped for shutdown"
            );
            outcome.cancelled = true;
            break;
        }
        probes += 1;
        if probes > MAX_PROBES {
            warn!(probes, "probe ceiling reached, accepting remaining tiles truncated");
            outcome.truncated_tiles += 1;
            outcome.tiles.push(Tile {
                bounds,
                zoom,
                listing_count: cfg.result_capacity,
                truncated: true,
                first_page: Vec::new(),
            });
            continue;
        }

        let page = match probe_with_retry(api, controller, shutdown, &bounds, zoom, cfg).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                outcome.failed_probes += 1;
                continue;
            }
            Err(HarvestError::Cancelled) => {
                outcome.cancelled = true;
                break;
            }
            Err(e) => return Err(e),
        };

        let min_span_reached =
            bounds.lat_span() <= cfg.min_span_deg || bounds.lng_span() <= cfg.min_span_deg;

        if page.total_count <= cfg.result_capacity {
            debug!(
                count = page.total_count,
                lat_span = bounds.lat_span(),
                "tile accepted"
            );
            outcome.tiles.push(Tile {
                bounds,
                zoom,
                listing_count: page.total_count,
                truncated: false,
                first_page: page.listings,
            });
        } else if min_span_reached {
            warn!(
                count = page.total_count,
                cap = cfg.result_capacity,
                "tile exceeds cap at minimum span, accepting truncated"
            );
            outcome.truncated_tiles += 1;
            outcome.tiles.push(Tile {
                bounds,
                zoom,
                listing_count: page.total_count,
                truncated: true,
                first_page: page.listings,
            });
        } else {
            let child_zoom = zoom.saturating_add(1).min(MAX_ZOOM);
            for child in bounds.split_quadrants() {
                stack.push((child, child_zoom));
            }
        }
    }

    info!(
        tiles = outcome.tiles.len(),
        truncated = outcome.truncated_tiles,
        failed_probes = outcome.failed_probes,
        "partitioning complete"
    );
    Ok(outcome)
}

/// Probe one tile, retrying transient failures under the configured budget.
///
/// Returns `Ok(None)` when the tile must be skipped: a terminal failure or
/// an exhausted retry budget. Propagates [`HarvestError::Cancelled`] when
/// shutdown interrupts a backoff wait.
async fn probe_with_retry(
    api: &dyn SearchApi,
    controller: &RateController,
    shutdown: &ShutdownCoordinator,
    bounds: &BoundingBox,
    zoom: u8,
    cfg: &PartitionConfig,
) -> Result<Option<crate::client::SearchPage>, HarvestError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match api.search(bounds, zoom, 0).await {
            Ok(page) => return Ok(Some(page)),
            Err(e) if e.is_transient() && attempts <= cfg.max_retries => {
                let delay = controller.backoff_delay(attempts);
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "tile probe failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.wait_for_shutdown() => return Err(HarvestError::Cancelled),
                }
            }
            Err(e) => {
                warn!(attempts, error = %e, "tile probe abandoned");
                return Ok(None);
            }
        }
    }
}
