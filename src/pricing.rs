//! Sparse price observations and nearest-neighbor imputation.
//!
//! Quotes come back for only some (period, guest count) combinations, either
//! because a stay window was unavailable or because a quote request failed
//! terminally. [`impute`] fills the gaps per listing from whatever was
//! observed, without ever overwriting an observed value.

use crate::periods::PeriodType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One successfully quoted stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Listing the quote belongs to
    pub listing_id: String,
    /// Weekday or weekend stay
    pub period: PeriodType,
    /// Guest count the quote was requested for
    pub guests: u8,
    /// Check-in date of the quoted window
    pub check_in: NaiveDate,
    /// Total stay price in the configured currency
    pub price: f64,
    /// Whether the window was bookable when quoted
    pub available: bool,
}

/// Provenance of a pricing-grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellSource {
    /// Averaged directly from quotes for this exact guest count
    #[serde(rename = "observed")]
    Observed,
    /// Estimated from nearby guest counts
    #[serde(rename = "imputed")]
    Imputed,
}

/// One (guest count, period) cell of a listing's pricing grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceCell {
    /// Guest count this cell prices
    pub guests: u8,
    /// Weekday or weekend
    pub period: PeriodType,
    /// Mean stay price
    pub price: f64,
    /// Observed or imputed
    pub source: CellSource,
}

/// A listing's completed pricing grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingGrid {
    /// Listing the grid belongs to
    pub listing_id: String,
    /// Filled cells, observed cells first within each period
    pub cells: Vec<PriceCell>,
    /// Periods with fewer than two observed guest counts, whose gaps were
    /// left unfilled
    pub low_confidence: Vec<PeriodType>,
}

impl PricingGrid {
    /// Look up the cell for a (guests, period) pair.
    pub fn cell(&self, guests: u8, period: PeriodType) -> Option<&PriceCell> {
        self.cells
            .iter()
            .find(|c| c.guests == guests && c.period == period)
    }
}

/// Per-guest mean of the available observations for one period.
fn guest_means(observations: &[&PriceObservation]) -> Vec<(u8, f64)> {
    let mut means: Vec<(u8, f64, u32)> = Vec::new();
    for obs in observations {
        match means.iter_mut().find(|(g, _, _)| *g == obs.guests) {
            Some((_, sum, n)) => {
                *sum += obs.price;
                *n += 1;
            }
            None => means.push((obs.guests, obs.price, 1)),
        }
    }
    means.sort_by_key(|(g, _, _)| *g);
    means
        .into_iter()
        .map(|(g, sum, n)| (g, sum / f64::from(n)))
        .collect()
}

/// Estimate a price for `target` guests from observed per-guest means.
///
/// Uses the `k` nearest observed guest counts by absolute distance. When the
/// k-th neighbor is tied on distance with others beyond it, all tied
/// neighbors are included and the result is the plain average over the set.
fn knn_estimate(means: &[(u8, f64)], target: u8, k: usize) -> f64 {
    let mut by_distance: Vec<(u8, u8, f64)> = means
        .iter()
        .map(|&(g, p)| (g.abs_diff(target), g, p))
        .collect();
    by_distance.sort_by_key(|&(d, g, _)| (d, g));

    let k = k.min(by_distance.len()).max(1);
    let cutoff = by_distance[k - 1].0;
    let neighbors: Vec<f64> = by_distance
        .iter()
        .take_while(|&&(d, _, _)| d <= cutoff)
        .map(|&(_, _, p)| p)
        .collect();

    neighbors.iter().sum::<f64>() / neighbors.len() as f64
}

/// Build a listing's pricing grid from sparse observations.
///
/// For each period independently: observed guest counts become `Observed`
/// cells holding the mean of their quotes; remaining guest counts from
/// `guest_counts` are filled by k-nearest-neighbor estimation over the
/// observed counts. A period with fewer than two observed guest counts is
/// flagged low-confidence and its gaps are left unfilled.
///
/// Unavailable quotes carry no price signal and are ignored. The function is
/// pure: same inputs, same grid.
pub fn impute(
    listing_id: &str,
    observations: &[PriceObservation],
    guest_counts: &[u8],
    k: usize,
) -> PricingGrid {
    let mut cells = Vec::new();
    let mut low_confidence = Vec::new();

    for period in [PeriodType::Weekday, PeriodType::Weekend] {
        let usable: Vec<&PriceObservation> = observations
            .iter()
            .filter(|o| o.period == period && o.available && o.price.is_finite())
            .collect();
        let means = guest_means(&usable);

        for &(guests, price) in &means {
            cells.push(PriceCell {
                guests,
                period,
                price,
                source: CellSource::Observed,
            });
        }

        if means.len() < 2 {
            low_confidence.push(period);
            continue;
        }

        for &guests in guest_counts {
            if means.iter().any(|&(g, _)| g == guests) {
                continue;
            }
            cells.push(PriceCell {
                guests,
                period,
                price: knn_estimate(&means, guests, k),
                source: CellSource::Imputed,
            });
        }
    }

    PricingGrid {
        listing_id: listing_id.to_string(),
        cells,
        low_confidence,
    }
}
