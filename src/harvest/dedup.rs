//! Duplicate-free listing set across tiles.
//!
//! Tiles overlap at their shared edges and the upstream sometimes returns
//! the same listing from adjacent regions, so every page of search results
//! passes through a [`ListingSet`] that keeps only the first sighting.

use crate::Listing;
use std::collections::HashMap;

/// An insertion-ordered, duplicate-free collection of listings.
///
/// The first sighting of an ID wins; later sightings are dropped even when
/// their field values differ. Merging the same page twice is a no-op.
#[derive(Debug, Default)]
pub struct ListingSet {
    by_id: HashMap<String, usize>,
    listings: Vec<Listing>,
    origins: Vec<usize>,
}

impl ListingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one page of results discovered in `tile_index`.
    ///
    /// Returns how many listings were new.
    pub fn merge_page(&mut self, tile_index: usize, page: &[Listing]) -> usize {
        let mut added = 0;
        for listing in page {
            if self.by_id.contains_key(&listing.id) {
                continue;
            }
            self.by_id.insert(listing.id.clone(), self.listings.len());
            self.listings.push(listing.clone());
            self.origins.push(tile_index);
            added += 1;
        }
        added
    }

    /// Number of unique listings.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// All listings in discovery order.
    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    /// The tile index a listing was first discovered in.
    pub fn origin(&self, listing_id: &str) -> Option<usize> {
        self.by_id.get(listing_id).map(|&i| self.origins[i])
    }

    /// Whether the set contains an ID.
    pub fn contains(&self, listing_id: &str) -> bool {
        self.by_id.contains_key(listing_id)
    }
}
