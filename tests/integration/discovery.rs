//! Region partitioning and listing discovery.

use crate::support::{controller_for, grid_listings, listing, test_area, test_config, FakeSearchApi};
use doorstep_harvester::harvest::tiles::{partition, PartitionConfig};
use doorstep_harvester::shutdown::ShutdownCoordinator;
use doorstep_harvester::{BoundingBox, Scheduler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn partition_config(result_capacity: u32) -> PartitionConfig {
    PartitionConfig {
        result_capacity,
        min_span_deg: 0.0005,
        max_retries: 3,
    }
}

#[tokio::test]
async fn test_partition_splits_until_every_tile_fits_the_cap() {
    let area = test_area();
    let api = FakeSearchApi::new(grid_listings(1000, &area)).with_capacity(300);
    let config = test_config();
    let controller = controller_for(&config);
    let shutdown = ShutdownCoordinator::shared();

    let outcome = partition(&api, &controller, &shutdown, area, &partition_config(300))
        .await
        .unwrap();

    assert!(outcome.tiles.len() >= 4, "a 1000-listing region must split");
    assert_eq!(outcome.truncated_tiles, 0);
    assert_eq!(outcome.failed_probes, 0);
    assert!(!outcome.cancelled);
    for tile in &outcome.tiles {
        assert!(tile.listing_count <= 300);
        assert!(!tile.truncated);
    }
}

#[tokio::test]
async fn test_partition_accepts_small_regions_whole() {
    let area = test_area();
    let api = FakeSearchApi::new(grid_listings(100, &area)).with_capacity(300);
    let config = test_config();
    let controller = controller_for(&config);
    let shutdown = ShutdownCoordinator::shared();

    let outcome = partition(&api, &controller, &shutdown, area, &partition_config(300))
        .await
        .unwrap();

    assert_eq!(outcome.tiles.len(), 1);
    assert_eq!(outcome.tiles[0].listing_count, 100);
}

#[tokio::test]
async fn test_dense_hotspot_is_accepted_truncated_at_minimum_span() {
    // Every listing sits at one coordinate, so no amount of splitting gets
    // the containing tile under the cap
    let area = test_area();
    let hotspot: Vec<_> = (0..500)
        .map(|i| listing(&format!("h{i}"), 49.4123, 8.5231))
        .collect();
    let api = FakeSearchApi::new(hotspot).with_capacity(240);
    let config = test_config();
    let controller = controller_for(&config);
    let shutdown = ShutdownCoordinator::shared();

    let outcome = partition(&api, &controller, &shutdown, area, &partition_config(240))
        .await
        .unwrap();

    assert!(outcome.truncated_tiles >= 1);
    let truncated: Vec<_> = outcome.tiles.iter().filter(|t| t.truncated).collect();
    assert_eq!(truncated.len(), outcome.truncated_tiles);
    for tile in truncated {
        assert_eq!(tile.listing_count, 500);
        assert!(
            tile.bounds.lat_span() <= 0.0005 || tile.bounds.lng_span() <= 0.0005,
            "truncation only happens at the minimum span"
        );
    }
}

#[tokio::test]
async fn test_discovery_finds_every_listing_exactly_once() {
    let area = test_area();
    let api = Arc::new(FakeSearchApi::new(grid_listings(1000, &area)).with_capacity(300));
    let config = test_config();
    let controller = controller_for(&config);
    let shutdown = ShutdownCoordinator::shared();
    let scheduler = Scheduler::new(api.clone(), controller, shutdown, &config);

    let discovery = scheduler.discover(area).await.unwrap();

    // Tiles overlap at shared edges, yet each listing appears exactly once
    assert_eq!(discovery.listings.len(), 1000);
    assert!(!discovery.cancelled);
    for listing in discovery.listings.listings() {
        assert!(discovery.listings.origin(&listing.id).is_some());
    }
}

#[tokio::test]
async fn test_discovery_pages_past_the_first_page() {
    // 90 listings in one tile means five pages of eighteen
    let area = test_area();
    let api = Arc::new(FakeSearchApi::new(grid_listings(90, &area)).with_capacity(300));
    let config = test_config();
    let controller = controller_for(&config);
    let shutdown = ShutdownCoordinator::shared();
    let scheduler = Scheduler::new(api.clone(), controller, shutdown, &config);

    let discovery = scheduler.discover(area).await.unwrap();
    assert_eq!(discovery.listings.len(), 90);
}

#[tokio::test]
async fn test_partition_covers_random_regions_without_gaps() {
    let mut rng = StdRng::seed_from_u64(20260824);

    for round in 0..8 {
        let sw_lat = rng.gen_range(-60.0..60.0);
        let sw_lng = rng.gen_range(-150.0..150.0);
        let lat_span = rng.gen_range(0.05..0.4);
        let lng_span = rng.gen_range(0.05..0.4);
        let area =
            BoundingBox::new(sw_lat + lat_span, sw_lng + lng_span, sw_lat, sw_lng).unwrap();
        let n = rng.gen_range(50..800);

        let seeded = grid_listings(n, &area);
        let api = Arc::new(FakeSearchApi::new(seeded.clone()).with_capacity(150));
        let mut config = test_config();
        config.result_capacity = 150;
        let scheduler = Scheduler::new(
            api.clone(),
            controller_for(&config),
            ShutdownCoordinator::shared(),
            &config,
        );

        let discovery = scheduler.discover(area).await.unwrap();
        assert_eq!(
            discovery.listings.len(),
            n,
            "round {round}: every seeded listing found exactly once"
        );
        for listing in &seeded {
            assert!(
                discovery.listings.contains(&listing.id),
                "round {round}: listing {} fell through a tile gap",
                listing.id
            );
        }
    }
}

#[tokio::test]
async fn test_failed_probe_leaves_a_counted_coverage_hole() {
    // Block one quadrant's searches outright; its probe gives up terminally
    // and the region is skipped rather than retried forever
    let area = test_area();
    let blocked = BoundingBox::new(49.5, 8.6, 49.4, 8.45).unwrap();
    let seeded = grid_listings(1000, &area);
    let expected_missing = seeded
        .iter()
        .filter(|l| blocked.contains(l.lat, l.lng))
        .count();
    assert!(expected_missing > 0);

    let api = Arc::new(FakeSearchApi::new(seeded).with_capacity(300));
    api.fail_search_within(blocked);
    let config = test_config();
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.harvest(area).await.unwrap();
    assert_eq!(outcome.summary.failed_probes, 1);
    assert_eq!(outcome.summary.discovered_listings, 1000 - expected_missing);
    assert_eq!(outcome.listings.len(), 1000 - expected_missing);
}

#[tokio::test]
async fn test_harvest_outcome_carries_listing_summaries() {
    let area = test_area();
    let seeded = grid_listings(100, &area);
    let api = Arc::new(FakeSearchApi::new(seeded.clone()).with_capacity(300));
    let config = test_config();
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.harvest(area).await.unwrap();
    assert_eq!(outcome.listings.len(), 100);
    assert_eq!(outcome.summary.discovered_listings, 100);
    for listing in &seeded {
        assert!(outcome.listings.iter().any(|l| l.id == listing.id));
    }
    // Summaries keep the fields discovery saw
    assert!(outcome.listings.iter().all(|l| l.title.is_some()));
}
