//! Preview mode: capped, spread-out sampling instead of a full harvest.

use crate::support::{controller_for, grid_listings, listing, test_area, test_config, FakeSearchApi};
use doorstep_harvester::harvest::dedup::ListingSet;
use doorstep_harvester::harvest::{CategoryData, JobStatus};
use doorstep_harvester::shutdown::ShutdownCoordinator;
use doorstep_harvester::Scheduler;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_preview_caps_jobs_and_spreads_the_sample() {
    let area = test_area();
    let api = Arc::new(FakeSearchApi::new(grid_listings(500, &area)).with_capacity(120));
    let mut config = test_config();
    config.scrape_calendar = true;
    config.is_web_preview = true;
    config.preview_cap = 50;
    config.result_capacity = 120;

    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );
    let discovery = scheduler.discover(area).await.unwrap();
    assert_eq!(discovery.listings.len(), 500);

    let outcome = scheduler.run(&discovery.listings).await;
    assert_eq!(outcome.reports.len(), 50);
    assert_eq!(outcome.summary.succeeded, 50);

    let sampled: HashSet<&str> = outcome
        .reports
        .iter()
        .map(|r| r.job.listing_id.as_str())
        .collect();
    assert_eq!(sampled.len(), 50, "sampling must not repeat listings");

    // The sample is not just the first fifty in discovery order
    let all = discovery.listings.listings();
    let first_fifty: HashSet<&str> = all[..50].iter().map(|l| l.id.as_str()).collect();
    assert!(sampled.iter().any(|id| !first_fifty.contains(id)));

    // And it spans more than one tile of the partition
    let origins: HashSet<usize> = sampled
        .iter()
        .filter_map(|id| discovery.listings.origin(id))
        .collect();
    assert!(origins.len() > 1, "preview sample must cross tiles");
}

#[tokio::test]
async fn test_preview_is_a_no_op_for_small_sets() {
    let area = test_area();
    let api = Arc::new(FakeSearchApi::new(grid_listings(20, &area)));
    let mut config = test_config();
    config.scrape_calendar = true;
    config.is_web_preview = true;
    config.preview_cap = 50;

    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );
    let discovery = scheduler.discover(area).await.unwrap();
    let outcome = scheduler.run(&discovery.listings).await;
    assert_eq!(outcome.reports.len(), 20);
}

#[tokio::test]
async fn test_preview_caps_reviews_per_listing() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.set_reviews("l1", 100);

    let mut set = ListingSet::new();
    set.merge_page(0, &[listing("l1", 49.4, 8.5)]);

    let mut config = test_config();
    config.scrape_reviews = true;
    config.is_web_preview = true;
    config.review_preview_cap = 20;

    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );
    let outcome = scheduler.run(&set).await;

    let report = &outcome.reports[0];
    assert_eq!(report.job.status, JobStatus::Succeeded);
    match report.data.as_ref().unwrap() {
        CategoryData::Reviews(reviews) => assert_eq!(reviews.len(), 20),
        other => panic!("expected reviews, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_mode_drains_all_review_pages() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.set_reviews("l1", 60);

    let mut set = ListingSet::new();
    set.merge_page(0, &[listing("l1", 49.4, 8.5)]);

    let mut config = test_config();
    config.scrape_reviews = true;

    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );
    let outcome = scheduler.run(&set).await;

    match outcome.reports[0].data.as_ref().unwrap() {
        CategoryData::Reviews(reviews) => {
            assert_eq!(reviews.len(), 60);
            // Three pages of twenty-four, twenty-four, and twelve
            assert_eq!(api.detail_calls("l1"), 3);
        }
        other => panic!("expected reviews, got {other:?}"),
    }
}
