//! Retry budgets and failure classification during collection.

use crate::support::{controller_for, listing, test_config, FakeSearchApi};
use doorstep_harvester::harvest::dedup::ListingSet;
use doorstep_harvester::harvest::JobStatus;
use doorstep_harvester::shutdown::ShutdownCoordinator;
use doorstep_harvester::Scheduler;
use std::sync::Arc;

fn one_listing_set(id: &str) -> ListingSet {
    let mut set = ListingSet::new();
    set.merge_page(0, &[listing(id, 49.4, 8.5)]);
    set
}

#[tokio::test]
async fn test_transient_failures_under_budget_still_succeed() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.fail_transient("l1", 2);

    let mut config = test_config();
    config.scrape_calendar = true;
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.run(&one_listing_set("l1")).await;
    assert_eq!(outcome.reports.len(), 1);

    let report = &outcome.reports[0];
    assert_eq!(report.job.status, JobStatus::Succeeded);
    assert_eq!(report.job.attempts, 3);
    assert!(report.data.is_some());
    assert_eq!(api.detail_calls("l1"), 3);
}

#[tokio::test]
async fn test_exhausted_budget_escalates_to_terminal_and_stops_calling() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.fail_transient("l1", 100);

    let mut config = test_config();
    config.scrape_calendar = true;
    config.max_retries = 3;
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.run(&one_listing_set("l1")).await;
    let report = &outcome.reports[0];
    assert_eq!(report.job.status, JobStatus::FailedTerminal);
    assert!(report.job.error.is_some());
    assert!(report.data.is_none());

    // Budget of three retries means four attempts, and the job is never
    // resubmitted afterwards
    assert_eq!(report.job.attempts, 4);
    assert_eq!(api.detail_calls("l1"), 4);
    assert_eq!(outcome.summary.failed, 1);
}

#[tokio::test]
async fn test_terminal_failure_is_not_retried() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.fail_terminal("l1");

    let mut config = test_config();
    config.scrape_calendar = true;
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.run(&one_listing_set("l1")).await;
    let report = &outcome.reports[0];
    assert_eq!(report.job.status, JobStatus::FailedTerminal);
    assert_eq!(report.job.attempts, 1);
    assert_eq!(api.detail_calls("l1"), 1);
}

#[tokio::test]
async fn test_one_listing_failure_does_not_poison_the_rest() {
    let api = Arc::new(FakeSearchApi::new(Vec::new()));
    api.fail_terminal("bad");

    let mut set = ListingSet::new();
    set.merge_page(0, &[listing("good1", 49.4, 8.5)]);
    set.merge_page(0, &[listing("bad", 49.41, 8.51)]);
    set.merge_page(0, &[listing("good2", 49.42, 8.52)]);

    let mut config = test_config();
    config.scrape_calendar = true;
    config.scrape_amenities = true;
    let scheduler = Scheduler::new(
        api.clone(),
        controller_for(&config),
        ShutdownCoordinator::shared(),
        &config,
    );

    let outcome = scheduler.run(&set).await;
    // Two categories over three listings
    assert_eq!(outcome.reports.len(), 6);
    assert_eq!(outcome.summary.succeeded, 4);
    assert_eq!(outcome.summary.failed, 2);
    assert!(outcome
        .summary
        .failures
        .iter()
        .all(|(id, _)| id == "bad"));
}
