//! Listing capture and pagination against a scripted page.
mod common;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use incident_sync::application::{ListTraversal, ListingConfig, ResponseMatcher};
use incident_sync::infrastructure::browser::BrowserPage;
use incident_sync::infrastructure::config::{AppConfig, PaginationKind};

use common::{ClickEffect, FakePage, ORIGIN, Scripted, incident_json, listing_url, test_config};

fn traversal(page: &Arc<FakePage>, config: &AppConfig) -> ListTraversal {
    let page: Arc<dyn BrowserPage> = Arc::<FakePage>::clone(page);
    ListTraversal::new(
        Arc::clone(&page),
        ListingConfig::from_app_config(config),
        ResponseMatcher::new(page),
    )
}

fn page_button(config: &AppConfig, n: u32) -> String {
    config.selectors.page_button.replace("{n}", &n.to_string())
}

fn listing_body(ids: &[&str]) -> serde_json::Value {
    json!({"incidents": ids.iter().map(|id| incident_json(id)).collect::<Vec<_>>()})
}

/// First page from navigation, later pages behind their page-N buttons.
fn paged_site(config: &AppConfig, pages: &[&[&str]]) -> FakePage {
    let page = FakePage::new();
    if let Some(first) = pages.first() {
        page.on_navigate(
            &config.target.list_url,
            vec![
                Scripted::get(format!("{ORIGIN}/api/incident/1/comments"), json!({"comments": []})),
                Scripted::get(listing_url(1), listing_body(first)),
            ],
        );
    }
    for (index, ids) in pages.iter().enumerate().skip(1) {
        let number = u32::try_from(index + 1).unwrap();
        let selector = page_button(config, number);
        page.show(&selector);
        page.on_click(
            &selector,
            ClickEffect {
                responses: vec![Scripted::get(listing_url(number), listing_body(ids))],
                ..ClickEffect::default()
            },
        );
    }
    page
}

fn ids_of(incidents: &[incident_sync::domain::IncidentSummary]) -> Vec<String> {
    incidents.iter().map(|i| i.incident_id.to_string()).collect()
}

#[tokio::test]
async fn accumulates_pages_in_order_until_no_control() {
    let config = test_config();
    let page = Arc::new(paged_site(&config, &[&["1", "2"], &["3"], &["4", "5"]]));

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["1", "2", "3", "4", "5"]);
    assert!(page.clicks().contains(&page_button(&config, 3)));
    assert!(!page.clicks().contains(&page_button(&config, 4)));
}

#[tokio::test]
async fn first_page_only_never_clicks_pagination() {
    let mut config = test_config();
    config.listing.pagination = PaginationKind::FirstPageOnly;
    let page = Arc::new(paged_site(&config, &[&["1", "2"], &["3"]]));

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["1", "2"]);
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn max_pages_caps_the_traversal() {
    let mut config = test_config();
    config.listing.max_pages = 2;
    let page = Arc::new(paged_site(&config, &[&["1"], &["2"], &["3"]]));

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["1", "2"]);
    assert!(!page.clicks().contains(&page_button(&config, 3)));
}

#[tokio::test]
async fn pages_stream_yields_one_item_per_page() {
    let config = test_config();
    let page = Arc::new(paged_site(&config, &[&["1", "2"], &["3"]]));
    let traversal = traversal(&page, &config);

    let pages: Vec<_> = traversal.pages().collect().await;

    assert_eq!(pages.len(), 2);
    assert_eq!(ids_of(pages[0].as_ref().unwrap()), vec!["1", "2"]);
    assert_eq!(ids_of(pages[1].as_ref().unwrap()), vec!["3"]);
}

#[tokio::test]
async fn first_page_failure_aborts_the_listing() {
    let mut config = test_config();
    config.retry.listing.max_attempts = 2;
    let page = Arc::new(FakePage::new());

    let err = traversal(&page, &config).collect_listing().await.unwrap_err();

    assert_eq!(err.kind(), "correlation_timeout");
    assert_eq!(page.navigations().len(), 2);
}

#[tokio::test]
async fn later_page_failure_keeps_earlier_pages() {
    let mut config = test_config();
    config.retry.listing.max_attempts = 2;
    let page = Arc::new(paged_site(&config, &[&["1"], &["2"]]));
    // Page 3's control exists but never produces a listing response.
    page.show(&page_button(&config, 3));

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["1", "2"]);
    let retries = page
        .clicks()
        .iter()
        .filter(|c| **c == page_button(&config, 3))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn numeric_ids_decode_like_strings() {
    let config = test_config();
    let page = Arc::new(FakePage::new());
    page.on_navigate(
        &config.target.list_url,
        vec![Scripted::get(
            listing_url(1),
            json!({"incidents": [{"IncidentId": 4711}, {"IncidentId": "4712"}]}),
        )],
    );

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();
    assert_eq!(ids_of(&incidents), vec!["4711", "4712"]);
}

#[tokio::test]
async fn unreadable_entry_is_skipped_and_its_neighbours_kept() {
    let config = test_config();
    let page = Arc::new(FakePage::new());
    let mut loosely_typed = incident_json("4712");
    loosely_typed["paged"] = json!(1);
    loosely_typed["createdAt"] = json!(1_714_557_600);
    page.on_navigate(
        &config.target.list_url,
        vec![Scripted::get(
            listing_url(1),
            json!({"incidents": [
                incident_json("4711"),
                {"IncidentId": null, "presetLabel": "Fire"},
                loosely_typed,
                ["not", "an", "incident"],
                incident_json("4713")
            ]}),
        )],
    );

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["4711", "4712", "4713"]);
    assert_eq!(incidents[1].paged, Some(true));
    assert_eq!(incidents[1].created_at.as_deref(), Some("1714557600"));
    // Decoded on the first attempt, no retry of the page.
    assert_eq!(page.navigations().len(), 1);
}

#[tokio::test]
async fn incident_repeated_on_a_later_page_is_listed_once() {
    let config = test_config();
    // "2" shifted from page 1 onto page 2 between the two requests.
    let page = Arc::new(paged_site(&config, &[&["1", "2"], &["2", "3"]]));

    let incidents = traversal(&page, &config).collect_listing().await.unwrap();

    assert_eq!(ids_of(&incidents), vec!["1", "2", "3"]);
}
