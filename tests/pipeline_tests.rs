//! End-to-end runs of the sync pipeline against a scripted page.
mod common;

use std::sync::Arc;

use incident_sync::SyncPipeline;
use incident_sync::domain::SessionState;
use incident_sync::infrastructure::browser::BrowserPage;
use incident_sync::infrastructure::storage::{SqliteWriter, SyncWriter};
use serde_json::json;
use sqlx::Row;

use common::{
    ClickEffect, FakePage, RecordingWriter, Scripted, detail_url, incident_json, listing_url,
    scripted_site, test_config,
};

fn pipeline(page: Arc<FakePage>, writer: Option<Arc<dyn SyncWriter>>) -> SyncPipeline {
    let page: Arc<dyn BrowserPage> = page;
    SyncPipeline::new(page, &test_config(), writer)
}

fn sink<W: SyncWriter + 'static>(writer: &Arc<W>) -> Option<Arc<dyn SyncWriter>> {
    let writer: Arc<dyn SyncWriter> = Arc::<W>::clone(writer);
    Some(writer)
}

#[tokio::test]
async fn run_writes_one_row_per_incident_in_listing_order() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301", "302", "303"]));
    let writer = Arc::new(RecordingWriter::default());

    let pipeline = pipeline(Arc::clone(&page), sink(&writer));
    let summary = pipeline.run().await.expect("run succeeds");

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.normalized, 3);
    assert_eq!(summary.written, 3);
    assert!(summary.skipped.is_empty());
    assert!(summary.storage_error.is_none());
    assert!(!summary.dry_run);
    assert_eq!(pipeline.session_state(), SessionState::Authenticated);

    assert_eq!(writer.calls(), 1);
    let ids: Vec<_> = writer.rows().into_iter().map(|r| r.incident_id).collect();
    assert_eq!(ids, vec!["301", "302", "303"]);

    let navigations = page.navigations();
    assert_eq!(navigations[0], config.target.sign_in_url);
    assert_eq!(navigations[1], config.target.list_url);
    assert_eq!(navigations[2], detail_url(&config, "301"));
}

#[tokio::test]
async fn failed_login_aborts_before_any_write() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301"]));
    page.on_click(
        &config.selectors.submit_button,
        ClickEffect {
            texts: vec![(config.selectors.error_banner.clone(), "Invalid email or password".into())],
            ..ClickEffect::default()
        },
    );
    let writer = Arc::new(RecordingWriter::default());

    let pipeline = pipeline(Arc::clone(&page), sink(&writer));
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), "auth_failure");
    assert!(err.to_string().contains("Invalid email or password"));
    assert_eq!(pipeline.session_state(), SessionState::Failed);
    assert_eq!(writer.calls(), 0);
    assert!(!page.navigations().contains(&config.target.list_url));
}

#[tokio::test]
async fn login_without_any_success_signal_times_out_before_any_write() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301"]));
    // Submitting changes nothing: no avatar, no banner, the form stays.
    page.on_click(&config.selectors.submit_button, ClickEffect::default());
    let writer = Arc::new(RecordingWriter::default());

    let pipeline = pipeline(Arc::clone(&page), sink(&writer));
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), "auth_failure");
    assert!(err.to_string().contains("no dashboard indicator"));
    assert_eq!(pipeline.session_state(), SessionState::Failed);
    assert_eq!(writer.calls(), 0);
    let logins = page
        .navigations()
        .iter()
        .filter(|url| **url == config.target.sign_in_url)
        .count();
    assert_eq!(logins, config.retry.login.max_attempts as usize);
    assert!(!page.navigations().contains(&config.target.list_url));
}

#[tokio::test]
async fn loosely_typed_listing_entry_is_still_written() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301", "302", "303"]));
    let mut entries: Vec<_> = ["301", "302", "303"].iter().map(|id| incident_json(id)).collect();
    entries[1]["paged"] = json!(1);
    page.on_navigate(
        &config.target.list_url,
        vec![Scripted::get(listing_url(1), json!({ "incidents": entries }))],
    );
    let writer = Arc::new(RecordingWriter::default());

    let summary = pipeline(Arc::clone(&page), sink(&writer))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.listed, 3);
    assert_eq!(writer.calls(), 1);
    let ids: Vec<_> = writer.rows().into_iter().map(|r| r.incident_id).collect();
    assert_eq!(ids, vec!["301", "302", "303"]);
}

#[tokio::test]
async fn duplicate_listing_ids_reach_storage_once() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301", "301"]));
    let writer = Arc::new(RecordingWriter::default());

    let summary = pipeline(Arc::clone(&page), sink(&writer))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.written, 1);
    let ids: Vec<_> = writer.rows().into_iter().map(|r| r.incident_id).collect();
    assert_eq!(ids, vec!["301"]);
    let visits = page
        .navigations()
        .iter()
        .filter(|url| **url == detail_url(&config, "301"))
        .count();
    assert_eq!(visits, 1);
}

#[tokio::test]
async fn missing_contact_button_skips_only_that_incident() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301", "302", "303"]));
    page.remove_contact_button(&detail_url(&config, "302"));
    let writer = Arc::new(RecordingWriter::default());

    let summary = pipeline(Arc::clone(&page), sink(&writer))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.listed, 3);
    assert_eq!(summary.normalized, 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].incident_id, "302");
    assert!(summary.skipped[0].reason.contains("Contact button"));

    let ids: Vec<_> = writer.rows().into_iter().map(|r| r.incident_id).collect();
    assert_eq!(ids, vec!["301", "303"]);

    // Whole-incident retries re-navigate to the detail page.
    let visits = page
        .navigations()
        .iter()
        .filter(|url| **url == detail_url(&config, "302"))
        .count();
    assert_eq!(visits, config.retry.detail.max_attempts as usize);
}

#[tokio::test]
async fn silent_contact_panel_degrades_to_empty_contacts() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301"]));
    // The button exists but the panel never fires its request.
    page.contact_button(&detail_url(&config, "301"), Vec::new());
    let writer = Arc::new(RecordingWriter::default());

    let summary = pipeline(Arc::clone(&page), sink(&writer))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.normalized, 1);
    assert!(summary.skipped.is_empty());

    let clicks = page
        .clicks()
        .iter()
        .filter(|c| c.starts_with(&config.selectors.contact_button_text))
        .count();
    assert_eq!(clicks, config.retry.contact.max_attempts as usize);
}

#[tokio::test]
async fn dry_run_normalizes_without_writing() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301", "302"]));

    let summary = pipeline(page, None).run().await.expect("run succeeds");

    assert!(summary.dry_run);
    assert_eq!(summary.normalized, 2);
    assert_eq!(summary.written, 0);
    assert!(summary.storage_error.is_none());
}

#[tokio::test]
async fn storage_failure_is_reported_in_the_summary() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &["301"]));
    let writer = Arc::new(RecordingWriter::failing("upstream unavailable"));

    let summary = pipeline(page, sink(&writer))
        .run()
        .await
        .expect("storage errors do not abort the run");

    assert_eq!(writer.calls(), 1);
    assert_eq!(summary.written, 0);
    assert!(
        summary
            .storage_error
            .as_deref()
            .is_some_and(|e| e.contains("upstream unavailable"))
    );
}

#[tokio::test]
async fn empty_listing_makes_no_write() {
    let config = test_config();
    let page = Arc::new(scripted_site(&config, &[]));
    let writer = Arc::new(RecordingWriter::default());

    let summary = pipeline(page, sink(&writer))
        .run()
        .await
        .expect("run succeeds");

    assert_eq!(summary.listed, 0);
    assert_eq!(writer.calls(), 0);
}

#[tokio::test]
async fn rerunning_into_sqlite_keeps_one_row_per_incident() {
    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(
        SqliteWriter::open(&dir.path().join("incidents.db"), "incidents")
            .await
            .unwrap(),
    );

    for _ in 0..2 {
        let page = Arc::new(scripted_site(&config, &["301", "302"]));
        let summary = pipeline(page, sink(&writer))
            .run()
            .await
            .expect("run succeeds");
        assert_eq!(summary.written, 2);
    }

    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM incidents")
        .fetch_one(writer.pool())
        .await
        .unwrap()
        .get("n");
    assert_eq!(count, 2);
}
