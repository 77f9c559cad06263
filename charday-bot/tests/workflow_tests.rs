//! End-to-end daily workflow against in-memory collaborators

mod helpers;

use chrono::{Duration as ChronoDuration, NaiveDate};
use charday_bot::catalog::CatalogSeries;
use charday_bot::lifecycle::{LifecycleError, StateStore};
use charday_bot::workflow::prepare::NO_IMAGE_REASON;
use charday_bot::{SlotOutcome, WorkflowError};
use charday_common::PostStatus;
use helpers::{files_in, harness, member, raw, record, with_image, FakeCatalog, FakePoster};

const GETO_URL: &str = "https://source.example/geto.png";
const GOJO_URL: &str = "https://source.example/gojo.png";
const YUJI_URL: &str = "https://source.example/yuji.png";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 3).unwrap()
}

/// Bleach is in the catalog but its roster has no Geto; the global search
/// finds him in Jujutsu Kaisen.
fn misattributed_catalog() -> FakeCatalog {
    let mut catalog = FakeCatalog::default();
    catalog
        .series
        .insert("Bleach".into(), CatalogSeries { id: 3, title: "Bleach".into() });
    catalog
        .rosters
        .insert(3, vec![member(30, "Ichigo Kurosaki", &["Bleach"])]);
    catalog.search.insert(
        "Geto Suguru".into(),
        vec![member(77, "Suguru Getou", &["Jujutsu Kaisen"])],
    );
    catalog.records.insert(
        77,
        record(
            77,
            "Suguru Getou",
            &["Jujutsu Kaisen"],
            "A special grade curse user who left Jujutsu High.",
        ),
    );
    catalog
}

#[tokio::test]
async fn test_wrong_series_guess_posts_under_catalog_series() {
    let h = harness(
        vec![with_image(raw("mal-1", "Geto Suguru", Some("Bleach"), 900), GETO_URL)],
        misattributed_catalog(),
        &[(GETO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );

    let state = h.workflow.prepare(date()).await.unwrap();
    let post = state.post(0).unwrap();

    assert_eq!(post.character_name, "Suguru Getou");
    assert_eq!(post.series_name, "Jujutsu Kaisen");
    assert_eq!(post.catalog_id, Some(77));
    assert_eq!(post.status, PostStatus::Pending);

    // The unconfirmed biography never reaches the caption
    let preview = post.preview_text.clone().unwrap();
    assert!(preview.contains("Jujutsu Kaisen"));
    assert!(!preview.contains("special grade"));
    assert!(!preview.contains("Bleach"));
}

#[tokio::test]
async fn test_slots_follow_popularity_and_skip_imageless() {
    let h = harness(
        vec![
            with_image(raw("b", "Yuji Itadori", None, 300), YUJI_URL),
            raw("a", "Faceless Extra", None, 5000),
            with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL),
            with_image(raw("d", "Unused Spare", None, 10), "https://source.example/d.png"),
        ],
        FakeCatalog::default(),
        &[(YUJI_URL, 400, 400), (GOJO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00", "12:00"],
    );

    let state = h.workflow.prepare(date()).await.unwrap();

    let ids: Vec<_> = state
        .posts
        .iter()
        .map(|p| p.character_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["c", "b"]);
    assert_eq!(state.skipped.len(), 1);
    assert_eq!(state.skipped[0].character_id, "a");
    assert_eq!(state.skipped[0].reason, NO_IMAGE_REASON);

    // Without catalog data the source's own fields are used
    assert_eq!(state.posts[0].character_name, "Satoru Gojo");
    assert_eq!(state.posts[0].image_provider.as_deref(), Some("source-full"));
}

#[tokio::test]
async fn test_publish_slot_is_idempotent() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );
    let state = h.workflow.prepare(date()).await.unwrap();
    let image = state.posts[0].image_reference.clone().unwrap();
    assert!(image.exists());

    let first = h.workflow.publish_slot(date(), 0).await.unwrap();
    assert!(matches!(first, SlotOutcome::Posted { ref external_id, .. } if external_id == "post-1"));
    assert!(!image.exists());

    let second = h.workflow.publish_slot(date(), 0).await.unwrap();
    assert_eq!(second, SlotOutcome::AlreadyPosted);
    assert_eq!(h.poster.published().len(), 1);

    let stored = h.store.load(date()).await.unwrap().unwrap();
    let post = stored.post(0).unwrap();
    assert_eq!(post.status, PostStatus::Posted);
    assert_eq!(post.external_post_id.as_deref(), Some("post-1"));
    assert!(post.posted_at.is_some());
}

#[tokio::test]
async fn test_failed_publish_marks_error_and_cleans_up() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400)],
        FakePoster::failing(),
        &["08:00"],
    );
    h.workflow.prepare(date()).await.unwrap();

    let outcome = h.workflow.publish_slot(date(), 0).await.unwrap();
    assert!(matches!(outcome, SlotOutcome::Failed(ref reason) if reason.contains("503")));

    let stored = h.store.load(date()).await.unwrap().unwrap();
    let post = stored.post(0).unwrap();
    assert_eq!(post.status, PostStatus::Error);
    assert!(post.error_message.as_deref().unwrap().contains("service unavailable"));
    assert!(files_in(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_unknown_slot_is_an_error() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );
    h.workflow.prepare(date()).await.unwrap();

    assert!(h.workflow.publish_slot(date(), 5).await.is_err());
    assert!(h.workflow.publish_slot(date().succ_opt().unwrap(), 0).await.is_err());
    assert!(h.poster.published().is_empty());
}

#[tokio::test]
async fn test_repreparation_keeps_posted_slot() {
    let h = harness(
        vec![
            with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL),
            with_image(raw("b", "Yuji Itadori", None, 300), YUJI_URL),
        ],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400), (YUJI_URL, 400, 400)],
        FakePoster::default(),
        &["08:00", "12:00"],
    );
    h.workflow.prepare(date()).await.unwrap();
    h.workflow.publish_slot(date(), 0).await.unwrap();

    // The scraper now ranks Yuji first
    h.source.replace(vec![
        with_image(raw("b", "Yuji Itadori", None, 9000), YUJI_URL),
        with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL),
    ]);
    let state = h.workflow.prepare(date()).await.unwrap();

    let slot0 = state.post(0).unwrap();
    assert_eq!(slot0.character_id.as_deref(), Some("c"));
    assert_eq!(slot0.status, PostStatus::Posted);
    assert_eq!(slot0.external_post_id.as_deref(), Some("post-1"));

    // Gojo is never scheduled twice on the same day
    let gojo_slots = state
        .posts
        .iter()
        .filter(|p| p.character_id.as_deref() == Some("c"))
        .count();
    assert_eq!(gojo_slots, 1);

    // Yuji moves into the free slot rather than being lost
    let slot1 = state.post(1).unwrap();
    assert_eq!(slot1.character_id.as_deref(), Some("b"));
    assert_eq!(slot1.status, PostStatus::Pending);
    assert!(slot1.image_reference.as_ref().unwrap().exists());
    assert!(state.skipped.is_empty());
}

#[tokio::test]
async fn test_recovery_reuses_persisted_day() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400), (YUJI_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );
    let prepared = h.workflow.prepare(date()).await.unwrap();

    h.source
        .replace(vec![with_image(raw("b", "Yuji Itadori", None, 9000), YUJI_URL)]);
    let recovered = h.workflow.prepare_or_recover(date()).await.unwrap();

    assert_eq!(recovered, prepared);
}

#[tokio::test]
async fn test_run_day_leaves_long_missed_slots_pending() {
    let h = harness(
        vec![
            with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL),
            with_image(raw("b", "Yuji Itadori", None, 300), YUJI_URL),
        ],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400), (YUJI_URL, 400, 400)],
        FakePoster::default(),
        &["08:00", "12:00"],
    );
    let past = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();

    let summary = h
        .workflow
        .run_day(past, ChronoDuration::minutes(30))
        .await
        .unwrap();

    assert_eq!(summary.missed, vec![0, 1]);
    assert!(summary.posted.is_empty());
    assert!(h.poster.published().is_empty());

    let stored = h.store.load(past).await.unwrap().unwrap();
    assert!(stored.posts.iter().all(|p| p.status == PostStatus::Pending));
}

#[tokio::test]
async fn test_unreadable_store_aborts_publish() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );
    h.workflow.prepare(date()).await.unwrap();

    h.store.fail_loads(true);
    let result = h.workflow.publish_slot(date(), 0).await;

    assert!(matches!(
        result,
        Err(WorkflowError::Lifecycle(LifecycleError::Store(_)))
    ));
    assert!(h.poster.published().is_empty());

    // Nothing was recorded while the store was down
    h.store.fail_loads(false);
    let stored = h.store.load(date()).await.unwrap().unwrap();
    assert_eq!(stored.post(0).unwrap().status, PostStatus::Pending);
}

#[tokio::test]
async fn test_unwritable_store_aborts_prepare() {
    let h = harness(
        vec![with_image(raw("c", "Satoru Gojo", None, 800), GOJO_URL)],
        FakeCatalog::default(),
        &[(GOJO_URL, 400, 400)],
        FakePoster::default(),
        &["08:00"],
    );

    h.store.fail_saves(true);
    let result = h.workflow.prepare(date()).await;

    assert!(matches!(
        result,
        Err(WorkflowError::Lifecycle(LifecycleError::Store(_)))
    ));
    h.store.fail_saves(false);
    assert!(h.store.load(date()).await.unwrap().is_none());

    // A day that was never persisted cannot be published
    assert!(h.workflow.publish_slot(date(), 0).await.is_err());
    assert!(h.poster.published().is_empty());
}
