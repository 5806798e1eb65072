use std::collections::VecDeque;
use std::sync::Arc;

use epfl_ws_sync::db;
use epfl_ws_sync::feed::{FeedError, FeedItem, FeedSource};
use epfl_ws_sync::memento::{EventTime, MementoEvent};
use epfl_ws_sync::model::{Channel, ChannelKind, Identity, MetaValue, RetentionPolicy};
use epfl_ws_sync::reconcile::{sync_all, sync_channel};
use reqwest::{StatusCode, Url};
use serde_json::json;
use tokio::sync::Mutex;

const STI_EVENTS: &str = "https://memento.epfl.ch/api/jahia/mementos/sti/events/en/?format=json";
const ICAL: &str = "https://memento.epfl.ch/event/export/";

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn allowed() -> Vec<String> {
    vec!["memento.epfl.ch".into(), "actu.epfl.ch".into()]
}

#[derive(Clone, Default)]
struct RecordingFeed {
    responses: Arc<Mutex<VecDeque<Result<Vec<FeedItem>, FeedError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingFeed {
    fn with_responses(responses: Vec<Result<Vec<FeedItem>, FeedError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl FeedSource for RecordingFeed {
    async fn fetch(&self, url: &Url) -> Result<Vec<FeedItem>, FeedError> {
        self.calls.lock().await.push(url.to_string());
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn event(id: i64, lang: &str, title: &str) -> FeedItem {
    FeedItem::from(json!({
        "event_id": id,
        "lang": lang,
        "title": title,
        "description": format!("<p>{}</p>", title),
        "event_visual_absolute_url": format!("https://memento.epfl.ch/image/{}.jpg", id),
        "event_start_date": "2020-01-01",
        "event_start_time": "14:00:00",
        "event_end_date": "2020-01-01",
        "event_place_and_room": "BC 420",
        "translation_id": id * 10,
        "event_is_internal": "false",
        "event_canceled": "FALSE",
        "event_organizer": "not kept",
    }))
}

async fn memento_channel(pool: &sqlx::SqlitePool, name: &str) -> Channel {
    let id = db::insert_channel(pool, ChannelKind::Memento, name, STI_EVENTS, Some("en"))
        .await
        .unwrap();
    db::fetch_channel(pool, id).await.unwrap().unwrap()
}

#[tokio::test]
async fn first_sync_creates_records_with_projected_meta() {
    let pool = setup_pool().await;
    let channel = memento_channel(&pool, "STI").await;
    let feed = RecordingFeed::with_responses(vec![Ok(vec![
        event(1, "en", "Robotics Day"),
        event(2, "en", "Open Lab"),
    ])]);

    let report = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(feed.calls().await, vec![STI_EVENTS.to_string()]);

    let records = db::list_channel_records(&pool, channel.id).await.unwrap();
    assert_eq!(records.len(), 2);
    let first = &records[0];
    assert_eq!(first.external_id, "1");
    assert_eq!(first.title.as_deref(), Some("Robotics Day"));
    assert_eq!(first.body.as_deref(), Some("<p>Robotics Day</p>"));
    assert_eq!(
        first.image_url.as_deref(),
        Some("https://memento.epfl.ch/image/1.jpg")
    );
    assert_eq!(first.meta.get("translation_id"), Some(&MetaValue::Text("10".into())));
    assert_eq!(first.meta.get("event_canceled"), Some(&MetaValue::Flag(false)));
    assert!(first.meta.get("event_organizer").is_none());

    let ev = MementoEvent::new(first, ICAL);
    assert!(matches!(ev.start(), Some(EventTime::At(_))));
    assert!(matches!(ev.end(), Some(EventTime::Day(_))));
    assert_eq!(ev.venue(), Some("BC 420"));
    assert_eq!(
        ev.ical_link().as_deref(),
        Some("https://memento.epfl.ch/event/export/10")
    );

    let run = db::last_sync_run(&pool, channel.id).await.unwrap().unwrap();
    assert!(run.succeeded());
    assert_eq!(run.created, 2);
}

#[tokio::test]
async fn reconciling_identical_input_twice_is_idempotent() {
    let pool = setup_pool().await;
    let channel = memento_channel(&pool, "STI").await;
    let items = vec![event(1, "en", "Robotics Day"), event(2, "fr", "Journée")];
    let feed = RecordingFeed::with_responses(vec![Ok(items.clone()), Ok(items)]);

    sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    let before = db::list_channel_records(&pool, channel.id).await.unwrap();

    let report = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 2);

    let after = db::list_channel_records(&pool, channel.id).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(db::count_records(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn same_identity_updates_instead_of_duplicating() {
    let pool = setup_pool().await;
    let channel = memento_channel(&pool, "STI").await;

    let mut changed = event(1, "en", "Robotics Day (moved)");
    changed.0.insert("event_canceled".into(), json!("true"));
    changed.0.insert("event_canceled_reason".into(), json!("Weather"));
    changed.0.remove("event_place_and_room");

    let feed = RecordingFeed::with_responses(vec![
        Ok(vec![event(1, "en", "Robotics Day")]),
        Ok(vec![changed, event(1, "fr", "Journée robotique")]),
    ]);

    sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    let original = db::find_record(
        &pool,
        "epfl-memento",
        &Identity {
            external_id: "1".into(),
            lang: "en".into(),
        },
    )
    .await
    .unwrap()
    .unwrap();

    let report = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 1, "other language is a different record");

    let updated = db::fetch_record(&pool, original.id).await.unwrap().unwrap();
    assert_eq!(updated.title.as_deref(), Some("Robotics Day (moved)"));
    assert!(updated.meta_flag("event_canceled"));
    assert_eq!(updated.meta_text("event_canceled_reason"), Some("Weather"));
    assert_eq!(updated.meta_text("event_place_and_room"), None, "meta set is replaced");
    assert_eq!(db::count_records(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn items_without_identity_are_skipped() {
    let pool = setup_pool().await;
    let id = db::insert_channel(
        &pool,
        ChannelKind::Memento,
        "No lang",
        "https://memento.epfl.ch/api/v1/events/?format=json",
        None,
    )
    .await
    .unwrap();
    let channel = db::fetch_channel(&pool, id).await.unwrap().unwrap();

    let feed = RecordingFeed::with_responses(vec![Ok(vec![
        FeedItem::from(json!({ "title": "no id", "lang": "en" })),
        FeedItem::from(json!({ "event_id": 5, "title": "no lang" })),
        event(6, "en", "fine"),
    ])]);
    let report = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.created, 1);
}

#[tokio::test]
async fn disallowed_host_is_rejected_before_fetching() {
    let pool = setup_pool().await;
    let id = db::insert_channel(
        &pool,
        ChannelKind::Memento,
        "Elsewhere",
        "https://events.example.com/api/?format=json",
        None,
    )
    .await
    .unwrap();
    let channel = db::fetch_channel(&pool, id).await.unwrap().unwrap();
    let feed = RecordingFeed::with_responses(vec![Ok(vec![event(1, "en", "never")])]);

    let err = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap_err();
    let feed_err = err.downcast_ref::<FeedError>().unwrap();
    assert!(feed_err.is_invalid_url());

    assert!(feed.calls().await.is_empty());
    assert_eq!(db::count_records(&pool).await.unwrap(), 0);
    let run = db::last_sync_run(&pool, id).await.unwrap().unwrap();
    assert!(!run.succeeded());
    assert!(run.error.unwrap().contains("events.example.com"));
}

#[tokio::test]
async fn fetch_failure_leaves_existing_records_alone() {
    let pool = setup_pool().await;
    let channel = memento_channel(&pool, "STI").await;
    let feed = RecordingFeed::with_responses(vec![
        Ok(vec![event(1, "en", "Robotics Day")]),
        Err(FeedError::Status {
            status: StatusCode::BAD_GATEWAY,
            url: STI_EVENTS.into(),
        }),
    ]);

    sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Prune)
        .await
        .unwrap();
    let before = db::list_channel_records(&pool, channel.id).await.unwrap();

    let err = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Prune)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fetch failure"));

    let after = db::list_channel_records(&pool, channel.id).await.unwrap();
    assert_eq!(before, after);
    let run = db::last_sync_run(&pool, channel.id).await.unwrap().unwrap();
    assert!(run.error.is_some());
}

#[tokio::test]
async fn retain_policy_keeps_vanished_items() {
    let pool = setup_pool().await;
    let channel = memento_channel(&pool, "STI").await;
    let feed = RecordingFeed::with_responses(vec![
        Ok(vec![event(1, "en", "One"), event(2, "en", "Two")]),
        Ok(vec![event(1, "en", "One")]),
    ]);

    sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    let report = sync_channel(&pool, &feed, &allowed(), &channel, RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(db::list_channel_records(&pool, channel.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn prune_policy_only_drops_unseen_memberships_of_the_synced_channel() {
    let pool = setup_pool().await;
    let sti = memento_channel(&pool, "STI").await;
    let ic = memento_channel(&pool, "IC").await;

    let feed = RecordingFeed::with_responses(vec![
        // STI sees 1, 2, 3; IC sees 2.
        Ok(vec![event(1, "en", "One"), event(2, "en", "Two"), event(3, "en", "Three")]),
        Ok(vec![event(2, "en", "Two")]),
        // STI now only sees 1.
        Ok(vec![event(1, "en", "One")]),
    ]);

    sync_channel(&pool, &feed, &allowed(), &sti, RetentionPolicy::Prune)
        .await
        .unwrap();
    sync_channel(&pool, &feed, &allowed(), &ic, RetentionPolicy::Prune)
        .await
        .unwrap();
    let report = sync_channel(&pool, &feed, &allowed(), &sti, RetentionPolicy::Prune)
        .await
        .unwrap();
    assert_eq!(report.removed, 2);

    let sti_records = db::list_channel_records(&pool, sti.id).await.unwrap();
    assert_eq!(
        sti_records.iter().map(|r| r.external_id.as_str()).collect::<Vec<_>>(),
        vec!["1"]
    );
    let ic_records = db::list_channel_records(&pool, ic.id).await.unwrap();
    assert_eq!(ic_records.len(), 1);
    assert_eq!(ic_records[0].external_id, "2");
    // Event 3 had no other channel and is gone; event 2 survives through IC.
    assert_eq!(db::count_records(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn sync_all_continues_past_a_failing_channel() {
    let pool = setup_pool().await;
    let bad = db::insert_channel(
        &pool,
        ChannelKind::Memento,
        "Bad",
        "https://events.example.com/feed",
        None,
    )
    .await
    .unwrap();
    let good = memento_channel(&pool, "STI").await;
    let feed = RecordingFeed::with_responses(vec![Ok(vec![event(1, "en", "One")])]);

    let outcome = sync_all(&pool, &feed, &allowed(), RetentionPolicy::Retain)
        .await
        .unwrap();
    assert_eq!(outcome.failed, vec![bad]);
    assert_eq!(outcome.succeeded.len(), 1);
    assert_eq!(outcome.succeeded[0].channel_id, good.id);
    assert_eq!(outcome.succeeded[0].created, 1);
}
