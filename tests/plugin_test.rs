use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use epfl_ws_sync::actu::ActuQuery;
use epfl_ws_sync::config::{self, Config};
use epfl_ws_sync::db;
use epfl_ws_sync::feed::{FeedError, FeedItem, FeedSource};
use epfl_ws_sync::model::ChannelKind;
use epfl_ws_sync::plugin::Plugin;
use epfl_ws_sync::shortcode;
use reqwest::{StatusCode, Url};
use serde_json::json;
use tokio::sync::Mutex;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
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

async fn plugin_with(feed: &RecordingFeed, cfg: &Config) -> Plugin {
    let pool = setup_pool().await;
    Plugin::new(pool, cfg, Arc::new(feed.clone())).unwrap()
}

fn example_cfg() -> Config {
    serde_yaml::from_str(config::example()).unwrap()
}

fn query(text: &str) -> ActuQuery {
    let sc = shortcode::parse(text).unwrap();
    assert_eq!(sc.tag, "actu");
    ActuQuery::from_attrs(&sc.attrs)
}

#[tokio::test]
async fn actu_shortcode_renders_fetched_news() {
    let feed = RecordingFeed::with_responses(vec![Ok(vec![
        FeedItem::from(json!({
            "news_id": 1,
            "title": "Robots & People",
            "subtitle": "<b>new</b> lab",
            "visual_url": "https://actu.epfl.ch/image/1.jpg",
            "news_url": "https://actu.epfl.ch/news/robots-people/",
        })),
        FeedItem::from(json!({
            "news_id": 2,
            "title": "A 12 Million Franc Donation",
        })),
    ])]);
    let plugin = plugin_with(&feed, &example_cfg()).await;

    let html = plugin
        .render_actu(&query(r#"[actu channel="10" lang="fr" limit="3" themes="1"]"#))
        .await;

    assert_eq!(
        *feed.calls.lock().await,
        vec![
            "https://actu.epfl.ch/api/v1/channels/10/news/?format=json&lang=fr&themes=1&limit=3"
                .to_string()
        ]
    );
    assert!(html.starts_with("<div class=\"actu-list\">"));
    assert!(html.contains("ROBOTS &amp; PEOPLE"));
    assert!(html.contains("&lt;b&gt;new&lt;/b&gt; lab"));
    assert!(html.contains("href=\"https://actu.epfl.ch/news/robots-people/\""));
    assert!(html.contains("href=\"https://actu.epfl.ch/news/a-12-million-franc-donation\""));
    assert!(html.ends_with(
        "<!-- epfl-actu url: https://actu.epfl.ch/api/v1/channels/10/news/?format=json&amp;lang=fr&amp;themes=1&amp;limit=3 -->"
    ));
}

#[tokio::test]
async fn actu_shortcode_degrades_to_an_empty_list() {
    let feed = RecordingFeed::with_responses(vec![Err(FeedError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        url: "https://actu.epfl.ch/api/v1/news/".into(),
    })]);
    let plugin = plugin_with(&feed, &example_cfg()).await;

    let html = plugin.render_actu(&ActuQuery::from_attrs(&HashMap::new())).await;
    assert!(html.starts_with("<div class=\"actu-list\">\n</div>"));
    assert_eq!(feed.calls.lock().await.len(), 1);
}

#[tokio::test]
async fn actu_base_outside_allow_list_is_never_fetched() {
    let feed = RecordingFeed::default();
    let yaml = config::example().replace(
        "https://actu.epfl.ch/api/v1/",
        "https://news.example.net/api/v1/",
    );
    let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
    let plugin = plugin_with(&feed, &cfg).await;

    let html = plugin.render_actu(&query("[actu lang=de]")).await;
    assert!(html.starts_with("<div class=\"actu-list\">\n</div>"));
    assert!(html.ends_with(
        "<!-- epfl-actu url: https://news.example.net/api/v1/news/?format=json&amp;lang=de -->"
    ));
    assert!(feed.calls.lock().await.is_empty());
}

#[tokio::test]
async fn memento_channel_sync_then_render() {
    let feed = RecordingFeed::with_responses(vec![Ok(vec![
        FeedItem::from(json!({
            "event_id": 7,
            "title": "Thesis defense",
            "lang": "en",
            "event_start_date": "2020-03-02",
            "event_start_time": "10:15:00",
            "event_end_date": "2020-03-02",
            "event_end_time": "12:00:00",
            "event_place_and_room": "CM 1 4",
            "translation_id": 700,
            "event_canceled": "True",
            "event_canceled_reason": "Postponed",
        })),
        FeedItem::from(json!({
            "id": 8,
            "title": "Seminar",
            "event_start_date": "2020-03-05",
        })),
    ])]);
    let plugin = plugin_with(&feed, &example_cfg()).await;
    let id = db::insert_channel(
        &plugin.pool,
        ChannelKind::Memento,
        "STI",
        "https://memento.epfl.ch/api/jahia/mementos/sti/events/en/?format=json",
        Some("en"),
    )
    .await
    .unwrap();

    let report = plugin.sync_channel(id).await.unwrap();
    assert_eq!(report.created, 2);

    let html = plugin.render_memento_channel(id).await.unwrap();
    assert!(html.starts_with("<div class=\"memento-list\">"));
    assert!(html.contains("memento-event memento-event-canceled"));
    assert!(html.contains("2020-03-02 10:15 - 2020-03-02 12:00"));
    assert!(html.contains("CM 1 4"));
    assert!(html.contains("Postponed"));
    assert!(html.contains("href=\"https://memento.epfl.ch/event/export/700\""));
    // The second event has no translation id and so no iCal link.
    assert_eq!(html.matches("memento-event-ical").count(), 1);

    assert!(plugin.sync_channel(999).await.is_err());
}
