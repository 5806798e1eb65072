//! Start-up registration: store, migrations and feed client, wired once.
use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use tracing::info;

use crate::actu::{self, ActuQuery};
use crate::config::Config;
use crate::db::{self, Pool};
use crate::feed::{FeedClient, FeedSource};
use crate::model::{ChannelKind, RetentionPolicy, SyncReport};
use crate::reconcile::{self, SyncAll};
use crate::render::{render_list, ActuView, MementoView};

/// Everything a sync pass or a render needs, passed explicitly.
#[derive(Clone)]
pub struct Plugin {
    pub pool: Pool,
    pub source: Arc<dyn FeedSource>,
    pub allowed_hosts: Vec<String>,
    pub retention: RetentionPolicy,
    pub actu_base_url: Url,
    pub ical_base_url: String,
}

/// Open the store, run migrations and build the HTTP client.
pub async fn register(cfg: &Config) -> Result<Plugin> {
    cfg.ensure_dirs()
        .context("failed to create data directory")?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    let client = FeedClient::from_config(cfg).context("failed to build HTTP client")?;
    let plugin = Plugin::new(pool, cfg, Arc::new(client))?;
    info!(
        allowed_hosts = ?plugin.allowed_hosts,
        retention = ?plugin.retention,
        "plugin registered"
    );
    Ok(plugin)
}

impl Plugin {
    /// Assemble from an already migrated pool and any feed source.
    pub fn new(pool: Pool, cfg: &Config, source: Arc<dyn FeedSource>) -> Result<Self> {
        let actu_base_url = Url::parse(&cfg.actu.base_url).context("invalid actu.base_url")?;
        Ok(Self {
            pool,
            source,
            allowed_hosts: cfg.http.allowed_hosts.clone(),
            retention: cfg.app.retention,
            actu_base_url,
            ical_base_url: cfg.memento.ical_base_url.clone(),
        })
    }

    pub async fn sync_channel(&self, channel_id: i64) -> Result<SyncReport> {
        let channel = db::fetch_channel(&self.pool, channel_id)
            .await?
            .with_context(|| format!("channel {} not found", channel_id))?;
        reconcile::sync_channel(
            &self.pool,
            self.source.as_ref(),
            &self.allowed_hosts,
            &channel,
            self.retention,
        )
        .await
    }

    pub async fn sync_all(&self) -> Result<SyncAll> {
        reconcile::sync_all(
            &self.pool,
            self.source.as_ref(),
            &self.allowed_hosts,
            self.retention,
        )
        .await
    }

    /// Render an `[actu]` listing.
    pub async fn render_actu(&self, query: &ActuQuery) -> String {
        actu::render_shortcode(
            self.source.as_ref(),
            &self.allowed_hosts,
            &self.actu_base_url,
            query,
            &ActuView::default(),
        )
        .await
    }

    /// Render the stored events of a channel.
    pub async fn render_memento_channel(&self, channel_id: i64) -> Result<String> {
        let channel = db::fetch_channel(&self.pool, channel_id)
            .await?
            .with_context(|| format!("channel {} not found", channel_id))?;
        if channel.kind != ChannelKind::Memento {
            anyhow::bail!("channel {} is not an events channel", channel_id);
        }
        let records = db::list_channel_records(&self.pool, channel_id).await?;
        let view = MementoView {
            ical_base_url: self.ical_base_url.clone(),
        };
        Ok(render_list("memento", &records, &view))
    }
}
