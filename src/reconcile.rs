//! Fetch-and-reconcile of one channel's feed into local records.
use anyhow::Result;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::{self, Pool};
use crate::feed::{validate_url, FeedItem, FeedSource};
use crate::model::{Channel, RetentionPolicy, SyncReport, Upserted};
use crate::post_type::{self, PostType};

/// Counts produced by merging one batch of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Merged {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Upsert every item of `items`, in order, as a record of `post` owned by
/// `channel`. Items without an identity are skipped.
#[instrument(skip_all, fields(channel_id = channel.id, %run_id))]
pub async fn reconcile_items(
    pool: &Pool,
    post: &dyn PostType,
    channel: &Channel,
    run_id: Uuid,
    items: &[FeedItem],
) -> Result<Merged> {
    let mut merged = Merged::default();
    for (index, item) in items.iter().enumerate() {
        let Some(draft) = post.draft(item, channel.lang.as_deref()) else {
            warn!(index, post_type = post.post_type(), "feed item has no id or language; skipped");
            merged.skipped += 1;
            continue;
        };
        match db::upsert_record(pool, &draft, channel.id, run_id).await? {
            Upserted::Created(_) => merged.created += 1,
            Upserted::Updated(_) => merged.updated += 1,
        }
    }
    Ok(merged)
}

/// One full sync pass over `channel`.
///
/// A rejected URL or a failed fetch is recorded against the run and returned;
/// records from earlier passes are left alone.
#[instrument(skip_all, fields(channel_id = channel.id))]
pub async fn sync_channel(
    pool: &Pool,
    source: &dyn FeedSource,
    allowed_hosts: &[String],
    channel: &Channel,
    policy: RetentionPolicy,
) -> Result<SyncReport> {
    let run_id = Uuid::new_v4();
    db::start_sync_run(pool, run_id, channel.id).await?;

    let url = match validate_url(&channel.api_url, allowed_hosts) {
        Ok(url) => url,
        Err(err) => {
            error!(%run_id, url = %channel.api_url, %err, "channel URL rejected");
            db::fail_sync_run(pool, run_id, &err.to_string()).await?;
            return Err(err.into());
        }
    };

    let items = match source.fetch(&url).await {
        Ok(items) => items,
        Err(err) => {
            error!(%run_id, url = %url, %err, "feed fetch failed");
            db::fail_sync_run(pool, run_id, &err.to_string()).await?;
            return Err(err.into());
        }
    };

    let post = post_type::for_kind(channel.kind);
    let merged = match reconcile_items(pool, post, channel, run_id, &items).await {
        Ok(merged) => merged,
        Err(err) => {
            error!(%run_id, ?err, "reconciliation failed");
            db::fail_sync_run(pool, run_id, &format!("{:#}", err)).await?;
            return Err(err);
        }
    };

    let removed = match policy {
        RetentionPolicy::Retain => 0,
        RetentionPolicy::Prune => db::prune_channel(pool, channel.id, run_id).await?,
    };

    let report = SyncReport {
        run_id,
        channel_id: channel.id,
        fetched: items.len(),
        created: merged.created,
        updated: merged.updated,
        skipped: merged.skipped,
        removed,
    };
    db::finish_sync_run(pool, &report).await?;
    info!(
        %run_id,
        fetched = report.fetched,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        removed = report.removed,
        "channel synced"
    );
    Ok(report)
}

/// Result of syncing every channel.
#[derive(Debug, Default)]
pub struct SyncAll {
    pub succeeded: Vec<SyncReport>,
    pub failed: Vec<i64>,
}

/// Sync every registered channel, one after another. A failing channel does
/// not stop the others.
#[instrument(skip_all)]
pub async fn sync_all(
    pool: &Pool,
    source: &dyn FeedSource,
    allowed_hosts: &[String],
    policy: RetentionPolicy,
) -> Result<SyncAll> {
    let channels = db::list_channels(pool, None).await?;
    let mut out = SyncAll::default();
    for channel in &channels {
        match sync_channel(pool, source, allowed_hosts, channel, policy).await {
            Ok(report) => out.succeeded.push(report),
            Err(err) => {
                warn!(channel_id = channel.id, ?err, "channel sync failed; continuing");
                out.failed.push(channel.id);
            }
        }
    }
    info!(
        channels = channels.len(),
        failed = out.failed.len(),
        "sync pass complete"
    );
    Ok(out)
}
