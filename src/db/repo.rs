use crate::db::model::SyncRun;
use crate::model::{
    Channel, ChannelKind, Identity, Meta, MetaValue, Record, RecordDraft, SyncReport, Upserted,
};
use anyhow::{anyhow, Context, Result};
use sqlx::{sqlite::SqliteRow, Sqlite, SqlitePool};
use sqlx::{Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs are left
/// untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

fn channel_from_row(row: &SqliteRow) -> Result<Channel> {
    let kind: String = row.get("kind");
    let kind = ChannelKind::parse_kind(&kind)
        .ok_or_else(|| anyhow!("channel has unknown kind {}", kind))?;
    Ok(Channel {
        id: row.get("id"),
        kind,
        name: row.get("name"),
        api_url: row.get("api_url"),
        lang: row.try_get::<Option<String>, _>("lang").ok().flatten(),
    })
}

#[instrument(skip_all)]
pub async fn insert_channel(
    pool: &Pool,
    kind: ChannelKind,
    name: &str,
    api_url: &str,
    lang: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO channels (kind, name, api_url, lang) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(name)
    .bind(api_url)
    .bind(lang)
    .fetch_one(pool)
    .await
    .context("failed to insert channel")?;
    Ok(rec.get::<i64, _>("id"))
}

/// Returns false when no channel has this id.
#[instrument(skip_all)]
pub async fn update_channel(
    pool: &Pool,
    id: i64,
    name: &str,
    api_url: &str,
    lang: Option<&str>,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE channels SET name = ?, api_url = ?, lang = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(name)
    .bind(api_url)
    .bind(lang)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update channel")?;
    Ok(res.rows_affected() > 0)
}

/// Delete a channel and its memberships. Records stay.
#[instrument(skip_all)]
pub async fn delete_channel(pool: &Pool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM channel_records WHERE channel_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let res = sqlx::query("DELETE FROM channels WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn fetch_channel(pool: &Pool, id: i64) -> Result<Option<Channel>> {
    let row = sqlx::query("SELECT id, kind, name, api_url, lang FROM channels WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(channel_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_channels(pool: &Pool, kind: Option<ChannelKind>) -> Result<Vec<Channel>> {
    let rows = match kind {
        Some(kind) => {
            sqlx::query(
                "SELECT id, kind, name, api_url, lang FROM channels WHERE kind = ? ORDER BY id",
            )
            .bind(kind.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT id, kind, name, api_url, lang FROM channels ORDER BY id")
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(channel_from_row).collect()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn meta_columns(value: &MetaValue) -> (&'static str, String) {
    match value {
        MetaValue::Text(s) => ("text", s.clone()),
        MetaValue::Flag(b) => ("flag", b.to_string()),
    }
}

/// Insert or update the record identified by `draft`, replace its metadata and
/// mark it as seen by `channel_id` in `run_id`. All in one transaction.
#[instrument(skip_all, fields(external_id = %draft.identity.external_id, lang = %draft.identity.lang))]
pub async fn upsert_record(
    pool: &Pool,
    draft: &RecordDraft,
    channel_id: i64,
    run_id: Uuid,
) -> Result<Upserted> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM records WHERE post_type = ? AND external_id = ? AND lang = ?",
    )
    .bind(draft.post_type)
    .bind(&draft.identity.external_id)
    .bind(&draft.identity.lang)
    .fetch_optional(&mut *tx)
    .await?;

    let outcome = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE records SET title = ?, subtitle = ?, body = ?, image_url = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(&draft.title)
            .bind(&draft.subtitle)
            .bind(&draft.body)
            .bind(&draft.image_url)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            Upserted::Updated(id)
        }
        None => {
            let id: i64 = sqlx::query(
                "INSERT INTO records (post_type, external_id, lang, title, subtitle, body, image_url) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(draft.post_type)
            .bind(&draft.identity.external_id)
            .bind(&draft.identity.lang)
            .bind(&draft.title)
            .bind(&draft.subtitle)
            .bind(&draft.body)
            .bind(&draft.image_url)
            .fetch_one(&mut *tx)
            .await?
            .get("id");
            Upserted::Created(id)
        }
    };

    replace_meta_tx(&mut tx, outcome.id(), &draft.meta).await?;

    sqlx::query(
        "INSERT INTO channel_records (channel_id, record_id, last_seen_run) VALUES (?, ?, ?)\n         ON CONFLICT(channel_id, record_id) DO UPDATE SET last_seen_run = excluded.last_seen_run",
    )
    .bind(channel_id)
    .bind(outcome.id())
    .bind(run_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(outcome)
}

async fn replace_meta_tx(tx: &mut Transaction<'_, Sqlite>, record_id: i64, meta: &Meta) -> Result<()> {
    sqlx::query("DELETE FROM record_meta WHERE record_id = ?")
        .bind(record_id)
        .execute(&mut **tx)
        .await?;
    for (key, value) in meta {
        let (kind, value) = meta_columns(value);
        sqlx::query("INSERT INTO record_meta (record_id, meta_key, kind, value) VALUES (?, ?, ?, ?)")
            .bind(record_id)
            .bind(key)
            .bind(kind)
            .bind(value)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn load_meta(pool: &Pool, record_id: i64) -> Result<Meta> {
    let rows = sqlx::query("SELECT meta_key, kind, value FROM record_meta WHERE record_id = ?")
        .bind(record_id)
        .fetch_all(pool)
        .await?;
    let mut meta = Meta::new();
    for row in rows {
        let key: String = row.get("meta_key");
        let kind: String = row.get("kind");
        let value: String = row.get("value");
        let value = match kind.as_str() {
            "flag" => MetaValue::Flag(value == "true"),
            _ => MetaValue::Text(value),
        };
        meta.insert(key, value);
    }
    Ok(meta)
}

async fn record_from_row(pool: &Pool, row: &SqliteRow) -> Result<Record> {
    let id: i64 = row.get("id");
    Ok(Record {
        id,
        post_type: row.get("post_type"),
        external_id: row.get("external_id"),
        lang: row.get("lang"),
        title: row.try_get::<Option<String>, _>("title").ok().flatten(),
        subtitle: row.try_get::<Option<String>, _>("subtitle").ok().flatten(),
        body: row.try_get::<Option<String>, _>("body").ok().flatten(),
        image_url: row.try_get::<Option<String>, _>("image_url").ok().flatten(),
        meta: load_meta(pool, id).await?,
    })
}

#[instrument(skip_all)]
pub async fn fetch_record(pool: &Pool, id: i64) -> Result<Option<Record>> {
    let row = sqlx::query(
        "SELECT id, post_type, external_id, lang, title, subtitle, body, image_url FROM records WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(Some(record_from_row(pool, &row).await?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn find_record(pool: &Pool, post_type: &str, identity: &Identity) -> Result<Option<Record>> {
    let row = sqlx::query(
        "SELECT id, post_type, external_id, lang, title, subtitle, body, image_url FROM records WHERE post_type = ? AND external_id = ? AND lang = ?",
    )
    .bind(post_type)
    .bind(&identity.external_id)
    .bind(&identity.lang)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(Some(record_from_row(pool, &row).await?)),
        None => Ok(None),
    }
}

/// Records currently associated with a channel, oldest first.
#[instrument(skip_all)]
pub async fn list_channel_records(pool: &Pool, channel_id: i64) -> Result<Vec<Record>> {
    let rows = sqlx::query(
        "SELECT r.id, r.post_type, r.external_id, r.lang, r.title, r.subtitle, r.body, r.image_url \
         FROM records r JOIN channel_records c ON c.record_id = r.id \
         WHERE c.channel_id = ? ORDER BY r.id",
    )
    .bind(channel_id)
    .fetch_all(pool)
    .await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(record_from_row(pool, row).await?);
    }
    Ok(out)
}

#[instrument(skip_all)]
pub async fn count_records(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Drop memberships of `channel_id` not refreshed by `run_id`, then delete
/// records no channel holds any more. Returns the number of memberships dropped.
#[instrument(skip_all)]
pub async fn prune_channel(pool: &Pool, channel_id: i64, run_id: Uuid) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let run = run_id.to_string();

    let stale: Vec<i64> = sqlx::query_scalar(
        "SELECT record_id FROM channel_records WHERE channel_id = ? AND (last_seen_run IS NULL OR last_seen_run <> ?)",
    )
    .bind(channel_id)
    .bind(&run)
    .fetch_all(&mut *tx)
    .await?;

    for record_id in &stale {
        sqlx::query("DELETE FROM channel_records WHERE channel_id = ? AND record_id = ?")
            .bind(channel_id)
            .bind(record_id)
            .execute(&mut *tx)
            .await?;
        let holders: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_records WHERE record_id = ?")
                .bind(record_id)
                .fetch_one(&mut *tx)
                .await?;
        if holders == 0 {
            sqlx::query("DELETE FROM record_meta WHERE record_id = ?")
                .bind(record_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(record_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(stale.len())
}

// ---------------------------------------------------------------------------
// Sync runs
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn start_sync_run(pool: &Pool, run_id: Uuid, channel_id: i64) -> Result<()> {
    sqlx::query("INSERT INTO sync_runs (id, channel_id) VALUES (?, ?)")
        .bind(run_id.to_string())
        .bind(channel_id)
        .execute(pool)
        .await
        .context("failed to record sync run start")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn finish_sync_run(pool: &Pool, report: &SyncReport) -> Result<()> {
    sqlx::query(
        "UPDATE sync_runs SET finished_at = CURRENT_TIMESTAMP, fetched = ?, created = ?, updated = ?, skipped = ?, removed = ? WHERE id = ?",
    )
    .bind(report.fetched as i64)
    .bind(report.created as i64)
    .bind(report.updated as i64)
    .bind(report.skipped as i64)
    .bind(report.removed as i64)
    .bind(report.run_id.to_string())
    .execute(pool)
    .await
    .context("failed to record sync run result")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn fail_sync_run(pool: &Pool, run_id: Uuid, error: &str) -> Result<()> {
    sqlx::query("UPDATE sync_runs SET finished_at = CURRENT_TIMESTAMP, error = ? WHERE id = ?")
        .bind(error)
        .bind(run_id.to_string())
        .execute(pool)
        .await
        .context("failed to record sync run failure")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn last_sync_run(pool: &Pool, channel_id: i64) -> Result<Option<SyncRun>> {
    let row = sqlx::query(
        "SELECT id, channel_id, fetched, created, updated, skipped, removed, finished_at IS NOT NULL AS finished, error \
         FROM sync_runs WHERE channel_id = ? ORDER BY started_at DESC, rowid DESC LIMIT 1",
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| SyncRun {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        fetched: row.get("fetched"),
        created: row.get("created"),
        updated: row.get("updated"),
        skipped: row.get("skipped"),
        removed: row.get("removed"),
        finished: row.get::<i64, _>("finished") != 0,
        error: row.try_get::<Option<String>, _>("error").ok().flatten(),
    }))
}
