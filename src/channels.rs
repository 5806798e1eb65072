//! Channel registry: the configured feed sources records are synced from.
use reqwest::Url;
use thiserror::Error;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::feed::{validate_url, FeedError};
use crate::model::{Channel, ChannelKind};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel name must be non-empty")]
    EmptyName,
    #[error(transparent)]
    InvalidUrl(#[from] FeedError),
    #[error("channel {0} not found")]
    NotFound(i64),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Fields to change on an existing channel; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub api_url: Option<String>,
}

const LANGUAGES: &[&str] = &["en", "fr", "de", "it"];

/// Language encoded in a feed URL: the `lang` query parameter, else a known
/// language code directly after the `events` or `news` segment
/// (`.../events/en/`). Two-letter channel slugs such as `ic` are not languages.
pub fn lang_from_url(url: &Url) -> Option<String> {
    if let Some((_, lang)) = url
        .query_pairs()
        .find(|(k, v)| *k == "lang" && !v.trim().is_empty())
    {
        return Some(lang.trim().to_ascii_lowercase());
    }
    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .filter(|pair| matches!(pair[0], "events" | "news"))
        .map(|pair| pair[1].to_ascii_lowercase())
        .filter(|lang| LANGUAGES.contains(&lang.as_str()))
        .last()
}

fn checked_name(name: &str) -> Result<String, ChannelError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChannelError::EmptyName);
    }
    Ok(name.to_string())
}

#[instrument(skip(pool, allowed_hosts))]
pub async fn add_channel(
    pool: &Pool,
    allowed_hosts: &[String],
    kind: ChannelKind,
    name: &str,
    api_url: &str,
) -> Result<Channel, ChannelError> {
    let name = checked_name(name)?;
    let url = validate_url(api_url, allowed_hosts)?;
    let lang = lang_from_url(&url);
    let id = db::insert_channel(pool, kind, &name, url.as_str(), lang.as_deref()).await?;
    info!(channel_id = id, kind = kind.as_str(), url = %url, "channel added");
    get_channel(pool, id).await
}

#[instrument(skip(pool, allowed_hosts))]
pub async fn edit_channel(
    pool: &Pool,
    allowed_hosts: &[String],
    id: i64,
    edit: ChannelEdit,
) -> Result<Channel, ChannelError> {
    let current = get_channel(pool, id).await?;
    let name = match edit.name.as_deref() {
        Some(name) => checked_name(name)?,
        None => current.name,
    };
    let (api_url, lang) = match edit.api_url.as_deref() {
        Some(raw) => {
            let url = validate_url(raw, allowed_hosts)?;
            let lang = lang_from_url(&url);
            (url.to_string(), lang)
        }
        None => (current.api_url, current.lang),
    };
    if !db::update_channel(pool, id, &name, &api_url, lang.as_deref()).await? {
        return Err(ChannelError::NotFound(id));
    }
    info!(channel_id = id, "channel updated");
    get_channel(pool, id).await
}

/// Remove a channel. Records it synced are kept.
#[instrument(skip(pool))]
pub async fn remove_channel(pool: &Pool, id: i64) -> Result<(), ChannelError> {
    if !db::delete_channel(pool, id).await? {
        return Err(ChannelError::NotFound(id));
    }
    info!(channel_id = id, "channel removed");
    Ok(())
}

pub async fn get_channel(pool: &Pool, id: i64) -> Result<Channel, ChannelError> {
    db::fetch_channel(pool, id)
        .await?
        .ok_or(ChannelError::NotFound(id))
}

pub async fn list_channels(
    pool: &Pool,
    kind: Option<ChannelKind>,
) -> Result<Vec<Channel>, ChannelError> {
    Ok(db::list_channels(pool, kind).await?)
}
