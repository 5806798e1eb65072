use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Which remote API a channel points at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Actu,
    Memento,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Actu => "actu",
            ChannelKind::Memento => "memento",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actu" => Some(ChannelKind::Actu),
            "memento" => Some(ChannelKind::Memento),
            _ => None,
        }
    }
}

/// What happens to synced records that a later fetch no longer contains.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep them forever.
    #[default]
    Retain,
    /// Drop the channel membership, and the record once no channel holds it.
    Prune,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: i64,
    pub kind: ChannelKind,
    pub name: String,
    pub api_url: String,
    pub lang: Option<String>,
}

/// Stable identity of a record across re-fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub external_id: String,
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Flag(bool),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            MetaValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MetaValue::Flag(b) => Some(*b),
            MetaValue::Text(_) => None,
        }
    }
}

pub type Meta = BTreeMap<String, MetaValue>;

/// Everything the reconciler writes for one feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub post_type: &'static str,
    pub identity: Identity,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub meta: Meta,
}

/// A stored record as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub post_type: String,
    pub external_id: String,
    pub lang: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub meta: Meta,
}

impl Record {
    pub fn meta_text(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .and_then(MetaValue::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn meta_flag(&self, key: &str) -> bool {
        self.meta
            .get(key)
            .and_then(MetaValue::as_flag)
            .unwrap_or(false)
    }
}

/// Outcome of one upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created(i64),
    Updated(i64),
}

impl Upserted {
    pub fn id(&self) -> i64 {
        match self {
            Upserted::Created(id) | Upserted::Updated(id) => *id,
        }
    }
}

/// Summary of one sync pass over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub channel_id: i64,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
}
