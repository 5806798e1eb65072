//! News feed: shortcode filter parameters and extraction rules.
use reqwest::Url;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::feed::{validate_url, FeedError, FeedItem, FeedSource};
use crate::post_type::PostType;
use crate::render::{html_escape, render_list, ActuView};

pub const POST_TYPE: &str = "epfl-actu";

pub struct ActuPost;

impl PostType for ActuPost {
    fn post_type(&self) -> &'static str {
        POST_TYPE
    }

    fn id_fields(&self) -> &'static [&'static str] {
        &["news_id", "id"]
    }

    fn extract_content(&self, item: &FeedItem) -> Option<String> {
        item.text("text")
    }

    fn extract_image_url(&self, item: &FeedItem) -> Option<String> {
        item.text("visual_url")
    }
}

/// Filter parameters for one news listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuQuery {
    pub channel: Option<String>,
    pub category: Option<String>,
    pub lang: String,
    pub search: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub text: Option<String>,
    pub publics: Option<String>,
    pub themes: Option<String>,
    pub limit: Option<u32>,
    pub faculties: Option<String>,
    pub offset: Option<u32>,
}

impl Default for ActuQuery {
    fn default() -> Self {
        Self {
            channel: None,
            category: None,
            lang: "en".to_string(),
            search: None,
            title: None,
            subtitle: None,
            text: None,
            publics: None,
            themes: None,
            limit: None,
            faculties: None,
            offset: None,
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number(key: &str, value: Option<&String>) -> Option<u32> {
    let raw = non_empty(value)?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!(key, value = %raw, "ignoring non-numeric attribute");
            None
        }
    }
}

impl ActuQuery {
    /// Build from shortcode attributes. Keys are case-insensitive; unknown
    /// keys are ignored.
    pub fn from_attrs(attrs: &HashMap<String, String>) -> Self {
        let attrs: HashMap<String, &String> = attrs
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        let get = |key: &str| attrs.get(key).copied();

        Self {
            channel: non_empty(get("channel")),
            category: non_empty(get("category")),
            lang: non_empty(get("lang")).unwrap_or_else(|| "en".to_string()),
            search: non_empty(get("search")),
            title: non_empty(get("title")),
            subtitle: non_empty(get("subtitle")),
            text: non_empty(get("text")),
            publics: non_empty(get("publics")),
            themes: non_empty(get("themes")),
            limit: number("limit", get("limit")),
            faculties: non_empty(get("faculties")),
            offset: number("offset", get("offset")),
        }
    }

    /// Non-empty facets in the order they are sent.
    pub fn facets(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        let text_facets = [
            ("category", &self.category),
            ("search", &self.search),
            ("subtitle", &self.subtitle),
            ("publics", &self.publics),
            ("title", &self.title),
            ("text", &self.text),
            ("themes", &self.themes),
        ];
        for (key, value) in text_facets {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                out.push((key, v.to_string()));
            }
        }
        if let Some(limit) = self.limit {
            out.push(("limit", limit.to_string()));
        }
        if let Some(faculties) = self.faculties.as_deref().filter(|v| !v.is_empty()) {
            out.push(("faculties", faculties.to_string()));
        }
        if let Some(offset) = self.offset {
            out.push(("offset", offset.to_string()));
        }
        out
    }

    /// Request URL relative to the API `base` (e.g. `https://actu.epfl.ch/api/v1/`).
    pub fn to_url(&self, base: &Url) -> Result<Url, FeedError> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| FeedError::InvalidUrl {
                url: base.to_string(),
                reason: "base URL cannot carry a path".into(),
            })?;
            segments.pop_if_empty();
            match self.channel.as_deref().filter(|c| !c.is_empty()) {
                Some(channel) => segments.extend(&["channels", channel, "news", ""]),
                None => segments.extend(&["news", ""]),
            };
        }

        {
            let lang = if self.lang.trim().is_empty() {
                "en"
            } else {
                self.lang.trim()
            };
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("format", "json");
            query.append_pair("lang", lang);
            for (key, value) in self.facets() {
                query.append_pair(key, &value);
            }
        }
        Ok(url)
    }
}

/// Fetch the listing described by `query` and render it.
///
/// A rejected URL or a failed fetch is logged and renders as an empty list.
/// The queried URL is appended as an HTML comment.
pub async fn render_shortcode(
    source: &dyn FeedSource,
    allowed_hosts: &[String],
    base: &Url,
    query: &ActuQuery,
    view: &ActuView,
) -> String {
    let (url, items) = match query.to_url(base) {
        Ok(url) => {
            let items = match fetch_listing(source, allowed_hosts, &url).await {
                Ok(items) => items,
                Err(err) => {
                    warn!(%err, "actu listing unavailable");
                    Vec::new()
                }
            };
            (url.to_string(), items)
        }
        Err(err) => {
            warn!(%err, "actu listing URL could not be built");
            (String::new(), Vec::new())
        }
    };
    format!(
        "{}\n<!-- epfl-actu url: {} -->",
        render_list("actu", &items, view),
        html_escape(&url).replace("--", "&#45;&#45;")
    )
}

/// Check `url` against the allow-list and fetch it.
pub async fn fetch_listing(
    source: &dyn FeedSource,
    allowed_hosts: &[String],
    url: &Url,
) -> Result<Vec<FeedItem>, FeedError> {
    let url = validate_url(url.as_str(), allowed_hosts)?;
    let items = source.fetch(&url).await?;
    info!(url = %url, items = items.len(), "actu listing fetched");
    Ok(items)
}
