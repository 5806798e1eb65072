//! Minimal `[tag key=value ...]` parser for embedded listings.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*\[\s*([A-Za-z][A-Za-z0-9_-]*)(.*?)/?\]\s*$").expect("valid tag regex")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'\]]+))"#)
        .expect("valid attribute regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcode {
    pub tag: String,
    /// Attribute names are lower-cased.
    pub attrs: HashMap<String, String>,
}

pub fn parse(text: &str) -> Option<Shortcode> {
    let caps = TAG_RE.captures(text)?;
    let tag = caps.get(1)?.as_str().to_lowercase();
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let attrs = ATTR_RE
        .captures_iter(rest)
        .filter_map(|c| {
            let key = c.get(1)?.as_str().to_lowercase();
            let value = c.get(2).or_else(|| c.get(3)).or_else(|| c.get(4))?;
            Some((key, value.as_str().to_string()))
        })
        .collect();

    Some(Shortcode { tag, attrs })
}
