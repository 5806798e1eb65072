use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope returned by both APIs.
#[derive(Deserialize, Debug)]
pub struct FeedPage {
    pub results: Vec<FeedItem>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// One raw item of a feed, kept as the JSON object the API sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedItem(pub Map<String, Value>);

impl FeedItem {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field as text. Numbers are rendered in decimal; null, empty strings,
    /// zero (`0` or `"0"`), `false` and composite values count as absent.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) if !s.is_empty() && s != "0" => Some(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }

    /// First field of `fields` that has a text value.
    pub fn first_text(&self, fields: &[&str]) -> Option<String> {
        fields.iter().find_map(|f| self.text(f))
    }

    /// Boolean coercion: `"true"` in any ASCII case, or JSON `true`.
    pub fn flag(&self, field: &str) -> bool {
        match self.0.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl From<Value> for FeedItem {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => FeedItem(map),
            _ => FeedItem::default(),
        }
    }
}
