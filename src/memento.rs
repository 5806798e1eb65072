//! Events feed: extraction rules and read-time accessors.
//!
//! Every event in a watched channel gets one local record, identified by its
//! `event_id` and language.
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

use crate::feed::FeedItem;
use crate::model::Record;
use crate::post_type::PostType;

pub const POST_TYPE: &str = "epfl-memento";

const META_FIELDS: &[&str] = &[
    "event_start_date",
    "event_end_date",
    "event_start_time",
    "event_end_time",
    "event_theme",
    "event_speaker",
    "event_place_and_room",
    "event_url_place_and_room",
    "event_canceled_reason",
    "translation_id",
];

const FLAG_FIELDS: &[&str] = &["event_is_internal", "event_canceled"];

pub struct MementoPost;

impl PostType for MementoPost {
    fn post_type(&self) -> &'static str {
        POST_TYPE
    }

    fn id_fields(&self) -> &'static [&'static str] {
        &["event_id", "id"]
    }

    fn extract_content(&self, item: &FeedItem) -> Option<String> {
        item.text("description")
    }

    fn extract_image_url(&self, item: &FeedItem) -> Option<String> {
        item.text("event_visual_absolute_url")
    }

    fn meta_fields(&self) -> &'static [&'static str] {
        META_FIELDS
    }

    fn flag_fields(&self) -> &'static [&'static str] {
        FLAG_FIELDS
    }
}

/// A start or end point: either a full timestamp or just a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    At(NaiveDateTime),
    Day(NaiveDate),
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::At(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Combine an API date and time. Missing or malformed input yields `None`.
pub fn parse_event_time(date: Option<&str>, time: Option<&str>) -> Option<EventTime> {
    let date = date.map(str::trim).filter(|d| !d.is_empty())?;
    match time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(time) => {
            NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(EventTime::At)
        }
        None => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .map(EventTime::Day),
    }
}

/// Read-only view of a stored event record.
#[derive(Debug, Clone, Copy)]
pub struct MementoEvent<'a> {
    record: &'a Record,
    ical_base_url: &'a str,
}

impl<'a> MementoEvent<'a> {
    pub fn new(record: &'a Record, ical_base_url: &'a str) -> Self {
        Self {
            record,
            ical_base_url,
        }
    }

    pub fn start(&self) -> Option<EventTime> {
        parse_event_time(
            self.record.meta_text("event_start_date"),
            self.record.meta_text("event_start_time"),
        )
    }

    pub fn end(&self) -> Option<EventTime> {
        parse_event_time(
            self.record.meta_text("event_end_date"),
            self.record.meta_text("event_end_time"),
        )
    }

    pub fn venue(&self) -> Option<&'a str> {
        self.record.meta_text("event_place_and_room")
    }

    pub fn translation_id(&self) -> Option<&'a str> {
        self.record.meta_text("translation_id")
    }

    /// iCal export link, keyed by the translation id.
    pub fn ical_link(&self) -> Option<String> {
        let id = self.translation_id()?;
        Some(format!("{}/{}", self.ical_base_url.trim_end_matches('/'), id))
    }

    pub fn is_canceled(&self) -> bool {
        self.record.meta_flag("event_canceled")
    }

    pub fn is_internal(&self) -> bool {
        self.record.meta_flag("event_is_internal")
    }

    pub fn canceled_reason(&self) -> Option<&'a str> {
        self.record.meta_text("event_canceled_reason")
    }
}
