//! Per-feed extraction rules shared by every synced post type.
use crate::actu::ActuPost;
use crate::feed::FeedItem;
use crate::memento::MementoPost;
use crate::model::{ChannelKind, Identity, Meta, MetaValue, RecordDraft};

/// How one remote feed maps onto local records.
///
/// Implementors name their fields; the default methods do the projection.
pub trait PostType: Send + Sync {
    fn post_type(&self) -> &'static str;

    /// Candidate fields for the external id, first present wins.
    fn id_fields(&self) -> &'static [&'static str];

    fn lang_fields(&self) -> &'static [&'static str] {
        &["lang", "language"]
    }

    fn extract_title(&self, item: &FeedItem) -> Option<String> {
        item.text("title")
    }

    fn extract_subtitle(&self, item: &FeedItem) -> Option<String> {
        item.text("subtitle")
    }

    fn extract_content(&self, item: &FeedItem) -> Option<String>;

    fn extract_image_url(&self, item: &FeedItem) -> Option<String>;

    /// Fields copied verbatim into metadata when present and non-empty.
    fn meta_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Fields coerced to booleans and always written.
    fn flag_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn extract_identity(&self, item: &FeedItem, fallback_lang: Option<&str>) -> Option<Identity> {
        let external_id = item.first_text(self.id_fields())?;
        let lang = item
            .first_text(self.lang_fields())
            .or_else(|| fallback_lang.map(str::to_string))?;
        Some(Identity {
            external_id,
            lang: lang.to_ascii_lowercase(),
        })
    }

    fn extract_meta(&self, item: &FeedItem) -> Meta {
        let mut meta = Meta::new();
        for field in self.meta_fields() {
            if let Some(value) = item.text(field) {
                meta.insert(field.to_string(), MetaValue::Text(value));
            }
        }
        for field in self.flag_fields() {
            meta.insert(field.to_string(), MetaValue::Flag(item.flag(field)));
        }
        meta
    }

    /// Everything needed to upsert `item`, or `None` if it has no identity.
    fn draft(&self, item: &FeedItem, fallback_lang: Option<&str>) -> Option<RecordDraft> {
        let identity = self.extract_identity(item, fallback_lang)?;
        Some(RecordDraft {
            post_type: self.post_type(),
            identity,
            title: self.extract_title(item),
            subtitle: self.extract_subtitle(item),
            body: self.extract_content(item),
            image_url: self.extract_image_url(item),
            meta: self.extract_meta(item),
        })
    }
}

pub fn for_kind(kind: ChannelKind) -> &'static dyn PostType {
    match kind {
        ChannelKind::Actu => &ActuPost,
        ChannelKind::Memento => &MementoPost,
    }
}
