//! HTML fragments for feed items and stored records.
use crate::feed::FeedItem;
use crate::memento::MementoEvent;
use crate::model::Record;

/// Templating callback: one item in, one markup fragment out.
pub trait Template<T: ?Sized> {
    fn render(&self, item: &T) -> String;
}

/// Render every item with `template` and wrap them in a `<slug>-list` block.
pub fn render_list<T>(slug: &str, items: &[T], template: &dyn Template<T>) -> String {
    let mut body = String::new();
    for item in items {
        body.push_str(&template.render(item));
        body.push('\n');
    }
    format!("<div class=\"{}-list\">\n{}</div>", html_attr(slug), body)
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn html_attr(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}

fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Æ' | 'Ā' | 'Ă' | 'Ą' => "A",
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'æ' | 'ā' | 'ă' | 'ą' => "a",
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => "C",
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => "c",
        'Ð' | 'Ď' | 'Đ' => "D",
        'ď' | 'đ' => "d",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => "E",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => "e",
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => "G",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'Ĥ' | 'Ħ' => "H",
        'ĥ' | 'ħ' => "h",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => "I",
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => "i",
        'Ĳ' => "IJ",
        'ĳ' => "ij",
        'Ĵ' => "J",
        'ĵ' => "j",
        'Ķ' => "K",
        'ķ' | 'ĸ' => "k",
        'Ĺ' | 'Ļ' | 'Ľ' | 'Ŀ' | 'Ł' => "L",
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => "l",
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' | 'Ŋ' => "N",
        'ñ' | 'ń' | 'ņ' | 'ň' | 'ŉ' | 'ŋ' => "n",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => "O",
        'ð' | 'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => "o",
        'Œ' => "OE",
        'œ' => "oe",
        'Ŕ' | 'Ŗ' | 'Ř' => "R",
        'ŕ' | 'ŗ' | 'ř' => "r",
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => "S",
        'ś' | 'ŝ' | 'ş' | 'š' | 'ſ' => "s",
        'ß' => "Ss",
        'Ţ' | 'Ť' | 'Ŧ' => "T",
        'ţ' | 'ť' | 'ŧ' => "t",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => "U",
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => "u",
        'Ŵ' => "W",
        'ŵ' => "w",
        'Ý' | 'Ŷ' | 'Ÿ' => "Y",
        'ý' | 'ÿ' | 'ŷ' => "y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'ź' | 'ż' | 'ž' => "z",
        'Þ' => "B",
        'þ' => "b",
        _ => return None,
    };
    Some(ascii)
}

/// Best guess at a news item's URL slug when the feed does not carry a link.
///
/// Accented Latin letters are folded to ASCII, spaces and apostrophes become
/// hyphens, any other non-ASCII character is dropped, and the result is
/// lower-cased and cut to 50 characters.
pub fn anchor_slug(title: &str) -> String {
    let mut folded = String::with_capacity(title.len());
    for c in title.chars() {
        match transliterate(c) {
            Some(ascii) => folded.push_str(ascii),
            None if matches!(c, ' ' | '\'' | '\u{2019}') => folded.push('-'),
            None if c.is_ascii() => folded.push(c),
            None => {}
        }
    }
    folded.to_ascii_lowercase().chars().take(50).collect()
}

/// News item box, as embedded by the `[actu]` shortcode.
#[derive(Debug, Clone)]
pub struct ActuView {
    pub news_base_url: String,
}

impl Default for ActuView {
    fn default() -> Self {
        Self {
            news_base_url: "https://actu.epfl.ch/news/".to_string(),
        }
    }
}

impl ActuView {
    pub fn link_for(&self, item: &FeedItem) -> String {
        if let Some(url) = item.text("news_url") {
            return url;
        }
        let title = item.text("title").unwrap_or_default();
        format!(
            "{}/{}",
            self.news_base_url.trim_end_matches('/'),
            anchor_slug(&title)
        )
    }
}

impl Template<FeedItem> for ActuView {
    fn render(&self, item: &FeedItem) -> String {
        let title = item.text("title").unwrap_or_default();
        let visual = item.text("visual_url").unwrap_or_default();
        let subtitle = item.text("subtitle").unwrap_or_default();
        format!(
            r#"<div class="actu-news-box">
 <div class="actu-news-title"><a href="{}">{}</a></div>
 <div class="actu-news-body">
  <img src="{}" width="170" height="100">
  <span>{}</span>
 </div>
</div>"#,
            html_attr(&self.link_for(item)),
            html_escape(&title.to_uppercase()),
            html_attr(&visual),
            html_escape(&subtitle),
        )
    }
}

/// Event card for a synced record.
#[derive(Debug, Clone)]
pub struct MementoView {
    pub ical_base_url: String,
}

impl Template<Record> for MementoView {
    fn render(&self, record: &Record) -> String {
        let event = MementoEvent::new(record, &self.ical_base_url);
        let mut class = String::from("memento-event");
        if event.is_canceled() {
            class.push_str(" memento-event-canceled");
        }

        let mut out = format!(
            "<div class=\"{}\">\n <div class=\"memento-event-title\">{}</div>\n",
            class,
            html_escape(record.title.as_deref().unwrap_or_default())
        );
        match (event.start(), event.end()) {
            (Some(start), Some(end)) if start != end => out.push_str(&format!(
                " <div class=\"memento-event-when\">{} - {}</div>\n",
                start, end
            )),
            (Some(start), _) => out.push_str(&format!(
                " <div class=\"memento-event-when\">{}</div>\n",
                start
            )),
            _ => {}
        }
        if let Some(venue) = event.venue() {
            out.push_str(&format!(
                " <div class=\"memento-event-where\">{}</div>\n",
                html_escape(venue)
            ));
        }
        if event.is_canceled() {
            out.push_str(&format!(
                " <div class=\"memento-event-canceled-reason\">{}</div>\n",
                html_escape(event.canceled_reason().unwrap_or("Canceled"))
            ));
        }
        if let Some(link) = event.ical_link() {
            out.push_str(&format!(
                " <a class=\"memento-event-ical\" href=\"{}\">iCal</a>\n",
                html_attr(&link)
            ));
        }
        out.push_str("</div>");
        out
    }
}
