use super::{header, HeaderMap, HeaderValue};

use std::fmt;

use indexmap::IndexMap;

/// A parsed `Content-Type` or `Accept` entry.
///
/// Type, subtype and parameter names compare case-insensitively.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MimeType(mime::Mime);

impl MimeType {
    /// The type assumed when a request carries no usable content type.
    pub fn binary() -> MimeType {
        MimeType(mime::APPLICATION_OCTET_STREAM)
    }

    /// Parse a single media type, returning `None` if it is malformed.
    pub fn parse(value: &str) -> Option<MimeType> {
        value.trim().parse::<mime::Mime>().ok().map(MimeType)
    }

    /// Resolve a header value, falling back to [`MimeType::binary`]
    /// when the header is absent or malformed.
    pub fn resolve(value: Option<&HeaderValue>) -> MimeType {
        value
            .and_then(|value| value.to_str().ok())
            .and_then(MimeType::parse)
            .unwrap_or_else(MimeType::binary)
    }

    pub fn main_type(&self) -> &str {
        self.0.type_().as_str()
    }

    pub fn sub_type(&self) -> &str {
        self.0.subtype().as_str()
    }

    /// The structured syntax suffix, `json` in `application/ld+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.0.suffix().map(|suffix| suffix.as_str())
    }

    /// The bare `type/subtype` string, without parameters.
    pub fn essence(&self) -> &str {
        self.0.essence_str()
    }

    /// Returns the parameter with the given name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .params()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary")
    }

    /// The `q` weight of an `Accept` entry, `1.0` when absent or invalid.
    pub fn quality(&self) -> f32 {
        self.param("q")
            .and_then(|q| q.parse::<f32>().ok())
            .filter(|q| (0.0..=1.0).contains(q))
            .unwrap_or(1.0)
    }

    pub fn is_json(&self) -> bool {
        self.sub_type().eq_ignore_ascii_case("json")
            || self.suffix().map_or(false, |s| s.eq_ignore_ascii_case("json"))
    }

    pub fn is_url_encoded_form(&self) -> bool {
        self.essence()
            .eq_ignore_ascii_case("application/x-www-form-urlencoded")
    }

    pub fn is_form_data(&self) -> bool {
        self.essence().eq_ignore_ascii_case("multipart/form-data")
    }

    /// Returns `true` for media types whose content is character data.
    pub fn is_text(&self) -> bool {
        if self.main_type().eq_ignore_ascii_case("text") || self.is_json() {
            return true;
        }

        let textual = |s: &str| {
            ["xml", "javascript", "x-www-form-urlencoded"]
                .iter()
                .any(|t| s.eq_ignore_ascii_case(t))
        };

        textual(self.sub_type()) || self.suffix().map_or(false, textual)
    }

    /// Returns `true` if `self`, possibly containing wildcards,
    /// matches the concrete media type `other`.
    pub fn matches(&self, other: &MimeType) -> bool {
        let main = self.main_type() == "*" || self.main_type().eq_ignore_ascii_case(other.main_type());
        let sub = self.sub_type() == "*" || self.sub_type().eq_ignore_ascii_case(other.sub_type());
        main && sub
    }

    /// Returns the underlying [`mime::Mime`].
    pub fn as_mime(&self) -> &mime::Mime {
        &self.0
    }
}

impl From<mime::Mime> for MimeType {
    fn from(mime: mime::Mime) -> Self {
        MimeType(mime)
    }
}

impl fmt::Debug for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MimeType({})", self.0)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The media types listed in a request's `Accept` headers,
/// keyed by their lowercase `type/subtype` essence.
#[derive(Clone, Debug, Default)]
pub struct Accepts {
    types: IndexMap<String, MimeType>,
}

impl Accepts {
    /// Parse a comma separated `Accept` value.
    ///
    /// Malformed entries are skipped. When the same essence appears
    /// twice the later entry wins.
    pub fn parse(value: &str) -> Accepts {
        let mut accepts = Accepts::default();
        accepts.extend(value);
        accepts
    }

    /// Collect every `Accept` header of a request.
    pub fn resolve(headers: &HeaderMap) -> Accepts {
        let mut accepts = Accepts::default();

        for value in headers.get_all(header::ACCEPT) {
            if let Ok(value) = value.to_str() {
                accepts.extend(value);
            }
        }

        accepts
    }

    fn extend(&mut self, value: &str) {
        for segment in value.split(',').filter(|s| !s.trim().is_empty()) {
            match MimeType::parse(segment) {
                Some(mime) => {
                    self.types.insert(mime.essence().to_ascii_lowercase(), mime);
                }
                None => tracing::trace!(segment, "skipping malformed accept entry"),
            }
        }
    }

    /// Returns the entry for the given `type/subtype`.
    pub fn get(&self, essence: &str) -> Option<&MimeType> {
        self.types.get(essence.to_ascii_lowercase().as_str())
    }

    pub fn contains(&self, essence: &str) -> bool {
        self.get(essence).is_some()
    }

    /// Returns `true` if a response of the given type is acceptable.
    ///
    /// A request without an `Accept` header accepts anything.
    pub fn accepts(&self, mime: &MimeType) -> bool {
        self.is_empty()
            || self
                .types
                .values()
                .any(|accepted| accepted.quality() > 0.0 && accepted.matches(mime))
    }

    /// Pick the offered media type the client prefers most.
    ///
    /// Ties are broken by the order of `offers`.
    pub fn preferred<'a>(&self, offers: &[&'a str]) -> Option<&'a str> {
        let mut best: Option<(&'a str, f32)> = None;

        for &offer in offers {
            let offered = match MimeType::parse(offer) {
                Some(offered) => offered,
                None => continue,
            };

            let quality = if self.is_empty() {
                1.0
            } else {
                self.types
                    .values()
                    .filter(|accepted| accepted.matches(&offered))
                    .map(MimeType::quality)
                    .fold(0.0, f32::max)
            };

            if quality > 0.0 && best.map_or(true, |(_, q)| quality > q) {
                best = Some((offer, quality));
            }
        }

        best.map(|(offer, _)| offer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MimeType)> {
        self.types.iter().map(|(key, mime)| (key.as_str(), mime))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_binary() {
        let mime = MimeType::resolve(None);
        assert_eq!(mime.essence(), "application/octet-stream");
        assert!(!mime.is_json());
        assert!(!mime.is_url_encoded_form());
        assert!(!mime.is_form_data());

        let malformed = HeaderValue::from_static("not a mime");
        assert_eq!(MimeType::resolve(Some(&malformed)), MimeType::binary());
    }

    #[test]
    fn classify() {
        let json = MimeType::parse("application/json; charset=utf-8").unwrap();
        assert!(json.is_json());
        assert!(json.is_text());
        assert_eq!(json.charset(), Some("utf-8"));

        let ld = MimeType::parse("application/ld+json").unwrap();
        assert!(ld.is_json());

        let form = MimeType::parse("application/x-www-form-urlencoded").unwrap();
        assert!(form.is_url_encoded_form());

        let multipart = MimeType::parse("multipart/form-data; boundary=abc").unwrap();
        assert!(multipart.is_form_data());
        assert_eq!(multipart.boundary(), Some("abc"));
        assert_eq!(multipart.main_type(), "multipart");
        assert_eq!(multipart.sub_type(), "form-data");

        assert!(!MimeType::parse("image/png").unwrap().is_text());
        assert!(MimeType::parse("image/svg+xml").unwrap().is_text());
    }

    #[test]
    fn accept_header() {
        let accepts = Accepts::parse("text/html, application/json");
        assert_eq!(accepts.len(), 2);
        assert!(accepts.contains("text/html"));
        assert!(accepts.contains("application/json"));
    }

    #[test]
    fn accept_skips_malformed_and_last_wins() {
        let accepts = Accepts::parse("text/html;q=0.2, nonsense, text/html;q=0.7");
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts.get("text/html").unwrap().quality(), 0.7);
    }

    #[test]
    fn negotiate() {
        let accepts = Accepts::parse("text/*;q=0.5, application/json");
        let html = MimeType::parse("text/html").unwrap();
        let png = MimeType::parse("image/png").unwrap();

        assert!(accepts.accepts(&html));
        assert!(!accepts.accepts(&png));
        assert_eq!(
            accepts.preferred(&["text/plain", "application/json"]),
            Some("application/json")
        );
        assert_eq!(accepts.preferred(&["image/png"]), None);
        assert!(Accepts::default().accepts(&png));
    }
}
