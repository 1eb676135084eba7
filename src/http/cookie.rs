use super::{header, HeaderMap};

use indexmap::IndexMap;

/// The cookies sent with a request.
#[derive(Clone, Debug, Default)]
pub struct Cookies {
    map: IndexMap<String, String>,
}

impl Cookies {
    /// Parse every `Cookie` header of a request.
    ///
    /// Pairs without a `=` are ignored. If a name occurs more
    /// than once the first occurrence is kept.
    pub fn resolve(headers: &HeaderMap) -> Cookies {
        let mut cookies = Cookies::default();

        for value in headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend(value);
            }
        }

        cookies
    }

    pub fn parse(value: &str) -> Cookies {
        let mut cookies = Cookies::default();
        cookies.extend(value);
        cookies
    }

    fn extend(&mut self, value: &str) {
        for pair in value.split(';') {
            let (name, value) = match pair.split_once('=') {
                Some((name, value)) => (name.trim(), value.trim()),
                None => continue,
            };

            if name.is_empty() {
                continue;
            }

            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            self.map
                .entry(name.to_owned())
                .or_insert_with(|| value.to_owned());
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HeaderValue;

    #[test]
    fn parse() {
        let cookies = Cookies::parse("sid=abc123; theme=\"dark\"; flag; sid=other; =x");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("sid"), Some("abc123"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.get("flag"), None);
    }

    #[test]
    fn multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("b=2; a=3"));

        let cookies = Cookies::resolve(&headers);
        assert_eq!(cookies.iter().collect::<Vec<_>>(), [("a", "1"), ("b", "2")]);
    }
}
