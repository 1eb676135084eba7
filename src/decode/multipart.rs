//! A streaming `multipart/form-data` splitter.
//!
//! [`Multipart`] walks a body stream part by part:
//!
//! ```text
//! preamble --boundary CRLF headers CRLF CRLF content CRLF --boundary CRLF ... --boundary--
//! ```
//!
//! Parts are produced strictly in order and never revisited.

use crate::http::header::{self, HeaderName, HeaderValue};
use crate::http::{Body, BodyError, HeaderMap, MimeType};

use std::borrow::Cow;

use bytes::{Buf, Bytes, BytesMut};
use indexmap::IndexMap;

/// Errors raised while splitting a multipart body.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("multipart body ended before the closing boundary")]
    UnexpectedEof,
    #[error("malformed multipart delimiter line")]
    Delimiter,
    #[error("invalid multipart part header: {0}")]
    InvalidHeader(String),
    #[error("multipart part is missing a content-disposition header")]
    MissingDisposition,
    #[error("multipart part content-disposition has no name")]
    MissingName,
    #[error(transparent)]
    Body(#[from] BodyError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Preamble,
    Headers,
    Content,
    End,
}

/// A multipart body being split into parts.
pub struct Multipart {
    body: Body,
    buf: BytesMut,
    // `--boundary`
    delimiter: Bytes,
    // `CRLF--boundary`
    close: Bytes,
    state: State,
    headers: Option<HeaderMap>,
    // bytes of content already searched for `close`
    scanned: usize,
}

impl Multipart {
    pub fn new(boundary: &str, body: Body) -> Multipart {
        let delimiter = Bytes::from(format!("--{}", boundary));
        let close = Bytes::from(format!("\r\n--{}", boundary));

        Multipart {
            body,
            buf: BytesMut::new(),
            delimiter,
            close,
            state: State::Preamble,
            headers: None,
            scanned: 0,
        }
    }

    /// Read the next part, or `None` after the closing boundary.
    pub async fn next_part(&mut self) -> Result<Option<Part>, MultipartError> {
        loop {
            match self.state {
                State::End => return Ok(None),
                State::Preamble => {
                    if let Some((next, state)) = self.first_delimiter() {
                        self.buf.advance(next);
                        self.enter(state);
                        continue;
                    }
                }
                State::Headers => {
                    let end = if self.buf.starts_with(b"\r\n") {
                        Some((0, 2))
                    } else {
                        find(&self.buf, b"\r\n\r\n").map(|at| (at, at + 4))
                    };

                    if let Some((at, next)) = end {
                        let headers = parse_headers(&self.buf[..at])?;
                        self.buf.advance(next);
                        self.headers = Some(headers);
                        self.enter(State::Content);
                        continue;
                    }
                }
                State::Content => {
                    let from = self.scanned.saturating_sub(self.close.len());

                    match find(&self.buf[from..], &self.close).map(|at| at + from) {
                        Some(at) => {
                            if let Some((next, state)) = self.after_delimiter(at + self.close.len())? {
                                let data = self.buf.split_to(at).freeze();
                                self.buf.advance(next - at);
                                self.enter(state);

                                let headers = self.headers.take().unwrap_or_default();
                                return Part::new(headers, data).map(Some);
                            }
                        }
                        None => self.scanned = self.buf.len(),
                    }
                }
            }

            if !self.fill().await? {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }

    fn enter(&mut self, state: State) {
        tracing::trace!(from = ?self.state, to = ?state, "multipart state");
        self.state = state;
        self.scanned = 0;
    }

    /// Find the first delimiter line of the body.
    ///
    /// A delimiter only counts at the start of the body or right after
    /// a CRLF. Boundary text elsewhere in the preamble is skipped.
    fn first_delimiter(&self) -> Option<(usize, State)> {
        let mut from = 0;

        loop {
            let at = if from == 0 && self.buf.starts_with(&self.delimiter) {
                0
            } else {
                from + find(&self.buf[from..], &self.close)? + 2
            };

            match self.after_delimiter(at + self.delimiter.len()) {
                Ok(found) => return found,
                Err(_) => from = at + 1,
            }
        }
    }

    /// Inspect what follows a delimiter ending at `at`.
    ///
    /// Returns the offset of the next section and the state to enter,
    /// or `None` if more input is needed.
    fn after_delimiter(&self, at: usize) -> Result<Option<(usize, State)>, MultipartError> {
        let rest = &self.buf[at..];

        if rest.starts_with(b"--") {
            return Ok(Some((at + 2, State::End)));
        }

        // transport padding
        let padding = rest.iter().take_while(|&&b| b == b' ' || b == b'\t').count();
        let line = &rest[padding..];

        if line.starts_with(b"\r\n") {
            return Ok(Some((at + padding + 2, State::Headers)));
        }

        match line {
            [] | [b'\r'] => Ok(None),
            [b'-'] if padding == 0 => Ok(None),
            _ => Err(MultipartError::Delimiter),
        }
    }

    async fn fill(&mut self) -> Result<bool, MultipartError> {
        match self.body.chunk().await {
            Some(chunk) => {
                self.buf.extend_from_slice(&chunk?);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A single part of a multipart body.
#[derive(Debug)]
pub struct Part {
    headers: HeaderMap,
    disposition: Disposition,
    content_type: Option<MimeType>,
    data: Bytes,
}

impl Part {
    fn new(headers: HeaderMap, data: Bytes) -> Result<Part, MultipartError> {
        let disposition = headers
            .get(header::CONTENT_DISPOSITION)
            .map(|value| Disposition::parse(&String::from_utf8_lossy(value.as_bytes())))
            .ok_or(MultipartError::MissingDisposition)?;

        if disposition.name().is_none() {
            return Err(MultipartError::MissingName);
        }

        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(MimeType::parse);

        Ok(Part {
            headers,
            disposition,
            content_type,
            data,
        })
    }

    /// The field name from the content-disposition header.
    pub fn name(&self) -> &str {
        self.disposition.name().unwrap_or_default()
    }

    pub fn filename(&self) -> Option<&str> {
        self.disposition.filename()
    }

    /// The declared content type, if any.
    pub fn content_type(&self) -> Option<&MimeType> {
        self.content_type.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub(crate) fn into_parts(self) -> (Disposition, Option<MimeType>, Bytes) {
        (self.disposition, self.content_type, self.data)
    }
}

/// A parsed `Content-Disposition` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    kind: String,
    params: IndexMap<String, String>,
}

impl Disposition {
    /// Parse a content-disposition value such as
    /// `form-data; name="file"; filename="a.txt"`.
    pub fn parse(value: &str) -> Disposition {
        let (kind, mut rest) = value.split_once(';').unwrap_or((value, ""));
        let mut params = IndexMap::new();

        loop {
            rest = rest.trim_start_matches(|c: char| c == ';' || c.is_ascii_whitespace());
            if rest.is_empty() {
                break;
            }

            let key_end = rest.find(|c| c == '=' || c == ';').unwrap_or(rest.len());
            let key = rest[..key_end].trim().to_ascii_lowercase();
            rest = &rest[key_end..];

            let mut value = match rest.strip_prefix('=') {
                Some(after) => {
                    let (value, remaining) = parse_value(after.trim_start());
                    rest = remaining;
                    value
                }
                None => String::new(),
            };

            if key.ends_with('*') {
                value = decode_extended(&value).unwrap_or(value);
            }

            if !key.is_empty() {
                params.insert(key, value);
            }
        }

        Disposition {
            kind: kind.trim().to_ascii_lowercase(),
            params,
        }
    }

    /// The disposition type, `form-data` for form fields.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.param("name")
    }

    /// The filename, preferring the extended `filename*` parameter.
    pub fn filename(&self) -> Option<&str> {
        self.param("filename*").or_else(|| self.param("filename"))
    }
}

/// Parse a token or quoted-string, returning the value and the remaining input.
fn parse_value(input: &str) -> (String, &str) {
    if let Some(quoted) = input.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = quoted.char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                }
                '"' => return (value, &quoted[i + 1..]),
                c => value.push(c),
            }
        }

        return (value, "");
    }

    let end = input.find(';').unwrap_or(input.len());
    (input[..end].trim().to_owned(), &input[end..])
}

/// Decode an RFC 5987 extended value: `charset'language'percent-encoded`.
fn decode_extended(value: &str) -> Option<String> {
    let mut sections = value.splitn(3, '\'');
    let (_charset, _language, encoded) = (sections.next()?, sections.next()?, sections.next()?);
    urlencoding::decode(encoded).ok().map(Cow::into_owned)
}

fn parse_headers(block: &[u8]) -> Result<HeaderMap, MultipartError> {
    let mut headers = HeaderMap::new();

    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| MultipartError::InvalidHeader(String::from_utf8_lossy(line).into()))?;

        let name = HeaderName::from_bytes(trim(&line[..colon]))
            .map_err(|err| MultipartError::InvalidHeader(err.to_string()))?;
        let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
            .map_err(|err| MultipartError::InvalidHeader(err.to_string()))?;

        headers.append(name, value);
    }

    Ok(headers)
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |end| end + 1);

    &bytes[start..end]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
