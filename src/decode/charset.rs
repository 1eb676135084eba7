use crate::http::MimeType;

use std::fmt;

use serde::Deserialize;

/// A character encoding the decoders understand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Charset {
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "us-ascii", alias = "ascii")]
    UsAscii,
    #[serde(rename = "iso-8859-1", alias = "latin1")]
    Iso8859_1,
}

impl Charset {
    /// Look up a charset by its (case-insensitive) IANA label.
    pub fn from_label(label: &str) -> Option<Charset> {
        let label = label.trim().trim_matches('"');

        [
            (Charset::Utf8, &["utf-8", "utf8"][..]),
            (Charset::UsAscii, &["us-ascii", "ascii"][..]),
            (Charset::Iso8859_1, &["iso-8859-1", "latin1", "l1"][..]),
        ]
        .into_iter()
        .find(|(_, labels)| labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
        .map(|(charset, _)| charset)
    }

    /// The charset declared by `mime`, or `default` if it declares none.
    ///
    /// Returns `Err` with the label if the declared charset is unsupported.
    pub fn for_mime(mime: &MimeType, default: Charset) -> Result<Charset, String> {
        match mime.charset() {
            Some(label) => Charset::from_label(label).ok_or_else(|| label.to_owned()),
            None => Ok(default),
        }
    }

    /// Returns `true` if `bytes` is valid text in this charset.
    pub fn can_decode(self, bytes: &[u8]) -> bool {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes).is_ok(),
            Charset::UsAscii => bytes.is_ascii(),
            Charset::Iso8859_1 => true,
        }
    }

    /// Decode a complete buffer.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Charset::UsAscii => bytes
                .is_ascii()
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            Charset::Iso8859_1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::UsAscii => "us-ascii",
            Charset::Iso8859_1 => "iso-8859-1",
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::Utf8
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Incremental decoder for text arriving in arbitrary chunks.
///
/// A multi-byte sequence split across two chunks is held back
/// until the rest of it arrives.
#[derive(Debug)]
pub(crate) struct Decoder {
    charset: Charset,
    pending: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
#[error("content is not valid {0} text")]
pub struct InvalidText(pub Charset);

impl Decoder {
    pub(crate) fn new(charset: Charset) -> Decoder {
        Decoder {
            charset,
            pending: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<String, InvalidText> {
        if self.charset != Charset::Utf8 {
            return self.charset.decode(chunk).ok_or(InvalidText(self.charset));
        }

        self.pending.extend_from_slice(chunk);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // incomplete sequence at the end
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(InvalidText(self.charset)),
        };

        let rest = self.pending.split_off(valid);
        let text = std::mem::replace(&mut self.pending, rest);

        String::from_utf8(text).map_err(|_| InvalidText(self.charset))
    }

    pub(crate) fn finish(&mut self) -> Result<(), InvalidText> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(InvalidText(self.charset))
        }
    }
}
