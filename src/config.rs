use crate::decode::Charset;
use crate::http::{MimeType, StatusCode};

use serde::de::{self, Deserialize, Deserializer};

/// Per-application settings for request contexts.
///
/// `Config` can be built in code or deserialized by whatever
/// settings loader the application uses:
///
/// ```
/// let config = corral::Config::new()
///     .default_charset(corral::decode::Charset::Iso8859_1)
///     .no_content_status(corral::http::StatusCode::OK);
/// ```
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub(crate) default_charset: Charset,
    #[serde(deserialize_with = "status_code")]
    pub(crate) no_content_status: StatusCode,
    #[serde(deserialize_with = "mime_type")]
    pub(crate) part_content_type: MimeType,
}

impl Config {
    /// Create a [`Config`] instance with the default settings.
    pub fn new() -> Self {
        Self {
            default_charset: Charset::Utf8,
            no_content_status: StatusCode::NO_CONTENT,
            part_content_type: MimeType::from(mime::TEXT_PLAIN),
        }
    }

    /// Set the charset used to decode text that declares none.
    ///
    /// By default this is UTF-8.
    pub fn default_charset(mut self, charset: Charset) -> Self {
        self.default_charset = charset;
        self
    }

    /// Set the status of the empty response sent when the pipeline
    /// finishes without producing one.
    ///
    /// By default this is `204 No Content`.
    pub fn no_content_status(mut self, status: StatusCode) -> Self {
        self.no_content_status = status;
        self
    }

    /// Set the content type assumed for multipart parts that declare none.
    ///
    /// By default this is `text/plain`.
    pub fn part_content_type(mut self, mime: MimeType) -> Self {
        self.part_content_type = mime;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn status_code<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
where
    D: Deserializer<'de>,
{
    let code = u16::deserialize(deserializer)?;
    StatusCode::from_u16(code).map_err(de::Error::custom)
}

fn mime_type<'de, D>(deserializer: D) -> Result<MimeType, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    MimeType::parse(&value)
        .ok_or_else(|| de::Error::custom(format!("invalid media type `{}`", value)))
}
