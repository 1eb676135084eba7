//! Content-type driven request body decoding.

mod charset;
mod form;
pub mod multipart;

pub use charset::{Charset, InvalidText};
pub use form::{BinaryFileField, FormData, FormField, StringField, TextFileField, TextStream};
pub use multipart::MultipartError;

use crate::config::Config;
use crate::error::Reject;
use crate::http::{Body, BodyError, MimeType, Response, StatusCode};

use indexmap::IndexMap;

/// A request body decoded according to its content type.
#[derive(Debug)]
pub enum DecodedBody {
    Json(serde_json::Value),
    UrlEncodedForm(IndexMap<String, String>),
    MultipartForm(FormData),
    /// No generic decoder applies; the raw bytes or text can
    /// still be read directly.
    Unsupported,
}

/// Errors raised while decoding a request body.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error("failed to decode JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode url-encoded body: {0}")]
    UrlEncoded(#[from] serde_urlencoded::de::Error),
    #[error("failed to encode form fields: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),
    #[error("multipart content type has no boundary parameter")]
    MissingBoundary,
    #[error("failed to decode multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("unsupported charset `{0}`")]
    Charset(String),
    #[error(transparent)]
    Text(#[from] InvalidText),
    #[error("unsupported content type `{0}`")]
    ContentType(MimeType),
}

impl Reject for DecodeError {
    fn reject(self) -> Response {
        match self {
            DecodeError::Charset(_) | DecodeError::ContentType(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            DecodeError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
        .reject()
    }
}

/// Decode a body according to its media type.
///
/// JSON is tried first, then url-encoded forms, then multipart forms;
/// anything else is [`DecodedBody::Unsupported`].
pub async fn decode(mime: &MimeType, body: Body, config: &Config) -> Result<DecodedBody, DecodeError> {
    let decoded = if mime.is_json() {
        let text = decode_text(mime, body.collect().await?, config)?;
        DecodedBody::Json(serde_json::from_str(&text)?)
    } else if mime.is_url_encoded_form() {
        DecodedBody::UrlEncodedForm(url_encoded(&body.collect().await?)?)
    } else if mime.is_form_data() {
        let boundary = mime.boundary().ok_or(DecodeError::MissingBoundary)?;
        let form = FormData::parse(
            boundary,
            body,
            &config.part_content_type,
            config.default_charset,
        )
        .await?;
        DecodedBody::MultipartForm(form)
    } else {
        DecodedBody::Unsupported
    };

    Ok(decoded)
}

/// Decode `key=value` pairs joined by `&`.
///
/// Both sides are percent-decoded and a pair without `=` has an empty
/// value. A repeated key keeps its last value.
pub fn url_encoded(bytes: &[u8]) -> Result<IndexMap<String, String>, DecodeError> {
    let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)?;
    Ok(pairs.into_iter().collect())
}

/// Decode text using the charset declared by `mime`.
pub fn decode_text(mime: &MimeType, bytes: impl AsRef<[u8]>, config: &Config) -> Result<String, DecodeError> {
    let charset = Charset::for_mime(mime, config.default_charset).map_err(DecodeError::Charset)?;

    charset
        .decode(bytes.as_ref())
        .ok_or(DecodeError::Text(InvalidText(charset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(value: &str) -> MimeType {
        MimeType::parse(value).unwrap()
    }

    #[test]
    fn url_encoded_pairs() {
        let map = url_encoded(b"a=1&b=&c").unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "");
        assert_eq!(map["c"], "");

        let map = url_encoded(b"name=hello%20world&x=a+b&x=last").unwrap();
        assert_eq!(map["name"], "hello world");
        assert_eq!(map["x"], "last");
    }

    #[tokio::test]
    async fn dispatch() {
        let config = Config::new();

        let json = decode(&mime("application/json"), Body::once(r#"{"a":[1,2]}"#), &config).await;
        match json.unwrap() {
            DecodedBody::Json(value) => assert_eq!(value["a"][1], 2),
            other => panic!("unexpected {:?}", other),
        }

        let form = decode(&mime("application/x-www-form-urlencoded"), Body::once("a=1"), &config).await;
        assert!(matches!(form.unwrap(), DecodedBody::UrlEncodedForm(map) if map["a"] == "1"));

        let text = decode(&mime("text/plain"), Body::once("a=1"), &config).await;
        assert!(matches!(text.unwrap(), DecodedBody::Unsupported));
    }

    #[tokio::test]
    async fn failures() {
        let config = Config::new();

        let err = decode(&mime("application/json"), Body::once("{"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert_eq!(err.reject().status(), StatusCode::BAD_REQUEST);

        let err = decode(&mime("multipart/form-data"), Body::once("--x--"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingBoundary));

        let err = decode(&mime("application/json; charset=koi8-r"), Body::once("{}"), &config)
            .await
            .unwrap_err();
        assert_eq!(err.reject().status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
