use crate::http::{header, Body, Bytes, HeaderValue, MimeType, Response, StatusCode};
use crate::pipeline::Handler;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// The result of a route handler.
///
/// Anything other than [`Reply::Response`] is wrapped into a response
/// using the route's [`RouteMeta`]. [`Reply::Empty`] leaves the
/// response slot untouched.
#[derive(Debug)]
pub enum Reply {
    Empty,
    Response(Response),
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl Reply {
    /// Serialize `value` into a JSON reply.
    pub fn json<T: Serialize>(value: T) -> Result<Reply, serde_json::Error> {
        serde_json::to_value(value).map(Reply::Json)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    /// Wrap the reply into a response described by `meta`.
    ///
    /// Returns `None` for [`Reply::Empty`].
    pub fn into_response(self, meta: &RouteMeta) -> Option<Response> {
        let (body, default_mime) = match self {
            Reply::Empty => return None,
            Reply::Response(response) => return Some(response),
            Reply::Text(text) => (Body::once(text), mime::TEXT_PLAIN),
            Reply::Bytes(bytes) => (Body::once(bytes), mime::APPLICATION_OCTET_STREAM),
            Reply::Json(value) => (Body::once(value.to_string()), mime::APPLICATION_JSON),
        };

        let mime = meta
            .mime
            .clone()
            .unwrap_or_else(|| MimeType::from(default_mime));

        let mut response = Response::new(body);
        *response.status_mut() = meta.status;

        if let Some(value) = content_type(&mime, meta.charset.as_deref()) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }

        Some(match &meta.processor {
            Some(processor) => processor(response),
            None => response,
        })
    }
}

fn content_type(mime: &MimeType, charset: Option<&str>) -> Option<HeaderValue> {
    let charset = match charset {
        Some(charset) => Some(charset),
        None if mime.main_type().eq_ignore_ascii_case("text") => Some("utf-8"),
        None => None,
    };

    let value = match charset {
        Some(charset) if mime.charset().is_none() => format!("{}; charset={}", mime, charset),
        _ => mime.to_string(),
    };

    HeaderValue::from_str(&value).ok()
}

impl From<()> for Reply {
    fn from(_: ()) -> Reply {
        Reply::Empty
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Reply {
        Reply::Response(response)
    }
}

impl From<serde_json::Value> for Reply {
    fn from(value: serde_json::Value) -> Reply {
        Reply::Json(value)
    }
}

impl<T> From<Option<T>> for Reply
where
    T: Into<Reply>,
{
    fn from(value: Option<T>) -> Reply {
        value.map(Into::into).unwrap_or(Reply::Empty)
    }
}

impl<T> From<(StatusCode, T)> for Reply
where
    T: Into<Reply>,
{
    fn from((status, reply): (StatusCode, T)) -> Reply {
        let meta = RouteMeta::new().status(status);
        let mut response = reply
            .into()
            .into_response(&meta)
            .unwrap_or_else(|| Response::new(Body::empty()));
        *response.status_mut() = status;
        Reply::Response(response)
    }
}

macro_rules! reply_from {
    ($($ty:ty $(|$into:ident)? => $variant:ident),* $(,)?) => { $(
        impl From<$ty> for Reply {
            fn from(value: $ty) -> Reply {
                Reply::$variant(value $(.$into())?.into())
            }
        })*
    }
}

reply_from! {
    Bytes => Bytes,
    Vec<u8> => Bytes,
    &'static [u8] => Bytes,
    Cow<'static, [u8]> | into_owned => Bytes,
    String => Text,
    &'static str => Text,
    Cow<'static, str> | into_owned => Text,
}

type Processor = Arc<dyn Fn(Response) -> Response + Send + Sync>;

/// Describes how a route's replies become responses.
#[derive(Clone)]
pub struct RouteMeta {
    pub(crate) status: StatusCode,
    pub(crate) mime: Option<MimeType>,
    pub(crate) charset: Option<String>,
    pub(crate) processor: Option<Processor>,
}

impl RouteMeta {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            mime: None,
            charset: None,
            processor: None,
        }
    }

    /// Set the status of wrapped replies.
    ///
    /// Defaults to `200 OK`.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set the content type of wrapped replies.
    ///
    /// By default it follows the reply: `text/plain` for text,
    /// `application/json` for JSON and `application/octet-stream`
    /// for bytes.
    pub fn mime(mut self, mime: MimeType) -> Self {
        self.mime = Some(mime);
        self
    }

    /// Set the charset appended to the content type.
    ///
    /// `text/*` types get `utf-8` unless told otherwise.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Run `f` on every wrapped reply before it is stored.
    pub fn processor<F>(mut self, f: F) -> Self
    where
        F: Fn(Response) -> Response + Send + Sync + 'static,
    {
        self.processor = Some(Arc::new(f));
        self
    }
}

impl Default for RouteMeta {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMeta")
            .field("status", &self.status)
            .field("mime", &self.mime)
            .field("charset", &self.charset)
            .field("processor", &self.processor.is_some())
            .finish()
    }
}

/// A handler together with its [`RouteMeta`].
pub struct Route {
    pub(crate) handler: Box<dyn Handler>,
    pub(crate) meta: RouteMeta,
}

impl Route {
    pub fn new(handler: impl Handler) -> Self {
        Self {
            handler: Box::new(handler),
            meta: RouteMeta::default(),
        }
    }

    pub fn meta(mut self, meta: RouteMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn route_meta(&self) -> &RouteMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_type_of(response: &Response) -> &str {
        response.headers()[header::CONTENT_TYPE].to_str().unwrap()
    }

    #[test]
    fn text_defaults() {
        let response = Reply::from("hello").into_response(&RouteMeta::new()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(content_type_of(&response), "text/plain; charset=utf-8");
    }

    #[test]
    fn meta_overrides() {
        let meta = RouteMeta::new()
            .status(StatusCode::CREATED)
            .mime(MimeType::parse("text/html").unwrap())
            .charset("iso-8859-1")
            .processor(|mut response| {
                response
                    .headers_mut()
                    .insert("x-processed", HeaderValue::from_static("yes"));
                response
            });

        let response = Reply::from(String::from("<p>hi</p>")).into_response(&meta).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(content_type_of(&response), "text/html; charset=iso-8859-1");
        assert_eq!(response.headers()["x-processed"], "yes");
    }

    #[test]
    fn json_and_bytes() {
        let reply = Reply::json(serde_json::json!({ "ok": true })).unwrap();
        let response = reply.into_response(&RouteMeta::new()).unwrap();
        assert_eq!(content_type_of(&response), "application/json");

        let response = Reply::from(vec![1u8, 2]).into_response(&RouteMeta::new()).unwrap();
        assert_eq!(content_type_of(&response), "application/octet-stream");
    }

    #[test]
    fn responses_bypass_meta() {
        let meta = RouteMeta::new()
            .status(StatusCode::CREATED)
            .processor(|_| Response::new(Body::from("replaced")));

        let response = Reply::from(Response::new(Body::empty())).into_response(&meta).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());

        assert!(Reply::from(()).into_response(&meta).is_none());
        assert!(Reply::from(None::<String>).is_empty());
    }

    #[test]
    fn status_tuple() {
        let reply = Reply::from((StatusCode::NOT_FOUND, "missing"));
        match reply {
            Reply::Response(response) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
                assert_eq!(content_type_of(&response), "text/plain; charset=utf-8");
            }
            other => panic!("expected a response, got {:?}", other),
        }
    }
}
