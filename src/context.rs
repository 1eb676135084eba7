use crate::app::Shared;
use crate::config::Config;
use crate::decode::{self, DecodeError, DecodedBody, FormData, FormField};
use crate::error::Rejection;
use crate::http::header::{self, AsHeaderName};
use crate::http::{
    Accepts, Authorization, Body, BodyError, Bytes, Cookies, HeaderMap, HeaderValue, Method,
    MimeType, Params, Request, Response, Uri, Version,
};
use crate::pipeline::{Catch, Route, Stage};
use crate::session::{Session, SessionUnavailable};
use crate::state::Variables;
use crate::user::UserFetcher;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Everything known about a request while it is being handled.
///
/// Derived request data, such as the query parameters or the content
/// type, is computed on first access and cached for the rest of the
/// request. The body is read at most once; every body accessor after
/// the first works from the buffered bytes.
pub struct Context {
    head: http::request::Parts,
    body: Option<Body>,
    params: Params,
    query: OnceCell<Params>,
    cookies: OnceCell<Cookies>,
    mime_type: OnceCell<MimeType>,
    accepts: OnceCell<Accepts>,
    authorization: OnceCell<Option<Authorization>>,
    raw_body: OnceCell<Result<Bytes, String>>,
    session: Option<Session>,
    variables: Variables,
    response: Option<Response>,
    stage: Stage,
    shared: Arc<Shared>,
}

impl Context {
    pub(crate) fn new(request: Request, params: Params, shared: Arc<Shared>) -> Self {
        let (head, body) = request.into_parts();

        Self {
            head,
            body: Some(body),
            params,
            query: OnceCell::new(),
            cookies: OnceCell::new(),
            mime_type: OnceCell::new(),
            accepts: OnceCell::new(),
            authorization: OnceCell::new(),
            raw_body: OnceCell::new(),
            session: None,
            variables: Variables::new(),
            response: None,
            stage: Stage::default(),
            shared,
        }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn header<K: AsHeaderName>(&self, key: K) -> Option<&HeaderValue> {
        self.head.headers.get(key)
    }

    /// Returns the route parameter with the given name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The route parameters supplied by the router.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the first query parameter with the given name.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.queries().get(name)
    }

    /// The decoded query string.
    ///
    /// A malformed query string decodes as empty.
    pub fn queries(&self) -> &Params {
        self.query.get_or_init(|| match self.head.uri.query() {
            Some(query) => Params::parse_query(query).unwrap_or_else(|err| {
                tracing::debug!(error = %err, "ignoring malformed query string");
                Params::new()
            }),
            None => Params::new(),
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name)
    }

    pub fn cookies(&self) -> &Cookies {
        self.cookies
            .get_or_init(|| Cookies::resolve(&self.head.headers))
    }

    /// The request content type, `application/octet-stream` when
    /// missing or invalid.
    pub fn mime_type(&self) -> &MimeType {
        self.mime_type
            .get_or_init(|| MimeType::resolve(self.head.headers.get(header::CONTENT_TYPE)))
    }

    pub fn accepts(&self) -> &Accepts {
        self.accepts
            .get_or_init(|| Accepts::resolve(&self.head.headers))
    }

    pub fn authorization(&self) -> Option<&Authorization> {
        self.authorization
            .get_or_init(|| {
                self.head
                    .headers
                    .get(header::AUTHORIZATION)
                    .and_then(Authorization::parse)
            })
            .as_ref()
    }

    /// Read the whole request body.
    ///
    /// The body stream is consumed by the first call; later calls
    /// return the same bytes, or the same error.
    pub async fn bytes(&mut self) -> Result<Bytes, BodyError> {
        if self.raw_body.get().is_none() {
            let body = self.body.take().unwrap_or_default();
            let read = body.collect().await.map_err(|err| err.0.to_string());
            let _ = self.raw_body.set(read);
        }

        match self.raw_body.get() {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(message)) => Err(BodyError(message.clone().into())),
            None => Err(BodyError("request body unavailable".into())),
        }
    }

    /// Read the body as text, using the charset of the content type.
    pub async fn text(&mut self) -> Result<String, DecodeError> {
        let bytes = self.bytes().await?;
        decode::decode_text(self.mime_type(), bytes, self.config())
            .map_err(decode_failed)
    }

    /// Deserialize the body as JSON, whatever its declared content type.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, DecodeError> {
        let text = self.text().await?;
        serde_json::from_str(&text)
            .map_err(DecodeError::from)
            .map_err(decode_failed)
    }

    pub async fn json_value(&mut self) -> Result<Value, DecodeError> {
        self.json::<Value>().await
    }

    pub async fn json_map(&mut self) -> Result<Map<String, Value>, DecodeError> {
        self.json::<Map<String, Value>>().await
    }

    pub async fn json_list(&mut self) -> Result<Vec<Value>, DecodeError> {
        self.json::<Vec<Value>>().await
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    ///
    /// Returns `None` for other content types.
    pub async fn url_encoded(&mut self) -> Result<Option<IndexMap<String, String>>, DecodeError> {
        if !self.mime_type().is_url_encoded_form() {
            return Ok(None);
        }

        let bytes = self.bytes().await?;
        decode::url_encoded(&bytes).map(Some).map_err(decode_failed)
    }

    /// Deserialize an `application/x-www-form-urlencoded` body.
    ///
    /// Returns `None` for other content types.
    pub async fn form<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        if !self.mime_type().is_url_encoded_form() {
            return Ok(None);
        }

        let bytes = self.bytes().await?;
        serde_urlencoded::from_bytes(&bytes)
            .map(Some)
            .map_err(DecodeError::from)
            .map_err(decode_failed)
    }

    /// Parse a `multipart/form-data` body.
    ///
    /// Returns `None` for other content types.
    pub async fn form_data(&mut self) -> Result<Option<FormData>, DecodeError> {
        if !self.mime_type().is_form_data() {
            return Ok(None);
        }

        match self.decode().await? {
            DecodedBody::MultipartForm(form) => Ok(Some(form)),
            _ => Ok(None),
        }
    }

    /// Decode the body according to its content type.
    pub async fn decode(&mut self) -> Result<DecodedBody, DecodeError> {
        let bytes = self.bytes().await?;
        decode::decode(self.mime_type(), Body::once(bytes), self.config())
            .await
            .map_err(decode_failed)
    }

    /// Decode the body and deserialize it into `T`.
    ///
    /// JSON bodies deserialize directly. Url-encoded bodies, and the
    /// string fields of multipart bodies, deserialize like a query
    /// string. Returns `None` when no decoder applies.
    pub async fn decode_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        let pairs: Vec<(String, String)> = match self.decode().await? {
            DecodedBody::Json(value) => {
                return serde_json::from_value(value)
                    .map(Some)
                    .map_err(DecodeError::from)
                    .map_err(decode_failed)
            }
            DecodedBody::UrlEncodedForm(map) => map.into_iter().collect(),
            DecodedBody::MultipartForm(form) => form
                .into_iter()
                .filter_map(|(name, field)| match field {
                    FormField::String(field) => Some((name, field.into_value())),
                    _ => None,
                })
                .collect(),
            DecodedBody::Unsupported => return Ok(None),
        };

        let query = serde_urlencoded::to_string(&pairs)?;
        serde_urlencoded::from_str(&query)
            .map(Some)
            .map_err(DecodeError::from)
            .map_err(decode_failed)
    }

    /// The typed values shared between interceptors and the handler.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    /// Returns application state of type `T`.
    pub fn state<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.shared.state.get::<T>()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns the session, loading it on first access.
    pub async fn session(&mut self) -> Result<&mut Session, Rejection> {
        if self.session.is_none() {
            let shared = self.shared.clone();
            let manager = shared.sessions.as_deref().ok_or(SessionUnavailable)?;
            let session = manager.parse(self).await?;
            self.session = Some(session);
        }

        self.session
            .as_mut()
            .ok_or_else(|| SessionUnavailable.into())
    }

    /// Returns the session if it was already loaded.
    pub fn session_if_loaded(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the registered fetcher for users of type `U`.
    pub fn user_fetcher<U>(&self) -> Option<&dyn UserFetcher<U>>
    where
        U: Send + 'static,
    {
        self.shared.users.get::<U>()
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Replace the response, returning the previous one.
    pub fn set_response(&mut self, response: Response) -> Option<Response> {
        self.response.replace(response)
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        tracing::trace!(from = %self.stage, to = %stage, "entering stage");
        self.stage = stage;
    }

    pub fn exception_handlers(&self) -> &[Box<dyn Catch>] {
        self.shared.pipeline.exception_handlers()
    }

    /// Run the pipeline for `route` and return the final response.
    ///
    /// A rejection no exception handler claims is returned as is.
    /// The stage is [`Stage::Done`] afterwards, whatever the outcome.
    pub async fn run(&mut self, route: &Route) -> Result<Response, Rejection> {
        let shared = self.shared.clone();

        let mut result = match shared.pipeline.execute(self, route).await {
            Ok(()) => Ok(()),
            Err(err) => shared.pipeline.recover(err, self).await,
        };

        self.enter(Stage::Done);

        if result.is_ok() {
            result = self.persist_session().await;
        }

        result?;

        Ok(self.take_response().unwrap_or_else(|| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = self.config().no_content_status;
            response
        }))
    }

    async fn persist_session(&mut self) -> Result<(), Rejection> {
        let shared = self.shared.clone();

        let manager = match shared.sessions.as_deref() {
            Some(manager) => manager,
            None => return Ok(()),
        };

        let mut session = match self.session.take() {
            Some(session) if session.needs_update() => session,
            session => {
                self.session = session;
                return Ok(());
            }
        };

        let result = manager.persist(self, &session).await;
        if result.is_ok() {
            session.mark_clean();
        }

        self.session = Some(session);
        result
    }
}

fn decode_failed(err: DecodeError) -> DecodeError {
    tracing::debug!(error = %err, "failed to decode request body");
    err
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("params", &self.params)
            .field("stage", &self.stage)
            .field("has_response", &self.response.is_some())
            .finish()
    }
}
