use crate::bounded::async_trait;
use crate::error::{Reject, Rejection};
use crate::http::{Response, StatusCode};
use crate::Context;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Session data for the current request.
///
/// Every mutation marks the session dirty; a dirty session is handed
/// back to the [`SessionManager`] once the pipeline has produced a
/// response.
#[derive(Clone, Debug, Default)]
pub struct Session {
    id: Option<String>,
    values: Map<String, Value>,
    dirty: bool,
}

impl Session {
    /// Create a clean session, as loaded from a store.
    pub fn new(id: Option<String>, values: Map<String, Value>) -> Session {
        Session {
            id,
            values,
            dirty: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
        self.dirty = true;
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.into(), value);
        self.dirty = true;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        self.dirty |= removed.is_some();
        removed
    }

    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.dirty = true;
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Returns `true` if the session changed since it was loaded.
    pub fn needs_update(&self) -> bool {
        self.dirty
    }

    /// Mark the session as persisted.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Loads and stores sessions.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait SessionManager: Send + Sync + 'static {
    /// Load the session belonging to a request.
    ///
    /// Requests without a session should get a fresh, empty one.
    async fn parse(&self, cx: &Context) -> Result<Session, Rejection>;

    /// Store a session that was modified while handling a request.
    ///
    /// The response is available through `cx` so that cookies
    /// can be attached to it.
    async fn persist(&self, cx: &mut Context, session: &Session) -> Result<(), Rejection>;
}

/// The error returned when a session is requested but no
/// [`SessionManager`] was configured.
#[derive(Debug, thiserror::Error)]
#[error("no session manager configured")]
pub struct SessionUnavailable;

impl Reject for SessionUnavailable {
    fn reject(self) -> Response {
        StatusCode::INTERNAL_SERVER_ERROR.reject()
    }
}
