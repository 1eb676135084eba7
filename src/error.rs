use crate::http::{Body, Response, StatusCode};

use std::any::Any;
use std::convert::Infallible;
use std::fmt::{self, Debug, Display};

/// An error capable of rejecting a request with an HTTP error response.
pub trait Reject: Debug + Display + Send + 'static {
    /// Reject the request with an HTTP error response.
    fn reject(self) -> Response;
}

impl Reject for StatusCode {
    fn reject(self) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = self;
        response
    }
}

impl Reject for Infallible {
    fn reject(self) -> Response {
        match self {}
    }
}

/// A dynamically typed rejection.
///
/// Every failure raised by an interceptor, a handler, or an
/// exception handler travels through the pipeline as a `Rejection`.
/// The concrete error can be recovered with [`Rejection::downcast_ref`].
pub struct Rejection {
    inner: Box<dyn BoxedReject>,
}

impl Rejection {
    /// Create a new `Rejection`.
    pub fn new<E>(err: E) -> Self
    where
        E: IntoRejection,
    {
        err.into_rejection()
    }

    /// Convert this error into an HTTP response.
    ///
    /// This method is analogous to [`Reject::reject`],
    /// which cannot be implemented directly due to
    /// coherence rules.
    pub fn reject(self) -> Response {
        self.inner.reject_boxed()
    }

    /// Returns `true` if the underlying error is of type `E`.
    pub fn is<E: Reject>(&self) -> bool {
        self.inner.as_any().is::<E>()
    }

    /// Returns a reference to the underlying error if it is of type `E`.
    pub fn downcast_ref<E: Reject>(&self) -> Option<&E> {
        self.inner.as_any().downcast_ref::<E>()
    }

    /// Attempt to take ownership of the underlying error.
    pub fn downcast<E: Reject>(self) -> Result<E, Self> {
        if !self.is::<E>() {
            return Err(self);
        }

        match self.inner.into_any().downcast::<E>() {
            Ok(err) => Ok(*err),
            Err(_) => unreachable!("type checked above"),
        }
    }
}

trait BoxedReject: Reject {
    fn reject_boxed(self: Box<Self>) -> Response;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Reject> BoxedReject for T {
    fn reject_boxed(self: Box<Self>) -> Response {
        Reject::reject(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl<E> From<E> for Rejection
where
    E: Reject,
{
    fn from(err: E) -> Self {
        Self {
            inner: Box::new(err),
        }
    }
}

/// A type that can be converted into a [`Rejection`].
///
/// This trait allows [`Rejection`] and [`Response`]
/// to be used as rejections while not implementing
/// [`Reject`] directly.
pub trait IntoRejection {
    fn into_rejection(self) -> Rejection;
}

impl<E> IntoRejection for E
where
    E: Reject,
{
    fn into_rejection(self) -> Rejection {
        self.into()
    }
}

impl IntoRejection for Rejection {
    fn into_rejection(self) -> Rejection {
        self
    }
}

impl IntoRejection for Response {
    fn into_rejection(self) -> Rejection {
        Responded(self).into()
    }
}

/// A rejection carrying a ready-made response.
struct Responded(Response);

impl fmt::Debug for Responded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Responded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected with status {}", self.0.status())
    }
}

impl Reject for Responded {
    fn reject(self) -> Response {
        self.0
    }
}

/// A generic server error for failures that carry no response of their own.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ServerError(pub String);

impl Reject for ServerError {
    fn reject(self) -> Response {
        StatusCode::INTERNAL_SERVER_ERROR.reject()
    }
}
