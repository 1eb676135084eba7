//! HTTP primitives shared by the context and the pipeline.

mod auth;
mod body;
mod cookie;
mod mime;
mod params;

pub use self::auth::Authorization;
pub use self::body::{Body, BodyError};
pub use self::cookie::Cookies;
pub use self::mime::{Accepts, MimeType};
pub use self::params::Params;

pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri, Version};

/// An HTTP request.
pub type Request = http::Request<Body>;

/// An HTTP response.
pub type Response = http::Response<Body>;
