//! The per-request core of a web framework.
//!
//! A [`Context`] wraps an incoming request together with lazily
//! computed views of it (query parameters, cookies, content type,
//! decoded body), a typed variable store and the response being
//! built. An [`App`] runs contexts through a pipeline of
//! [interceptors](pipeline::Interceptor), a route
//! [handler](pipeline::Handler) and [exception handlers](pipeline::Catch).
//!
//! Transport and routing live outside this crate: the caller supplies
//! a request, the route parameters, and the [`Route`] to run.

mod app;
mod bounded;
mod config;
mod context;
mod error;
mod session;
mod state;
mod user;

pub mod decode;
pub mod http;
pub mod pipeline;

pub use app::App;
pub use bounded::{async_trait, BoxError, BoxStream};
pub use config::Config;
pub use context::Context;
pub use error::{IntoRejection, Reject, Rejection, ServerError};
pub use pipeline::{Reply, Route, RouteMeta, Stage};
pub use session::{Session, SessionManager, SessionUnavailable};
pub use state::{State, Variables};
pub use user::{UserFetcher, UserFetchers};
