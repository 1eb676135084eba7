//! The interceptor pipeline that turns a [`Context`] into a response.
//!
//! A request runs through the `before` interceptors in registration
//! order, then the route [`Handler`], then the `after` interceptors in
//! reverse order. A rejection raised at any point skips the remaining
//! steps and is offered to the exception handlers, the first of which
//! to [claim](Catch::claims) it produces the final response.

mod func;
mod reply;

pub use func::{catch, catch_if, handler_fn, intercept_fn, CatchFn, HandlerFn, InterceptFn};
pub use reply::{Reply, Route, RouteMeta};

use crate::bounded::async_trait;
use crate::error::Rejection;
use crate::Context;

use std::fmt;

/// Code that runs before or after a route handler.
///
/// Interceptors communicate with each other and the handler through
/// the context's [variables](Context::variables_mut). They can write
/// the response directly with [`Context::set_response`].
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn call(&self, cx: &mut Context) -> Result<(), Rejection>;
}

/// The terminal step of a route.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, cx: &mut Context) -> Result<Reply, Rejection>;
}

/// An exception handler.
#[async_trait]
pub trait Catch: Send + Sync + 'static {
    /// Returns `true` if this handler is responsible for `err`.
    fn claims(&self, err: &Rejection) -> bool;

    /// Produce the response for a claimed rejection.
    ///
    /// Any response written before the failure is discarded first, so
    /// an empty reply ends with the configured no-content response.
    async fn handle(&self, err: Rejection, cx: &mut Context) -> Result<Reply, Rejection>;
}

/// The position of a context within the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Running the `before` interceptor at this index.
    Before(usize),
    Handling,
    /// Running the `after` interceptor at this index.
    After(usize),
    Done,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Before(0)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Before(i) => write!(f, "before[{}]", i),
            Stage::Handling => f.write_str("handling"),
            Stage::After(i) => write!(f, "after[{}]", i),
            Stage::Done => f.write_str("done"),
        }
    }
}

/// The interceptors and exception handlers shared by every request.
#[derive(Default)]
pub struct Pipeline {
    pub(crate) before: Vec<Box<dyn Interceptor>>,
    pub(crate) after: Vec<Box<dyn Interceptor>>,
    pub(crate) catch: Vec<Box<dyn Catch>>,
}

impl Pipeline {
    pub fn before(&self) -> &[Box<dyn Interceptor>] {
        &self.before
    }

    pub fn after(&self) -> &[Box<dyn Interceptor>] {
        &self.after
    }

    pub fn exception_handlers(&self) -> &[Box<dyn Catch>] {
        &self.catch
    }

    /// Run the interceptors and `route` against `cx`.
    ///
    /// On success the stage is left at the last step that ran.
    pub(crate) async fn execute(&self, cx: &mut Context, route: &Route) -> Result<(), Rejection> {
        for (i, interceptor) in self.before.iter().enumerate() {
            cx.enter(Stage::Before(i));
            interceptor.call(cx).await?;
        }

        cx.enter(Stage::Handling);
        let reply = route.handler.call(cx).await?;

        if let Some(response) = reply.into_response(&route.meta) {
            cx.set_response(response);
        }

        for (i, interceptor) in self.after.iter().enumerate().rev() {
            cx.enter(Stage::After(i));
            interceptor.call(cx).await?;
        }

        Ok(())
    }

    /// Route `err` to the first exception handler that claims it.
    ///
    /// Unclaimed rejections are returned.
    pub(crate) async fn recover(&self, err: Rejection, cx: &mut Context) -> Result<(), Rejection> {
        let handler = match self.catch.iter().find(|handler| handler.claims(&err)) {
            Some(handler) => handler,
            None => {
                tracing::warn!(stage = %cx.stage(), error = %err, "unclaimed rejection");
                return Err(err);
            }
        };

        tracing::debug!(stage = %cx.stage(), error = %err, "rejection claimed by exception handler");

        cx.take_response();
        let reply = handler.handle(err, cx).await?;
        if let Some(response) = reply.into_response(&RouteMeta::default()) {
            cx.set_response(response);
        }

        Ok(())
    }
}
