use crate::config::Config;
use crate::error::Rejection;
use crate::http::{Params, Request, Response};
use crate::pipeline::{Catch, Interceptor, Pipeline, Route};
use crate::session::SessionManager;
use crate::state::State;
use crate::user::{UserFetcher, UserFetchers};
use crate::Context;

use std::sync::Arc;

use tracing::Instrument;

/// Everything a request context shares with the other requests
/// of an application.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) pipeline: Pipeline,
    pub(crate) sessions: Option<Box<dyn SessionManager>>,
    pub(crate) users: UserFetchers,
    pub(crate) state: State,
    pub(crate) config: Config,
}

/// An application: the interceptors, exception handlers and
/// collaborators used to serve requests.
///
/// ```
/// use corral::{App, Context, Rejection, Route};
///
/// async fn hello(cx: &mut Context) -> Result<String, Rejection> {
///     Ok(format!("hello {}", cx.param("name").unwrap_or("world")))
/// }
///
/// let app = App::new().state(42_u32);
/// let route = Route::new(corral::pipeline::handler_fn(hello));
/// # let _ = (app, route);
/// ```
#[derive(Default)]
pub struct App {
    shared: Arc<Shared>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared_mut(&mut self) -> &mut Shared {
        Arc::get_mut(&mut self.shared).expect("cannot configure an app while it is serving requests")
    }

    pub fn config(mut self, config: Config) -> Self {
        self.shared_mut().config = config;
        self
    }

    /// Add an interceptor that runs before the handler.
    ///
    /// `before` interceptors run in the order they were added.
    pub fn before(mut self, interceptor: impl Interceptor) -> Self {
        self.shared_mut().pipeline.before.push(Box::new(interceptor));
        self
    }

    /// Add an interceptor that runs after the handler.
    ///
    /// `after` interceptors run in the reverse order they were added.
    pub fn after(mut self, interceptor: impl Interceptor) -> Self {
        self.shared_mut().pipeline.after.push(Box::new(interceptor));
        self
    }

    /// Add an exception handler.
    ///
    /// Handlers are offered a rejection in the order they were added.
    pub fn catch(mut self, handler: impl Catch) -> Self {
        self.shared_mut().pipeline.catch.push(Box::new(handler));
        self
    }

    pub fn sessions(mut self, manager: impl SessionManager) -> Self {
        self.shared_mut().sessions = Some(Box::new(manager));
        self
    }

    pub fn user_fetcher<U, F>(mut self, fetcher: F) -> Self
    where
        U: Send + 'static,
        F: UserFetcher<U>,
    {
        self.shared_mut().users.insert::<U, F>(fetcher);
        self
    }

    pub fn state<T>(mut self, state: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.shared_mut().state.insert(state);
        self
    }

    /// Create the context for a request.
    ///
    /// `params` are the route parameters extracted by the router.
    pub fn context(&self, request: Request, params: Params) -> Context {
        Context::new(request, params, self.shared.clone())
    }

    /// Run a request through the pipeline for `route`.
    pub async fn serve(&self, request: Request, params: Params, route: &Route) -> Result<Response, Rejection> {
        let span = tracing::debug_span!("request", method = %request.method(), path = %request.uri().path());

        async move {
            let mut cx = self.context(request, params);
            cx.run(route).await
        }
        .instrument(span)
        .await
    }

    /// Like [`serve`](Self::serve), turning an unclaimed rejection
    /// into its own response.
    pub async fn respond(&self, request: Request, params: Params, route: &Route) -> Response {
        self.serve(request, params, route)
            .await
            .unwrap_or_else(Rejection::reject)
    }
}
