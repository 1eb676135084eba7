use crate::bounded::async_trait;
use crate::error::{IntoRejection, Reject, Rejection};
use crate::pipeline::{Catch, Handler, Interceptor, Reply};
use crate::Context;

use std::future::Future;
use std::marker::PhantomData;

/// Create an [`Interceptor`] from a closure-like block.
///
/// ```
/// let interceptor = corral::intercept_fn!(async |cx| {
///     let path = cx.path().to_owned();
///     cx.variables_mut().add(path);
///     Ok(())
/// });
/// # let _ = corral::App::new().before(interceptor);
/// ```
#[macro_export]
macro_rules! intercept_fn {
    (async |$cx:ident| $body:expr) => {{
        async fn intercept(
            $cx: &mut $crate::Context,
        ) -> ::std::result::Result<(), $crate::Rejection> {
            $body
        }

        $crate::pipeline::intercept_fn(intercept)
    }};
}

/// Create a [`Handler`] from a closure-like block.
///
/// The block evaluates to a `Result` of anything convertible
/// into a [`Reply`].
#[macro_export]
macro_rules! handler_fn {
    (async |$cx:ident| $body:expr) => {{
        async fn handle(
            $cx: &mut $crate::Context,
        ) -> ::std::result::Result<$crate::Reply, $crate::Rejection> {
            let reply = $body;
            reply.map(::std::convert::Into::into)
        }

        $crate::pipeline::handler_fn(handle)
    }};
}

pub trait InterceptFn<'a>: Send + Sync + 'static {
    type Error: IntoRejection;
    type Future: Future<Output = Result<(), Self::Error>> + Send + 'a;

    fn call(&self, cx: &'a mut Context) -> Self::Future;
}

impl<'a, F, O, E> InterceptFn<'a> for F
where
    F: Fn(&'a mut Context) -> O + Send + Sync + 'static,
    O: Future<Output = Result<(), E>> + Send + 'a,
    E: IntoRejection,
{
    type Error = E;
    type Future = O;

    fn call(&self, cx: &'a mut Context) -> Self::Future {
        self(cx)
    }
}

/// Create an [`Interceptor`] from an async function.
///
/// ```
/// use corral::{Context, Rejection};
///
/// async fn count(cx: &mut Context) -> Result<(), Rejection> {
///     cx.variables_mut().add(1_u32);
///     Ok(())
/// }
///
/// let app = corral::App::new().before(corral::pipeline::intercept_fn(count));
/// ```
pub fn intercept_fn<F, E>(f: F) -> impl Interceptor
where
    for<'a> F: InterceptFn<'a, Error = E>,
    E: IntoRejection + 'static,
{
    struct Impl<F, E>(F, PhantomData<fn() -> E>);

    #[async_trait]
    impl<F, E> Interceptor for Impl<F, E>
    where
        for<'a> F: InterceptFn<'a, Error = E>,
        E: IntoRejection + 'static,
    {
        async fn call(&self, cx: &mut Context) -> Result<(), Rejection> {
            self.0.call(cx).await.map_err(IntoRejection::into_rejection)
        }
    }

    Impl(f, PhantomData)
}

pub trait HandlerFn<'a>: Send + Sync + 'static {
    type Reply: Into<Reply>;
    type Error: IntoRejection;
    type Future: Future<Output = Result<Self::Reply, Self::Error>> + Send + 'a;

    fn call(&self, cx: &'a mut Context) -> Self::Future;
}

impl<'a, F, O, R, E> HandlerFn<'a> for F
where
    F: Fn(&'a mut Context) -> O + Send + Sync + 'static,
    O: Future<Output = Result<R, E>> + Send + 'a,
    R: Into<Reply>,
    E: IntoRejection,
{
    type Reply = R;
    type Error = E;
    type Future = O;

    fn call(&self, cx: &'a mut Context) -> Self::Future {
        self(cx)
    }
}

/// Create a [`Handler`] from an async function.
pub fn handler_fn<F, R, E>(f: F) -> impl Handler
where
    for<'a> F: HandlerFn<'a, Reply = R, Error = E>,
    R: Into<Reply> + 'static,
    E: IntoRejection + 'static,
{
    struct Impl<F, R, E>(F, PhantomData<fn() -> (R, E)>);

    #[async_trait]
    impl<F, R, E> Handler for Impl<F, R, E>
    where
        for<'a> F: HandlerFn<'a, Reply = R, Error = E>,
        R: Into<Reply> + 'static,
        E: IntoRejection + 'static,
    {
        async fn call(&self, cx: &mut Context) -> Result<Reply, Rejection> {
            match self.0.call(cx).await {
                Ok(reply) => Ok(reply.into()),
                Err(err) => Err(err.into_rejection()),
            }
        }
    }

    Impl(f, PhantomData)
}

pub trait CatchFn<'a, T>: Send + Sync + 'static {
    type Reply: Into<Reply>;
    type Error: IntoRejection;
    type Future: Future<Output = Result<Self::Reply, Self::Error>> + Send + 'a;

    fn call(&self, err: T, cx: &'a mut Context) -> Self::Future;
}

impl<'a, F, T, O, R, E> CatchFn<'a, T> for F
where
    F: Fn(T, &'a mut Context) -> O + Send + Sync + 'static,
    O: Future<Output = Result<R, E>> + Send + 'a,
    R: Into<Reply>,
    E: IntoRejection,
{
    type Reply = R;
    type Error = E;
    type Future = O;

    fn call(&self, err: T, cx: &'a mut Context) -> Self::Future {
        self(err, cx)
    }
}

/// Create an exception handler claiming rejections of type `T`.
///
/// ```
/// use corral::decode::DecodeError;
/// use corral::http::StatusCode;
/// use corral::{Context, Rejection};
///
/// async fn bad_body(err: DecodeError, _: &mut Context) -> Result<(StatusCode, String), Rejection> {
///     Ok((StatusCode::BAD_REQUEST, err.to_string()))
/// }
///
/// let app = corral::App::new().catch(corral::pipeline::catch::<DecodeError, _, _, _>(bad_body));
/// ```
pub fn catch<T, F, R, E>(f: F) -> impl Catch
where
    T: Reject,
    for<'a> F: CatchFn<'a, T, Reply = R, Error = E>,
    R: Into<Reply> + 'static,
    E: IntoRejection + 'static,
{
    struct Impl<T, F, R, E>(F, PhantomData<fn() -> (T, R, E)>);

    #[async_trait]
    impl<T, F, R, E> Catch for Impl<T, F, R, E>
    where
        T: Reject,
        for<'a> F: CatchFn<'a, T, Reply = R, Error = E>,
        R: Into<Reply> + 'static,
        E: IntoRejection + 'static,
    {
        fn claims(&self, err: &Rejection) -> bool {
            err.is::<T>()
        }

        async fn handle(&self, err: Rejection, cx: &mut Context) -> Result<Reply, Rejection> {
            let err = err.downcast::<T>()?;

            match self.0.call(err, cx).await {
                Ok(reply) => Ok(reply.into()),
                Err(err) => Err(err.into_rejection()),
            }
        }
    }

    Impl(f, PhantomData)
}

/// Create an exception handler claiming every rejection for which
/// `predicate` returns `true`.
pub fn catch_if<P, F, R, E>(predicate: P, f: F) -> impl Catch
where
    P: Fn(&Rejection) -> bool + Send + Sync + 'static,
    for<'a> F: CatchFn<'a, Rejection, Reply = R, Error = E>,
    R: Into<Reply> + 'static,
    E: IntoRejection + 'static,
{
    struct Impl<P, F, R, E>(P, F, PhantomData<fn() -> (R, E)>);

    #[async_trait]
    impl<P, F, R, E> Catch for Impl<P, F, R, E>
    where
        P: Fn(&Rejection) -> bool + Send + Sync + 'static,
        for<'a> F: CatchFn<'a, Rejection, Reply = R, Error = E>,
        R: Into<Reply> + 'static,
        E: IntoRejection + 'static,
    {
        fn claims(&self, err: &Rejection) -> bool {
            (self.0)(err)
        }

        async fn handle(&self, err: Rejection, cx: &mut Context) -> Result<Reply, Rejection> {
            match self.1.call(err, cx).await {
                Ok(reply) => Ok(reply.into()),
                Err(err) => Err(err.into_rejection()),
            }
        }
    }

    Impl(predicate, f, PhantomData)
}
