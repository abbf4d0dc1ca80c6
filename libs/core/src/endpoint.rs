//! Uniform callable shape shared by every operation.
//!
//! An [`Endpoint`] turns a request into a response given a [`Context`].
//! A [`Middleware`] maps one endpoint to another, and [`chain`] composes an
//! ordered list of middleware where the first entry is the outermost layer.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;
use crate::error::{Error, Result};

type EndpointFn<Req, Res> = dyn Fn(Context, Req) -> BoxFuture<'static, Result<Res>> + Send + Sync;
type MiddlewareFn<Req, Res> = dyn Fn(Endpoint<Req, Res>) -> Endpoint<Req, Res> + Send + Sync;

pub struct Endpoint<Req, Res> {
    inner: Arc<EndpointFn<Req, Res>>,
}

impl<Req, Res> Clone for Endpoint<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Res> Endpoint<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Res>> + Send + 'static,
    {
        let inner: Arc<EndpointFn<Req, Res>> =
            Arc::new(move |ctx: Context, request: Req| -> BoxFuture<'static, Result<Res>> {
                Box::pin(f(ctx, request))
            });
        Self { inner }
    }

    pub fn call(&self, ctx: Context, request: Req) -> BoxFuture<'static, Result<Res>> {
        (self.inner)(ctx, request)
    }

    /// Wrap this endpoint in a middleware
    pub fn with(self, middleware: &Middleware<Req, Res>) -> Self {
        middleware.apply(self)
    }
}

pub struct Middleware<Req, Res> {
    wrap: Arc<MiddlewareFn<Req, Res>>,
}

impl<Req, Res> Clone for Middleware<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            wrap: Arc::clone(&self.wrap),
        }
    }
}

impl<Req, Res> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Endpoint<Req, Res>) -> Endpoint<Req, Res> + Send + Sync + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    pub fn apply(&self, next: Endpoint<Req, Res>) -> Endpoint<Req, Res> {
        (self.wrap)(next)
    }
}

/// Compose middleware so that `middlewares[0]` is invoked first
pub fn chain<Req, Res>(middlewares: Vec<Middleware<Req, Res>>) -> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    Middleware::new(move |next: Endpoint<Req, Res>| {
        middlewares
            .iter()
            .rev()
            .fold(next, |endpoint, middleware| middleware.apply(endpoint))
    })
}

/// Responses that carry a business error alongside their payload
pub trait Failer {
    fn failed(&self) -> Option<&Error>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder(label: &'static str, log: Arc<Mutex<Vec<String>>>) -> Middleware<i64, i64> {
        Middleware::new(move |next: Endpoint<i64, i64>| {
            let log = Arc::clone(&log);
            Endpoint::new(move |ctx: Context, request: i64| {
                let log = Arc::clone(&log);
                let next = next.clone();
                async move {
                    log.lock().unwrap().push(format!("{label} before"));
                    let response = next.call(ctx, request).await;
                    log.lock().unwrap().push(format!("{label} after"));
                    response
                }
            })
        })
    }

    #[tokio::test]
    async fn chain_runs_first_middleware_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_log = Arc::clone(&log);
        let endpoint = Endpoint::new(move |_ctx: Context, n: i64| {
            let log = Arc::clone(&inner_log);
            async move {
                log.lock().unwrap().push("endpoint".to_string());
                Ok::<_, Error>(n * 2)
            }
        });

        let stack = chain(vec![
            recorder("first", Arc::clone(&log)),
            recorder("second", Arc::clone(&log)),
            recorder("third", Arc::clone(&log)),
        ]);
        let response = endpoint.with(&stack).call(Context::background(), 21).await;

        assert_eq!(response.unwrap(), 42);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first before",
                "second before",
                "third before",
                "endpoint",
                "third after",
                "second after",
                "first after",
            ]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let endpoint = Endpoint::new(|_ctx: Context, n: i64| async move { Ok::<_, Error>(n + 1) });
        let wrapped = endpoint.with(&chain(Vec::new()));
        assert_eq!(wrapped.call(Context::background(), 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn endpoint_errors_pass_through_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let endpoint = Endpoint::new(|_ctx: Context, _n: i64| async move {
            Err::<i64, _>(Error::MissingAuthToken)
        })
        .with(&recorder("outer", Arc::clone(&log)));

        let err = endpoint.call(Context::background(), 0).await.unwrap_err();
        assert!(matches!(err, Error::MissingAuthToken));
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
