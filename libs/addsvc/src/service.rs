//! Domain service interface and its implementations.

use std::sync::Arc;
use std::time::Instant;

use addsvc_core::{Context, Error, Result};
use tracing::info;

/// Version reported in response envelopes
pub const API_VERSION: &str = "v1";

#[async_trait::async_trait]
pub trait AddService: Send + Sync {
    /// Sum two integers
    async fn sum(&self, ctx: &Context, a: i64, b: i64) -> Result<i64>;

    /// Concatenate two strings
    async fn concat(&self, ctx: &Context, a: &str, b: &str) -> Result<String>;
}

#[async_trait::async_trait]
impl<S: AddService + ?Sized> AddService for Arc<S> {
    async fn sum(&self, ctx: &Context, a: i64, b: i64) -> Result<i64> {
        (**self).sum(ctx, a, b).await
    }

    async fn concat(&self, ctx: &Context, a: &str, b: &str) -> Result<String> {
        (**self).concat(ctx, a, b).await
    }
}

/// Plain business logic, no transport or auth concerns
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicService;

impl BasicService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl AddService for BasicService {
    async fn sum(&self, _ctx: &Context, a: i64, b: i64) -> Result<i64> {
        a.checked_add(b)
            .ok_or_else(|| Error::domain("integer overflow"))
    }

    async fn concat(&self, _ctx: &Context, a: &str, b: &str) -> Result<String> {
        let mut res = String::with_capacity(a.len() + b.len());
        res.push_str(a);
        res.push_str(b);
        Ok(res)
    }
}

/// Logs every call with its arguments, outcome and duration
#[derive(Debug, Clone)]
pub struct LoggingMiddleware<S> {
    next: S,
}

impl<S: AddService> LoggingMiddleware<S> {
    pub fn new(next: S) -> Self {
        Self { next }
    }
}

#[async_trait::async_trait]
impl<S: AddService> AddService for LoggingMiddleware<S> {
    async fn sum(&self, ctx: &Context, a: i64, b: i64) -> Result<i64> {
        let started = Instant::now();
        let result = self.next.sum(ctx, a, b).await;
        let took_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(res) => info!(method = "sum", a, b, res, took_us, "call completed"),
            Err(err) => info!(method = "sum", a, b, error = %err, took_us, "call failed"),
        }
        result
    }

    async fn concat(&self, ctx: &Context, a: &str, b: &str) -> Result<String> {
        let started = Instant::now();
        let result = self.next.concat(ctx, a, b).await;
        let took_us = started.elapsed().as_micros() as u64;
        match &result {
            Ok(res) => info!(method = "concat", a, b, res = %res, took_us, "call completed"),
            Err(err) => info!(method = "concat", a, b, error = %err, took_us, "call failed"),
        }
        result
    }
}

/// Rejects calls whose context carries no bearer token.
///
/// Only checks presence; validating the token is left to whatever sits
/// in front of the service.
#[derive(Debug, Clone)]
pub struct AuthRequired<S> {
    next: S,
}

impl<S: AddService> AuthRequired<S> {
    pub fn new(next: S) -> Self {
        Self { next }
    }

    fn check(ctx: &Context, method: &str) -> Result<()> {
        match ctx.token() {
            Some(_) => Ok(()),
            None => Err(Error::MissingAuthToken.wrap(format!("{method} requires authentication"))),
        }
    }
}

#[async_trait::async_trait]
impl<S: AddService> AddService for AuthRequired<S> {
    async fn sum(&self, ctx: &Context, a: i64, b: i64) -> Result<i64> {
        Self::check(ctx, "sum")?;
        self.next.sum(ctx, a, b).await
    }

    async fn concat(&self, ctx: &Context, a: &str, b: &str) -> Result<String> {
        Self::check(ctx, "concat")?;
        self.next.concat(ctx, a, b).await
    }
}

#[cfg(test)]
mod tests {
    use addsvc_core::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn basic_service_adds_and_concatenates() {
        let svc = BasicService::new();
        let ctx = Context::background();

        assert_eq!(svc.sum(&ctx, 2, 3).await.unwrap(), 5);
        assert_eq!(svc.sum(&ctx, -7, 7).await.unwrap(), 0);
        assert_eq!(svc.concat(&ctx, "foo", "bar").await.unwrap(), "foobar");
        assert_eq!(svc.concat(&ctx, "", "").await.unwrap(), "");
    }

    #[tokio::test]
    async fn sum_overflow_is_a_domain_error() {
        let err = BasicService.sum(&Context::background(), i64::MAX, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert_eq!(err.to_string(), "integer overflow");
    }

    #[tokio::test]
    async fn auth_required_rejects_missing_token() {
        let svc = AuthRequired::new(BasicService);

        let err = svc.sum(&Context::background(), 1, 2).await.unwrap_err();
        assert!(err.contains(ErrorKind::MissingAuthToken));

        let ctx = Context::background().with_token("t0k3n");
        assert_eq!(svc.concat(&ctx, "a", "b").await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn decorators_compose_through_arc() {
        let svc: Arc<dyn AddService> = Arc::new(LoggingMiddleware::new(AuthRequired::new(BasicService)));
        let ctx = Context::background().with_token("t0k3n");
        assert_eq!(svc.sum(&ctx, 40, 2).await.unwrap(), 42);
    }
}
