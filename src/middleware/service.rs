//! Admission middleware service.

use futures::future::{self, Either, MapErr, Ready, TryFutureExt};
use http::header::USER_AGENT;
use http::{Request, StatusCode};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower_service::Service;
use tracing::info;

use crate::ratelimit::{AdmissionController, Rejection, Verdict};

/// Error returned by [`AdmissionService`].
#[derive(Error, Debug)]
pub enum AdmissionError<E> {
    /// The controller refused the request; the inner service was not called
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The inner service failed
    #[error("inner service error: {0}")]
    Inner(#[source] E),
}

impl<E> AdmissionError<E> {
    /// The rejection, if the request was refused.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AdmissionError::Rejected(rejection) => Some(rejection),
            AdmissionError::Inner(_) => None,
        }
    }

    /// Status the HTTP layer should answer with, for rejections only.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.rejection().map(Rejection::status_code)
    }
}

type WrapInner<E> = fn(E) -> AdmissionError<E>;

/// Future returned by [`AdmissionService`].
pub type AdmissionFuture<F, T, E> =
    Either<Ready<Result<T, AdmissionError<E>>>, MapErr<F, WrapInner<E>>>;

/// Middleware that evaluates every request before handing it on.
///
/// The route is the URI path and the client identifier is the `User-Agent`
/// header, decoded lossily (empty when absent).
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    controller: Arc<AdmissionController>,
}

impl<S> AdmissionService<S> {
    /// Wrap `inner` with the given controller.
    pub fn new(inner: S, controller: Arc<AdmissionController>) -> Self {
        Self { inner, controller }
    }

    /// The wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, B> Service<Request<B>> for AdmissionService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = AdmissionFuture<S::Future, S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let identifier = req
            .headers()
            .get(USER_AGENT)
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .unwrap_or_default();

        let verdict = self
            .controller
            .evaluate(req.method().as_str(), req.uri().path(), &identifier);

        match verdict {
            Verdict::Admit => {
                let wrap: WrapInner<S::Error> = AdmissionError::Inner;
                Either::Right(self.inner.call(req).map_err(wrap))
            }
            Verdict::Reject(rejection) => {
                info!(
                    method = %rejection.method,
                    route = %rejection.route,
                    kind = ?rejection.kind,
                    "Request refused"
                );
                Either::Left(future::ready(Err(AdmissionError::Rejected(rejection))))
            }
        }
    }
}
