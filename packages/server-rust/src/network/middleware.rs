//! HTTP middleware stack for a service instance.
//!
//! Builds the Tower middleware pipeline applied to all HTTP requests.
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gantry_core::{RequestContext, REQUEST_ID_HEADER};
use tower::layer::util::{Identity, Stack};
use tower::{Layer, Service, ServiceBuilder};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Instrument, Span};

use super::config::NetworkConfig;
use super::shutdown::ShutdownController;
use crate::logging::LogBackend;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        TimeoutLayer,
        Stack<
            RequestBodyLimitLayer,
            Stack<
                TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan>,
                Stack<SetRequestIdLayer<MakeHexRequestId>, Stack<LogScopeLayer, Identity>>,
            >,
        >,
    >,
>;

/// Builds the HTTP-level Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `LogScope` -- runs the request inside the instance's log dispatcher
/// 2. `SetRequestId` -- assigns a hex `X-Request-Id` when the client sent none
/// 3. `Tracing` -- request/response trace spans
/// 4. `RequestBodyLimit` -- 413 for oversized bodies
/// 5. `Timeout` -- 408 once the request timeout elapses
///
/// `Timeout` sits inside the body limit because it builds its 408 from the
/// inner response body's `Default`, which the limit's body wrapper lacks.
/// 6. `PropagateRequestId` -- copies `X-Request-Id` from the request to the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, dispatch: Dispatch) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(LogScopeLayer::new(dispatch))
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeHexRequestId))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Generates request ids from the OS random source, hex-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeHexRequestId;

impl MakeRequestId for MakeHexRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = gantry_core::RequestId::generate();
        HeaderValue::from_str(id.as_str()).ok().map(RequestId::new)
    }
}

/// Trace span for each request, tagged with method, path and request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::debug_span!(
            "http",
            method = %request.method(),
            path = %request.uri().path(),
            request_id,
        )
    }
}

/// Layer that runs every request, including its synchronous `call`, inside
/// a fixed `tracing` dispatcher.
#[derive(Clone)]
pub struct LogScopeLayer {
    dispatch: Dispatch,
}

impl LogScopeLayer {
    #[must_use]
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }
}

impl<S> Layer<S> for LogScopeLayer {
    type Service = LogScope<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogScope {
            inner,
            dispatch: self.dispatch.clone(),
        }
    }
}

/// Service wrapper produced by [`LogScopeLayer`].
#[derive(Clone)]
pub struct LogScope<S> {
    inner: S,
    dispatch: Dispatch,
}

impl<S, R> Service<R> for LogScope<S>
where
    S: Service<R>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = WithDispatch<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let future = tracing::dispatcher::with_default(&self.dispatch, || self.inner.call(request));
        future.with_subscriber(self.dispatch.clone())
    }
}

/// State for [`request_scope`].
#[derive(Clone)]
pub struct RequestScope {
    pub logging: Arc<LogBackend>,
    pub shutdown: Arc<ShutdownController>,
    pub max_header_bytes: usize,
}

/// Per-request middleware: enforces the header limit, tracks the request as
/// in flight, and hands the handler its [`RequestContext`] and
/// [`RequestLogger`](crate::logging::RequestLogger) as extensions.
pub async fn request_scope(
    State(scope): State<RequestScope>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if header_bytes(&request) > scope.max_header_bytes {
        return (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "request header fields too large",
        )
            .into_response();
    }

    let _in_flight = scope.shutdown.in_flight_guard();

    let inbound = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let ctx = RequestContext::from_inbound(scope.logging.service(), inbound);
    let replaced = inbound != Some(ctx.request_id.as_str());

    let logger = scope.logging.logger_for(&ctx);
    let span = logger.span().clone();
    request.extensions_mut().insert(ctx.clone());
    request.extensions_mut().insert(logger);

    let mut response = next.run(request).instrument(span).await;

    // The inbound header was empty or not valid UTF-8; echo the id we used.
    if replaced {
        if let Ok(value) = HeaderValue::from_str(ctx.request_id.as_str()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
    }
    response
}

fn header_bytes(request: &Request<Body>) -> usize {
    request
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::{get, post};
    use axum::Router;
    use bytes::Bytes;
    use tower::ServiceExt;

    use super::*;

    fn layered(router: Router, config: &NetworkConfig) -> Router {
        router.layer(build_http_layers(config, Dispatch::none()))
    }

    #[tokio::test]
    async fn slow_handler_gets_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(50),
            ..NetworkConfig::default()
        };
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

        let response = layered(router, &config)
            .oneshot(
                axum::http::Request::builder()
                    .uri("/slow")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn oversized_body_gets_413() {
        let config = NetworkConfig {
            max_body_bytes: 16,
            ..NetworkConfig::default()
        };
        let router = Router::new().route(
            "/echo",
            post(|body: Bytes| async move { body.len().to_string() }),
        );

        let response = layered(router, &config)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("x".repeat(64)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn build_http_layers_does_not_panic_with_defaults() {
        let config = NetworkConfig::default();
        let _layers = build_http_layers(&config, Dispatch::none());
    }

    #[test]
    fn build_http_layers_with_custom_timeout() {
        let config = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let _layers = build_http_layers(&config, Dispatch::none());
    }

    #[test]
    fn make_hex_request_id_produces_hex() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let id = MakeHexRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert_eq!(value.len(), 16);
        assert!(hex::decode(value).is_ok());
    }

    #[test]
    fn header_bytes_counts_names_and_values() {
        let request = axum::http::Request::builder()
            .header("x-a", "12345")
            .body(Body::empty())
            .unwrap();
        assert_eq!(header_bytes(&request), 3 + 5 + 4);
    }
}
