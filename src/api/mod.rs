use crate::config::Config;
use crate::services::DispatchService;
use axum::body::Body;
use axum::http::Request;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod channel_types;
pub mod dto;
pub mod messages;
pub mod middleware;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub dispatch: DispatchService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

/// Configures and returns the dispatch API router.
pub fn app_router(config: Config, dispatch: DispatchService, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Router {
    let state = AppState { config, dispatch, shutdown_rx };

    let api_routes = Router::new()
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", get(messages::get_message))
        .route("/channel-types", get(channel_types::list_channel_types));

    Router::new()
        .nest("/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static(middleware::REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "message_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static(middleware::REQUEST_ID_HEADER),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state)
}
