use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    dispatch::{Dispatcher, Publisher},
    error::DispatchError,
    events::EventService,
    models::{
        event::{UserOnPaymentError, UserOnRefund, UserOnRegistration, UserOnSubscription},
        health::HealthStatus,
        message::OutboundMessage,
        response::{ApiResponse, DispatchReport},
    },
};

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub publisher: Arc<dyn Publisher>,
    pub events: EventService,
    pub health_checker: HealthChecker,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/notification/message", post(post_message))
        .route(
            "/api/v1/notification/events/registration/on",
            post(on_registration),
        )
        .route(
            "/api/v1/notification/events/subscription/on",
            post(on_subscription),
        )
        .route("/api/v1/notification/events/refund/on", post(on_refund))
        .route(
            "/api/v1/notification/events/payment-error/on",
            post(on_payment_error),
        )
        .route("/api/v1/notification/{notification_id}", post(dispatch_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    server_port: u16,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Dispatch API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

impl DispatchError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            DispatchError::NotFound(_) => (StatusCode::BAD_REQUEST, "NOTIFICATION_NOT_FOUND"),
            DispatchError::UpstreamAuthFailure(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_AUTH_FAILURE"),
            DispatchError::UpstreamUnavailable(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
            DispatchError::MalformedRecipient(_) => (StatusCode::BAD_GATEWAY, "MALFORMED_RECIPIENT"),
            DispatchError::PublishFailure(_) => (StatusCode::BAD_GATEWAY, "PUBLISH_FAILURE"),
            DispatchError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(ApiResponse::failed(code, self.to_string()))).into_response()
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn dispatch_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<ApiResponse<DispatchReport>>, DispatchError> {
    let summary = state.dispatcher.dispatch(notification_id).await?;

    Ok(Json(ApiResponse::ok(DispatchReport {
        notification_id,
        summary,
    })))
}

async fn publish(
    state: &AppState,
    message: OutboundMessage,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    state.publisher.publish(&message).await?;
    Ok(Json(ApiResponse::ok(message)))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<OutboundMessage>,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    publish(&state, message).await
}

async fn on_registration(
    State(state): State<Arc<AppState>>,
    Json(user): Json<UserOnRegistration>,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    let message = state.events.on_registration(&user);
    publish(&state, message).await
}

async fn on_subscription(
    State(state): State<Arc<AppState>>,
    Json(user): Json<UserOnSubscription>,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    let message = state.events.on_subscription(&user);
    publish(&state, message).await
}

async fn on_refund(
    State(state): State<Arc<AppState>>,
    Json(user): Json<UserOnRefund>,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    let message = state.events.on_refund(&user);
    publish(&state, message).await
}

async fn on_payment_error(
    State(state): State<Arc<AppState>>,
    Json(user): Json<UserOnPaymentError>,
) -> Result<Json<ApiResponse<OutboundMessage>>, DispatchError> {
    let message = state.events.on_payment_error(&user);
    publish(&state, message).await
}
