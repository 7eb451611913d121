use axum::{
	Json, Router,
	extract::{Path, Request, State, rejection::JsonRejection},
	http::{StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use crate::state::AppState;
use curio_service::{
	Error as ServiceError, FeedbackRequest, FeedbackResponse, IngestReport, IngestRequest,
	RecommendRequest, RecommendResponse, Template,
};

pub fn router(state: AppState) -> Router {
	let v1 = Router::new()
		.route("/v1/recommend", post(recommend))
		.route("/v1/feedback", post(feedback))
		.route("/v1/templates/{template_id}", get(get_template))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_token));

	Router::new().route("/health", get(health)).merge(v1).with_state(state)
}

/// Served on the loopback-only admin listener.
pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/templates", post(ingest_templates))
		.route("/v1/admin/cache/sweep", post(sweep_cache))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn recommend(
	State(state): State<AppState>,
	payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.recommend(payload).await?;

	Ok(Json(response))
}

async fn feedback(
	State(state): State<AppState>,
	payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, ApiError> {
	let Json(payload) = payload?;
	let response = state.service.record_feedback(payload).await?;

	Ok(Json(response))
}

async fn get_template(
	State(state): State<AppState>,
	Path(template_id): Path<String>,
) -> Result<Json<Template>, ApiError> {
	let template = state.service.get_template(&template_id).await?;

	Ok(Json(template))
}

async fn ingest_templates(
	State(state): State<AppState>,
	payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestReport>, ApiError> {
	let Json(payload) = payload?;
	let report = state.service.ingest_templates(payload).await?;

	Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct SweepReport {
	removed_count: usize,
}

async fn sweep_cache(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
	let removed_count = state.service.sweep_cache().await?;

	Ok(Json(SweepReport { removed_count }))
}

/// Rejects `/v1` calls without the configured bearer token. A no-op when no token is set.
async fn require_token(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Result<Response, ApiError> {
	let Some(expected) = state.auth_token.as_deref() else {
		return Ok(next.run(request).await);
	};
	let presented = request
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "));

	if presented != Some(expected) {
		return Err(ApiError::new(
			StatusCode::UNAUTHORIZED,
			"unauthorized",
			"A valid bearer token is required.",
		));
	}

	Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
			ServiceError::IntentResolution { .. } => {
				(StatusCode::UNPROCESSABLE_ENTITY, "intent_unresolved")
			},
			ServiceError::RetrievalUnavailable { .. } => {
				(StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable")
			},
			ServiceError::Timeout { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "timeout"),
			ServiceError::Provider { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "provider_error"),
			ServiceError::Storage { .. } | ServiceError::Qdrant { .. } => {
				(StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
			},
		};

		if status.is_server_error() {
			tracing::error!(error = %err, error_code = code, "Request failed.");
		}

		Self::new(status, code, err.to_string())
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
