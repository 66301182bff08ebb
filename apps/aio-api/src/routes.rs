use axum::{
	Json, Router,
	body::Bytes,
	extract::{DefaultBodyLimit, Path, Query, Request, State, rejection::QueryRejection},
	http::{HeaderMap, HeaderValue, Method, StatusCode, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;
use aio_service::{
	AnswerRequest, Error as ServiceError, PresignedUpload,
	corpus::CorpusRegistration,
	documents::DocumentSummary,
	signing::{SignedMethod, SignedQuery},
};

const MAX_OBJECT_BYTES: usize = 512 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/presign", get(presign))
		.route("/v1/conversations/{conversationid}", post(answer))
		.route("/v1/documents", get(documents))
		.route("/v1/corpus", post(corpus))
		.route(
			"/objects/{*key}",
			get(get_object).put(put_object).layer(DefaultBodyLimit::max(MAX_OBJECT_BYTES)),
		)
		.layer(middleware::from_fn(cors))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct PresignQuery {
	file_name: Option<String>,
	files: Option<String>,
}

#[derive(Debug, Serialize)]
struct PresignResponse {
	presignedurl: String,
}

async fn presign(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<PresignQuery>,
) -> Result<Response, ApiError> {
	if let Some(files) = query.files.as_deref() {
		let uploads: Vec<PresignedUpload> = state.service.presign_bulk_uploads(files).await?;

		return Ok(Json(uploads).into_response());
	}

	let user_id = user_id(&state, &headers)?;
	let file_name = query.file_name.ok_or_else(|| {
		json_error(StatusCode::BAD_REQUEST, "invalid_request", "Either file_name or files is required.")
	})?;
	let upload = state.service.presign_user_upload(&user_id, &file_name).await?;

	Ok(Json(PresignResponse { presignedurl: upload.presignedurl }).into_response())
}

async fn answer(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(conversationid): Path<Uuid>,
	Json(payload): Json<AnswerRequest>,
) -> Result<Json<String>, ApiError> {
	let user_id = user_id(&state, &headers)?;
	let response = state.service.answer(&user_id, conversationid, &payload).await?;

	Ok(Json(response.answer))
}

async fn documents(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
	let user_id = user_id(&state, &headers)?;

	Ok(Json(state.service.list_documents(&user_id).await?))
}

async fn corpus(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<CorpusRegistration>, ApiError> {
	let user_id = user_id(&state, &headers)?;

	Ok(Json(state.service.register_corpus(&user_id).await?))
}

async fn put_object(
	State(state): State<AppState>,
	Path(key): Path<String>,
	query: Result<Query<SignedQuery>, QueryRejection>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<StatusCode, ApiError> {
	let query = signed_query(query)?;

	state.service.signer.verify(SignedMethod::Put, &key, &query, unix_now())?;

	let content_type = headers
		.get(header::CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default()
		.trim();

	if content_type != query.content_type {
		return Err(json_error(
			StatusCode::FORBIDDEN,
			"forbidden",
			"Content-Type does not match the signed URL.",
		));
	}

	let size = body.len();

	state.service.stores.objects.put(&key, body.to_vec()).await.map_err(ServiceError::from)?;

	tracing::info!(key = %key, size, "Stored object.");

	Ok(StatusCode::OK)
}

async fn get_object(
	State(state): State<AppState>,
	Path(key): Path<String>,
	query: Result<Query<SignedQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
	let query = signed_query(query)?;

	state.service.signer.verify(SignedMethod::Get, &key, &query, unix_now())?;

	let bytes = state.service.stores.objects.get(&key).await.map_err(ServiceError::from)?;

	Ok(([(header::CONTENT_TYPE, query.content_type)], bytes).into_response())
}

fn signed_query(query: Result<Query<SignedQuery>, QueryRejection>) -> Result<SignedQuery, ApiError> {
	query.map(|Query(query)| query).map_err(|err| {
		json_error(StatusCode::FORBIDDEN, "forbidden", format!("Missing URL signature: {err}."))
	})
}

fn user_id(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
	let name = state.service.cfg.service.user_header.as_str();

	headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(str::to_string)
		.ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", format!("Missing {name} header.")))
}

fn unix_now() -> i64 {
	OffsetDateTime::now_utc().unix_timestamp()
}

async fn cors(request: Request, next: Next) -> Response {
	let mut response = if request.method() == Method::OPTIONS {
		StatusCode::NO_CONTENT.into_response()
	} else {
		next.run(request).await
	};
	let headers = response.headers_mut();

	for name in [
		header::ACCESS_CONTROL_ALLOW_HEADERS,
		header::ACCESS_CONTROL_ALLOW_ORIGIN,
		header::ACCESS_CONTROL_ALLOW_METHODS,
	] {
		headers.insert(name, HeaderValue::from_static("*"));
	}

	response
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
			ServiceError::UnsupportedFileType { .. } =>
				(StatusCode::BAD_REQUEST, "unsupported_file_type"),
			ServiceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
			ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
			ServiceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
			ServiceError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
			ServiceError::Index { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "index_error"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed.");
		}

		json_error(status, code, err.to_string())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError::new(status, code, message)
}
