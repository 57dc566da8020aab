use std::convert::Infallible;

use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use lore_domain::{MetadataFilter, RetrievalMatch};
use lore_service::{ChatEvent, ChatResponse, Error, FeedbackRequest};

use crate::state::AppState;

const GENERIC_FAILURE: &str = "The request could not be completed. Please try again later.";
const TIMEOUT_FAILURE: &str = "The answer took too long to generate. Please try again later.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	#[serde(default)]
	pub query: String,
	#[serde(default)]
	pub top_k: Option<usize>,
	#[serde(default)]
	pub user_id: Option<String>,
	#[serde(default)]
	pub filter: Option<FilterPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPayload {
	#[serde(default)]
	pub department: Option<String>,
	#[serde(default)]
	pub doc_type: Option<String>,
	#[serde(default)]
	pub policy_year: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
}
impl From<FilterPayload> for MetadataFilter {
	fn from(payload: FilterPayload) -> Self {
		Self {
			department: payload.department,
			doc_type: payload.doc_type,
			policy_year: payload.policy_year,
			tags: payload.tags,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub matches: Vec<RetrievalMatch>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
	pub feedback_id: i64,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat", post(chat))
		.route("/v1/chat/stream", post(chat_stream))
		.route("/v1/search", post(search))
		.route("/v1/feedback", post(feedback))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn chat(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
	let response = state.service.chat(payload.user_id.as_deref(), &payload.message).await?;

	Ok(Json(response))
}

async fn chat_stream(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
	let events =
		state.service.chat_stream(payload.user_id.as_deref(), &payload.message).await?;

	Ok(Sse::new(events.map(|event| Ok(sse_event(event)))).keep_alive(KeepAlive::default()))
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let matches = state
		.service
		.search(
			&payload.query,
			payload.top_k,
			payload.user_id.as_deref(),
			payload.filter.map(MetadataFilter::from),
		)
		.await?;

	Ok(Json(SearchResponse { matches }))
}

async fn feedback(
	State(state): State<AppState>,
	Json(payload): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
	let feedback_id = state.service.feedback.record_feedback(payload).await?;

	Ok(Json(FeedbackResponse { feedback_id }))
}

fn sse_event(event: ChatEvent) -> Event {
	match event {
		// SSE cannot carry carriage returns.
		ChatEvent::Chunk(text) => Event::default().event("chunk").data(text.replace('\r', "")),
		ChatEvent::Sources(sources) => {
			let data = serde_json::to_string(&sources).unwrap_or_else(|err| {
				tracing::error!(error = %err, "Failed to encode answer sources.");

				"[]".to_string()
			});

			Event::default().event("sources").data(data)
		},
		ChatEvent::MessageId(message_id) => {
			Event::default().event("messageId").data(message_id.to_string())
		},
		ChatEvent::Error(message) => {
			Event::default().event("error").data(message.replace('\r', ""))
		},
		ChatEvent::Done => Event::default().event("done").data(""),
	}
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

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				Self::new(StatusCode::BAD_REQUEST, "invalid_request", message),
			Error::NotFound { message } => Self::new(StatusCode::NOT_FOUND, "not_found", message),
			Error::Timeout { message } => {
				tracing::error!(error = %message, "Request timed out.");

				Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", TIMEOUT_FAILURE)
			},
			err => {
				tracing::error!(error = %err, "Request failed.");

				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", GENERIC_FAILURE)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
