use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRecord {
	pub document_id: String,
	pub source_name: Option<String>,
	pub owner_id: Option<String>,
	pub visibility: String,
	pub doc_type: Option<String>,
	pub department: Option<String>,
	pub policy_year: Option<String>,
	pub tags: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRecord {
	pub message_id: i64,
	pub session_id: String,
	pub user_id: String,
	pub role: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct MessageSource {
	pub document_id: String,
	pub chunk_index: i32,
	pub relevance_score: f64,
	pub source_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentFeedback {
	pub document_id: String,
	pub avg_score: f64,
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
	pub item_id: Option<String>,
	pub question: String,
	pub expected_answer: Option<String>,
	pub actual_answer: Option<String>,
	pub hit: bool,
	pub similarity: Option<f64>,
}
