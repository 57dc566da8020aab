use sqlx::PgExecutor;

use crate::{
	Result,
	models::{DocumentFeedback, DocumentRecord, EvaluationResult, MessageRecord, MessageSource},
};

pub async fn fetch_documents<'e>(
	executor: impl PgExecutor<'e>,
	document_ids: &[String],
) -> Result<Vec<DocumentRecord>> {
	if document_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, DocumentRecord>(
		"\
SELECT
	document_id,
	source_name,
	owner_id,
	visibility,
	doc_type,
	department,
	policy_year,
	tags
FROM documents
WHERE document_id = ANY($1)",
	)
	.bind(document_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn document_ids_by_owner<'e>(
	executor: impl PgExecutor<'e>,
	owner_id: &str,
) -> Result<Vec<String>> {
	let ids = sqlx::query_scalar::<_, String>(
		"\
SELECT document_id
FROM documents
WHERE owner_id = $1",
	)
	.bind(owner_id)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

pub async fn document_ids_by_visibility<'e>(
	executor: impl PgExecutor<'e>,
	visibility: &str,
) -> Result<Vec<String>> {
	let ids = sqlx::query_scalar::<_, String>(
		"\
SELECT document_id
FROM documents
WHERE visibility = $1",
	)
	.bind(visibility)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

pub async fn latest_session_for_user<'e>(
	executor: impl PgExecutor<'e>,
	user_id: &str,
) -> Result<Option<String>> {
	let session_id = sqlx::query_scalar::<_, String>(
		"\
SELECT session_id
FROM conversation_messages
WHERE user_id = $1
ORDER BY created_at DESC, message_id DESC
LIMIT 1",
	)
	.bind(user_id)
	.fetch_optional(executor)
	.await?;

	Ok(session_id)
}

/// Returns the newest `limit` messages of a session in chronological order.
pub async fn recent_messages<'e>(
	executor: impl PgExecutor<'e>,
	session_id: &str,
	limit: i64,
) -> Result<Vec<MessageRecord>> {
	let rows = sqlx::query_as::<_, MessageRecord>(
		"\
SELECT
	message_id,
	session_id,
	user_id,
	role,
	content,
	created_at
FROM (
	SELECT message_id, session_id, user_id, role, content, created_at
	FROM conversation_messages
	WHERE session_id = $1
	ORDER BY created_at DESC, message_id DESC
	LIMIT $2
) recent
ORDER BY created_at ASC, message_id ASC",
	)
	.bind(session_id)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn insert_message<'e>(
	executor: impl PgExecutor<'e>,
	session_id: &str,
	user_id: &str,
	role: &str,
	content: &str,
) -> Result<i64> {
	let message_id = sqlx::query_scalar::<_, i64>(
		"\
INSERT INTO conversation_messages (session_id, user_id, role, content)
VALUES ($1, $2, $3, $4)
RETURNING message_id",
	)
	.bind(session_id)
	.bind(user_id)
	.bind(role)
	.bind(content)
	.fetch_one(executor)
	.await?;

	Ok(message_id)
}

pub async fn insert_message_sources<'e>(
	executor: impl PgExecutor<'e>,
	message_id: i64,
	sources: &[MessageSource],
) -> Result<()> {
	if sources.is_empty() {
		return Ok(());
	}

	let document_ids = sources.iter().map(|source| source.document_id.clone()).collect::<Vec<_>>();
	let chunk_indexes = sources.iter().map(|source| source.chunk_index).collect::<Vec<_>>();
	let scores = sources.iter().map(|source| source.relevance_score).collect::<Vec<_>>();
	let source_names = sources.iter().map(|source| source.source_name.clone()).collect::<Vec<_>>();

	sqlx::query(
		"\
INSERT INTO conversation_message_sources (
	message_id,
	document_id,
	chunk_index,
	relevance_score,
	source_name
)
SELECT $1, document_id, chunk_index, relevance_score, source_name
FROM UNNEST($2::text[], $3::int4[], $4::float8[], $5::text[])
	AS s(document_id, chunk_index, relevance_score, source_name)",
	)
	.bind(message_id)
	.bind(document_ids)
	.bind(chunk_indexes)
	.bind(scores)
	.bind(source_names)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn message_exists<'e>(executor: impl PgExecutor<'e>, message_id: i64) -> Result<bool> {
	let exists = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM conversation_messages WHERE message_id = $1)",
	)
	.bind(message_id)
	.fetch_one(executor)
	.await?;

	Ok(exists)
}

pub async fn insert_feedback<'e>(
	executor: impl PgExecutor<'e>,
	message_id: i64,
	user_id: &str,
	score: i16,
	comment: Option<&str>,
) -> Result<i64> {
	let feedback_id = sqlx::query_scalar::<_, i64>(
		"\
INSERT INTO conversation_message_feedback (message_id, user_id, score, comment)
VALUES ($1, $2, $3, $4)
RETURNING feedback_id",
	)
	.bind(message_id)
	.bind(user_id)
	.bind(score)
	.bind(comment)
	.fetch_one(executor)
	.await?;

	Ok(feedback_id)
}

/// Average rating of every answer that cited each document, counting a message once per document.
pub async fn average_feedback_by_document<'e>(
	executor: impl PgExecutor<'e>,
	document_ids: &[String],
) -> Result<Vec<DocumentFeedback>> {
	if document_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, DocumentFeedback>(
		"\
SELECT
	cited.document_id,
	AVG(f.score)::float8 AS avg_score
FROM (
	SELECT DISTINCT message_id, document_id
	FROM conversation_message_sources
	WHERE document_id = ANY($1)
) cited
JOIN conversation_message_feedback f ON f.message_id = cited.message_id
GROUP BY cited.document_id",
	)
	.bind(document_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn insert_evaluation_run<'e>(executor: impl PgExecutor<'e>) -> Result<i64> {
	let run_id = sqlx::query_scalar::<_, i64>(
		"INSERT INTO evaluation_runs DEFAULT VALUES RETURNING run_id",
	)
	.fetch_one(executor)
	.await?;

	Ok(run_id)
}

pub async fn finish_evaluation_run<'e>(
	executor: impl PgExecutor<'e>,
	run_id: i64,
	total_items: i32,
	hit_rate: f64,
	avg_similarity: Option<f64>,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE evaluation_runs
SET
	finished_at = now(),
	total_items = $2,
	hit_rate = $3,
	avg_similarity = $4
WHERE run_id = $1",
	)
	.bind(run_id)
	.bind(total_items)
	.bind(hit_rate)
	.bind(avg_similarity)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_evaluation_result<'e>(
	executor: impl PgExecutor<'e>,
	run_id: i64,
	result: &EvaluationResult,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO evaluation_results (
	run_id,
	item_id,
	question,
	expected_answer,
	actual_answer,
	hit,
	similarity
)
VALUES ($1, $2, $3, $4, $5, $6, $7)",
	)
	.bind(run_id)
	.bind(result.item_id.as_deref())
	.bind(result.question.as_str())
	.bind(result.expected_answer.as_deref())
	.bind(result.actual_answer.as_deref())
	.bind(result.hit)
	.bind(result.similarity)
	.execute(executor)
	.await?;

	Ok(())
}
