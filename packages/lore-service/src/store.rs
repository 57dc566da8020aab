use std::collections::HashMap;

use sqlx::PgPool;

use lore_domain::{ChatTurn, DocumentMeta, RetrievalMatch, Role, Visibility, text};
use lore_storage::{
	db::Db,
	models::{DocumentRecord, EvaluationResult, MessageRecord, MessageSource},
	queries,
};

use crate::{
	BoxFuture, ConversationStore, DocumentStore, EvaluationStore, NewFeedback, NewMessage, Result,
};

/// Postgres-backed document, conversation, and evaluation store.
#[derive(Clone)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	pub fn new(db: Db) -> Self {
		Self { pool: db.pool }
	}
}

impl DocumentStore for PgStore {
	fn documents<'a>(
		&'a self,
		document_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<DocumentMeta>>> {
		Box::pin(async move {
			let records = queries::fetch_documents(&self.pool, document_ids).await?;

			Ok(records.into_iter().map(document_meta).collect())
		})
	}

	fn ids_by_owner<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(queries::document_ids_by_owner(&self.pool, owner_id).await?) })
	}

	fn ids_by_visibility<'a>(
		&'a self,
		visibility: Visibility,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			Ok(queries::document_ids_by_visibility(&self.pool, visibility.as_str()).await?)
		})
	}
}

impl ConversationStore for PgStore {
	fn latest_session<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Ok(queries::latest_session_for_user(&self.pool, user_id).await?) })
	}

	fn recent_turns<'a>(
		&'a self,
		session_id: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<ChatTurn>>> {
		Box::pin(async move {
			let limit = i64::try_from(limit).unwrap_or(i64::MAX);
			let records = queries::recent_messages(&self.pool, session_id, limit).await?;

			Ok(records.into_iter().filter_map(chat_turn).collect())
		})
	}

	fn append_message<'a>(&'a self, message: NewMessage<'a>) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			Ok(queries::insert_message(
				&self.pool,
				message.session_id,
				message.user_id,
				message.role.as_str(),
				message.content,
			)
			.await?)
		})
	}

	fn append_sources<'a>(
		&'a self,
		message_id: i64,
		sources: &'a [RetrievalMatch],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let sources = sources
				.iter()
				.map(|item| MessageSource {
					document_id: item.document_id.clone(),
					chunk_index: item.chunk_index,
					relevance_score: item.relevance_score,
					source_name: item.source_name.clone(),
				})
				.collect::<Vec<_>>();

			Ok(queries::insert_message_sources(&self.pool, message_id, &sources).await?)
		})
	}

	fn message_exists<'a>(&'a self, message_id: i64) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(queries::message_exists(&self.pool, message_id).await?) })
	}

	fn append_feedback<'a>(&'a self, feedback: NewFeedback<'a>) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			Ok(queries::insert_feedback(
				&self.pool,
				feedback.message_id,
				feedback.user_id,
				i16::from(feedback.score),
				feedback.comment,
			)
			.await?)
		})
	}

	fn average_ratings<'a>(
		&'a self,
		document_ids: &'a [String],
	) -> BoxFuture<'a, Result<HashMap<String, f64>>> {
		Box::pin(async move {
			let rows = queries::average_feedback_by_document(&self.pool, document_ids).await?;

			Ok(rows.into_iter().map(|row| (row.document_id, row.avg_score)).collect())
		})
	}
}

impl EvaluationStore for PgStore {
	fn start_run(&self) -> BoxFuture<'_, Result<i64>> {
		Box::pin(async move { Ok(queries::insert_evaluation_run(&self.pool).await?) })
	}

	fn record_result<'a>(
		&'a self,
		run_id: i64,
		result: &'a EvaluationResult,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			Ok(queries::insert_evaluation_result(&self.pool, run_id, result).await?)
		})
	}

	fn finish_run<'a>(
		&'a self,
		run_id: i64,
		total: usize,
		hit_rate: f64,
		avg_similarity: Option<f64>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let total = i32::try_from(total).unwrap_or(i32::MAX);

			Ok(queries::finish_evaluation_run(&self.pool, run_id, total, hit_rate, avg_similarity)
				.await?)
		})
	}
}

fn document_meta(record: DocumentRecord) -> DocumentMeta {
	DocumentMeta {
		document_id: record.document_id,
		source_name: record.source_name,
		owner_id: record.owner_id,
		visibility: record.visibility,
		doc_type: record.doc_type,
		department: record.department,
		policy_year: record.policy_year,
		tags: record.tags,
	}
}

fn chat_turn(record: MessageRecord) -> Option<ChatTurn> {
	let Some(role) = Role::parse(&record.role) else {
		tracing::warn!(
			message_id = record.message_id,
			role = %record.role,
			"Skipping stored message with an unknown role."
		);

		return None;
	};

	Some(ChatTurn {
		role,
		content: record.content,
		timestamp: text::format_timestamp(record.created_at),
	})
}
