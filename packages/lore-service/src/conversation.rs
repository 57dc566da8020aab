use std::{pin::Pin, time::Duration};

use futures::{Stream, StreamExt};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use lore_domain::{
	ChatTurn, CragAction, MetadataFilter, RetrievalMatch, Role, plan,
	prompt::{self, SystemPrompt},
	text,
};
use lore_providers::completion::ChatMessage;

use crate::{Error, LoreService, NewMessage, Result};

pub const DEFAULT_SEARCH_TOP_K: usize = 10;
pub const MAX_SEARCH_TOP_K: usize = 50;

const STREAM_BUFFER: usize = 64;
const STREAM_FAILURE: &str = "The answer could not be generated. Please try again later.";

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
	pub answer: String,
	pub sources: Vec<RetrievalMatch>,
	pub message_id: Option<i64>,
}

/// One event of a streamed answer. A stream ends after `Done` or `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
	Chunk(String),
	Sources(Vec<RetrievalMatch>),
	MessageId(i64),
	Error(String),
	Done,
}

struct Turn {
	user_id: String,
	session_id: String,
	message: String,
	history: Vec<ChatTurn>,
}

enum Outcome {
	/// The gate or the fallback ended the turn with a canned message.
	Reply { text: String, evidence: Vec<RetrievalMatch> },
	Generate { evidence: Vec<RetrievalMatch>, messages: Vec<ChatMessage> },
}

impl LoreService {
	/// Answers one message and waits for the whole reply.
	pub async fn chat(&self, user_id: Option<&str>, message: &str) -> Result<ChatResponse> {
		let turn = self.open_turn(user_id, message).await?;

		match self.prepare(&turn).await? {
			Outcome::Reply { text, evidence } => {
				let message_id = self.record_turn(&turn, &text, &evidence).await;

				Ok(ChatResponse { answer: text, sources: evidence, message_id })
			},
			Outcome::Generate { evidence, messages } => {
				let limit = Duration::from_secs(self.cfg.conversation.answer_timeout_secs);
				let answer = tokio::time::timeout(limit, self.collect_answer(&messages))
					.await
					.map_err(|_| Error::Timeout {
						message: format!("Answer generation exceeded {} seconds.", limit.as_secs()),
					})??;
				let message_id = self.record_turn(&turn, &answer, &evidence).await;

				Ok(ChatResponse { answer, sources: evidence, message_id })
			},
		}
	}

	/// Answers one message as a stream of events.
	///
	/// Input is validated before this returns. Dropping the returned stream cancels the
	/// provider request and the partial answer is not persisted.
	pub async fn chat_stream(
		&self,
		user_id: Option<&str>,
		message: &str,
	) -> Result<ChatEventStream> {
		let turn = self.open_turn(user_id, message).await?;
		let (tx, rx) = mpsc::channel(STREAM_BUFFER);
		let service = self.clone();

		tokio::spawn(async move { service.stream_turn(turn, tx).await });

		Ok(Box::pin(ReceiverStream::new(rx)))
	}

	/// Retrieval and reranking without query expansion, the quality gate, or generation.
	pub async fn search(
		&self,
		query: &str,
		top_k: Option<usize>,
		user_id: Option<&str>,
		filter: Option<MetadataFilter>,
	) -> Result<Vec<RetrievalMatch>> {
		let query = query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let top_k = top_k.unwrap_or(DEFAULT_SEARCH_TOP_K);

		if top_k == 0 || top_k > MAX_SEARCH_TOP_K {
			return Err(Error::InvalidRequest {
				message: format!("topK must be between 1 and {MAX_SEARCH_TOP_K}."),
			});
		}

		let user_id = crate::normalize_user_id(user_id);
		let filter = filter.unwrap_or_default();
		let matches = self.retriever.retrieve(query, top_k, &user_id, &filter).await?;

		Ok(self.reranker.rerank(query, matches, top_k).await)
	}

	async fn open_turn(&self, user_id: Option<&str>, message: &str) -> Result<Turn> {
		let message = message.trim();

		if message.is_empty() {
			return Err(Error::InvalidRequest {
				message: "message must not be empty.".to_string(),
			});
		}

		let user_id = crate::normalize_user_id(user_id);
		let session_id = self.resolve_session(&user_id).await;
		let history = self.load_history(&session_id).await;

		tracing::info!(
			user_id = %user_id,
			session_id = %session_id,
			history = history.len(),
			"Conversation turn opened."
		);

		Ok(Turn { user_id, session_id, message: message.to_string(), history })
	}

	async fn resolve_session(&self, user_id: &str) -> String {
		let sessions = &self.backends.sessions;

		if let Some(session_id) = sessions.session_for_user(user_id) {
			return session_id;
		}

		let candidate = match self.backends.conversations.latest_session(user_id).await {
			Ok(Some(session_id)) => session_id,
			Ok(None) => Uuid::new_v4().to_string(),
			Err(err) => {
				tracing::warn!(error = %err, "Latest session lookup failed, starting a new one.");

				Uuid::new_v4().to_string()
			},
		};

		sessions.bind_session(user_id, candidate)
	}

	async fn load_history(&self, session_id: &str) -> Vec<ChatTurn> {
		if let Some(turns) = self.backends.sessions.get(session_id) {
			return turns;
		}

		let keep = self.cfg.conversation.max_history as usize;

		match self.backends.conversations.recent_turns(session_id, keep).await {
			Ok(turns) => {
				self.backends.sessions.replace(session_id, turns.clone());

				turns
			},
			Err(err) => {
				tracing::warn!(error = %err, "History load failed, answering without history.");

				Vec::new()
			},
		}
	}

	async fn prepare(&self, turn: &Turn) -> Result<Outcome> {
		let top_k = plan::adaptive_top_k(&turn.message);
		let (filter, query_plan) = futures::join!(
			self.analyzer.resolve_filter(&turn.message),
			self.analyzer.create_plan(&turn.message),
		);

		tracing::debug!(
			top_k,
			rewrites = query_plan.rewritten_queries.len(),
			hyde = query_plan.hyde_answer.is_some(),
			filtered = !filter.is_empty(),
			"Query analyzed."
		);

		let fused = self.fusion.retrieve(&query_plan, top_k, &turn.user_id, &filter).await?;
		let matches = self.reranker.rerank(&turn.message, fused, top_k).await;
		let decision = self.gate.evaluate(&turn.message, &matches).await;

		tracing::info!(action = ?decision.action, matches = matches.len(), "Quality gate decided.");

		let evidence = match decision.action {
			CragAction::Answer => matches,
			CragAction::Refine => {
				let fallback = self.refine(turn, top_k, &filter).await;

				if fallback.is_empty() {
					return Ok(Outcome::Reply {
						text: self.gate.no_result_message(),
						evidence: Vec::new(),
					});
				}

				fallback
			},
			CragAction::Clarify | CragAction::NoAnswer => {
				let text = decision.message.unwrap_or_else(|| self.gate.no_result_message());

				return Ok(Outcome::Reply { text, evidence: matches });
			},
		};
		let messages = self.answer_messages(turn, &evidence);

		Ok(Outcome::Generate { evidence, messages })
	}

	/// Lexical-only retrieval over a wider window, reranked back down to `top_k`.
	async fn refine(
		&self,
		turn: &Turn,
		top_k: usize,
		filter: &MetadataFilter,
	) -> Vec<RetrievalMatch> {
		let multiplier = self.cfg.retrieval.crag.fallback_multiplier.max(1) as usize;
		let widened = top_k.saturating_mul(multiplier).min(plan::MAX_TOP_K);
		let fallback =
			self.retriever.retrieve_text_only(&turn.message, widened, &turn.user_id, filter).await;

		tracing::debug!(widened, found = fallback.len(), "Refinement retrieval finished.");

		self.reranker.rerank(&turn.message, fallback, top_k).await
	}

	/// System rules with the reference block, then history, then the question.
	fn answer_messages(&self, turn: &Turn, evidence: &[RetrievalMatch]) -> Vec<ChatMessage> {
		let cfg = &self.cfg.prompt;
		let reference = prompt::reference_block(
			evidence,
			evidence.len(),
			self.cfg.conversation.max_reference_chars as usize,
		);
		let system = SystemPrompt {
			rules: cfg.rules.as_deref(),
			ref_start: &cfg.ref_start,
			ref_end: &cfg.ref_end,
			no_result_text: &cfg.no_result_text,
		}
		.render(&reference);
		let mut messages = Vec::with_capacity(turn.history.len() + 2);

		messages.push(ChatMessage::system(system));
		messages.extend(turn.history.iter().map(|past| match past.role {
			Role::User => ChatMessage::user(past.content.as_str()),
			Role::Assistant => ChatMessage::assistant(past.content.as_str()),
		}));
		messages.push(ChatMessage::user(turn.message.as_str()));

		messages
	}

	async fn collect_answer(&self, messages: &[ChatMessage]) -> Result<String> {
		let mut chunks =
			self.providers.completion.stream(&self.cfg.providers.llm, messages).await?;
		let mut answer = String::new();

		while let Some(chunk) = chunks.next().await {
			answer.push_str(&chunk?);
		}

		Ok(answer)
	}

	async fn stream_turn(self, turn: Turn, tx: mpsc::Sender<ChatEvent>) {
		let outcome = match self.prepare(&turn).await {
			Ok(outcome) => outcome,
			Err(err) => {
				tracing::error!(error = %err, "Streamed turn failed before generation.");

				let _ = tx.send(ChatEvent::Error(STREAM_FAILURE.to_string())).await;

				return;
			},
		};
		let (answer, evidence) = match outcome {
			Outcome::Reply { text, evidence } => {
				if tx.send(ChatEvent::Chunk(text.clone())).await.is_err() {
					return;
				}

				(text, evidence)
			},
			Outcome::Generate { evidence, messages } => {
				let Some(answer) = self.relay_answer(&messages, &tx).await else {
					return;
				};

				(answer, evidence)
			},
		};

		if tx.is_closed() {
			tracing::info!(session_id = %turn.session_id, "Stream closed before persistence.");

			return;
		}

		let message_id = self.record_turn(&turn, &answer, &evidence).await;

		if tx.send(ChatEvent::Sources(evidence)).await.is_err() {
			return;
		}
		if let Some(message_id) = message_id
			&& tx.send(ChatEvent::MessageId(message_id)).await.is_err()
		{
			return;
		}

		let _ = tx.send(ChatEvent::Done).await;
	}

	/// Forwards provider chunks until the provider finishes. `None` means the turn ended early:
	/// the receiver went away or the provider failed.
	async fn relay_answer(
		&self,
		messages: &[ChatMessage],
		tx: &mpsc::Sender<ChatEvent>,
	) -> Option<String> {
		let opened = self.providers.completion.stream(&self.cfg.providers.llm, messages).await;
		let mut chunks = match opened {
			Ok(chunks) => chunks,
			Err(err) => {
				tracing::error!(error = %err, "Answer stream could not be opened.");

				let _ = tx.send(ChatEvent::Error(STREAM_FAILURE.to_string())).await;

				return None;
			},
		};
		let mut answer = String::new();

		loop {
			tokio::select! {
				_ = tx.closed() => {
					tracing::info!("Stream receiver dropped, cancelling generation.");

					return None;
				},
				next = chunks.next() => match next {
					Some(Ok(chunk)) => {
						answer.push_str(&chunk);

						if tx.send(ChatEvent::Chunk(chunk)).await.is_err() {
							return None;
						}
					},
					Some(Err(err)) => {
						tracing::error!(error = %err, "Answer stream failed.");

						let _ = tx.send(ChatEvent::Error(STREAM_FAILURE.to_string())).await;

						return None;
					},
					None => return Some(answer),
				},
			}
		}
	}

	/// Caches and persists the exchange. Every write is best effort; the assistant message id
	/// is returned when it was stored.
	async fn record_turn(
		&self,
		turn: &Turn,
		answer: &str,
		sources: &[RetrievalMatch],
	) -> Option<i64> {
		let timestamp = text::format_timestamp(OffsetDateTime::now_utc());
		let sessions = &self.backends.sessions;
		let conversations = &self.backends.conversations;

		sessions.append(
			&turn.session_id,
			&[
				ChatTurn {
					role: Role::User,
					content: turn.message.clone(),
					timestamp: timestamp.clone(),
				},
				ChatTurn { role: Role::Assistant, content: answer.to_string(), timestamp },
			],
		);
		sessions.trim(&turn.session_id, self.cfg.conversation.max_history as usize);

		if let Err(err) = conversations
			.append_message(NewMessage {
				session_id: &turn.session_id,
				user_id: &turn.user_id,
				role: Role::User,
				content: &turn.message,
			})
			.await
		{
			tracing::warn!(error = %err, "User message was not persisted.");
		}

		let message_id = match conversations
			.append_message(NewMessage {
				session_id: &turn.session_id,
				user_id: &turn.user_id,
				role: Role::Assistant,
				content: answer,
			})
			.await
		{
			Ok(message_id) => message_id,
			Err(err) => {
				tracing::warn!(error = %err, "Assistant message was not persisted.");

				return None;
			},
		};

		if let Err(err) = conversations.append_sources(message_id, sources).await {
			tracing::warn!(error = %err, message_id, "Message sources were not persisted.");
		}

		Some(message_id)
	}
}
