//! Retrieval-and-answer orchestration.
//!
//! [`LoreService`] is the composition root: it wires the query analyzer, hybrid retriever,
//! fusion stage, quality gate, reranker, and feedback loop to their collaborators and exposes
//! chat, streamed chat, search, feedback, and evaluation on top of them.

pub mod analyzer;
pub mod conversation;
pub mod crag;
pub mod eval;
pub mod feedback;
pub mod fusion;
pub mod index;
pub mod rerank;
pub mod retriever;
pub mod session;
pub mod store;

mod error;

pub use analyzer::QueryAnalyzer;
pub use conversation::{ChatEvent, ChatEventStream, ChatResponse};
pub use crag::QualityGate;
pub use error::{Error, Result};
pub use eval::{EvaluationItem, EvaluationItemResult, EvaluationReport};
pub use feedback::{FeedbackLoop, FeedbackRequest};
pub use fusion::FusionStage;
pub use index::{HybridQuery, MatchOperator, QdrantIndex};
pub use rerank::Reranker;
pub use retriever::HybridRetriever;
pub use session::SessionCache;
pub use store::PgStore;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use futures::{Stream, StreamExt};

use lore_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use lore_domain::{ChatTurn, DocumentMeta, RetrievalMatch, Visibility};
use lore_providers::{
	completion::{self, ChatMessage},
	embedding,
};
use lore_storage::{db::Db, models::EvaluationResult, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Incremental answer text from a completion provider.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		max_tokens: Option<u32>,
	) -> BoxFuture<'a, Result<String>>;

	/// Dropping the returned stream must cancel the underlying request.
	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<TextStream>>;
}

/// External hybrid index over `{document_id, chunk_index, text, vector}` passages.
///
/// Implementations report a missing index as [`Error::IndexMissing`].
pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn hybrid<'a>(&'a self, query: &'a HybridQuery) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>>;

	fn vector<'a>(
		&'a self,
		vector: &'a [f32],
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>>;

	fn text<'a>(&'a self, text: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>>;
}

/// Document metadata lookups used for access and metadata filtering.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn documents<'a>(
		&'a self,
		document_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<DocumentMeta>>>;

	fn ids_by_owner<'a>(&'a self, owner_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

	fn ids_by_visibility<'a>(
		&'a self,
		visibility: Visibility,
	) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub struct NewMessage<'a> {
	pub session_id: &'a str,
	pub user_id: &'a str,
	pub role: lore_domain::Role,
	pub content: &'a str,
}

pub struct NewFeedback<'a> {
	pub message_id: i64,
	pub user_id: &'a str,
	pub score: u8,
	pub comment: Option<&'a str>,
}

/// Durable conversation state: messages, their evidence, and ratings.
pub trait ConversationStore
where
	Self: Send + Sync,
{
	fn latest_session<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

	/// The newest `limit` turns of a session, oldest first.
	fn recent_turns<'a>(
		&'a self,
		session_id: &'a str,
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<ChatTurn>>>;

	fn append_message<'a>(&'a self, message: NewMessage<'a>) -> BoxFuture<'a, Result<i64>>;

	fn append_sources<'a>(
		&'a self,
		message_id: i64,
		sources: &'a [RetrievalMatch],
	) -> BoxFuture<'a, Result<()>>;

	fn message_exists<'a>(&'a self, message_id: i64) -> BoxFuture<'a, Result<bool>>;

	fn append_feedback<'a>(&'a self, feedback: NewFeedback<'a>) -> BoxFuture<'a, Result<i64>>;

	/// Average rating of the answers that cited each document. Unrated documents are absent.
	fn average_ratings<'a>(
		&'a self,
		document_ids: &'a [String],
	) -> BoxFuture<'a, Result<HashMap<String, f64>>>;
}

pub trait EvaluationStore
where
	Self: Send + Sync,
{
	fn start_run(&self) -> BoxFuture<'_, Result<i64>>;

	fn record_result<'a>(
		&'a self,
		run_id: i64,
		result: &'a EvaluationResult,
	) -> BoxFuture<'a, Result<()>>;

	fn finish_run<'a>(
		&'a self,
		run_id: i64,
		total: usize,
		hit_rate: f64,
		avg_similarity: Option<f64>,
	) -> BoxFuture<'a, Result<()>>;
}

/// Working-memory cache over the durable conversation store.
pub trait SessionStore
where
	Self: Send + Sync,
{
	fn session_for_user(&self, user_id: &str) -> Option<String>;

	/// Binds `candidate` unless another caller already bound a session; returns the winner.
	fn bind_session(&self, user_id: &str, candidate: String) -> String;

	fn get(&self, session_id: &str) -> Option<Vec<ChatTurn>>;

	fn replace(&self, session_id: &str, turns: Vec<ChatTurn>);

	fn append(&self, session_id: &str, turns: &[ChatTurn]);

	fn trim(&self, session_id: &str, keep: usize);
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub completion: Arc<dyn CompletionProvider>,
}

#[derive(Clone)]
pub struct Backends {
	pub index: Arc<dyn SearchIndex>,
	pub documents: Arc<dyn DocumentStore>,
	pub conversations: Arc<dyn ConversationStore>,
	pub evaluations: Arc<dyn EvaluationStore>,
	pub sessions: Arc<dyn SessionStore>,
}

#[derive(Clone)]
pub struct LoreService {
	pub cfg: Arc<Config>,
	pub providers: Providers,
	pub backends: Backends,
	pub analyzer: QueryAnalyzer,
	pub retriever: HybridRetriever,
	pub fusion: FusionStage,
	pub gate: QualityGate,
	pub reranker: Reranker,
	pub feedback: FeedbackLoop,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		max_tokens: Option<u32>,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(completion::complete(cfg, messages, max_tokens).await?) })
	}

	fn stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<TextStream>> {
		Box::pin(async move {
			let chunks = completion::stream(cfg, messages).await?;
			let stream: TextStream = Box::pin(chunks.map(|chunk| chunk.map_err(Error::from)));

			Ok(stream)
		})
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		completion: Arc<dyn CompletionProvider>,
	) -> Self {
		Self { embedding, completion }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), completion: provider }
	}
}

impl Backends {
	/// Postgres for durable state, Qdrant for passages, and an in-process session cache.
	pub fn new(db: Db, qdrant: QdrantStore) -> Self {
		let store = Arc::new(PgStore::new(db));

		Self {
			index: Arc::new(QdrantIndex::new(qdrant)),
			documents: store.clone(),
			conversations: store.clone(),
			evaluations: store,
			sessions: Arc::new(SessionCache::default()),
		}
	}
}

impl LoreService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_backends(cfg, Backends::new(db, qdrant), Providers::default())
	}

	pub fn with_backends(cfg: Config, backends: Backends, providers: Providers) -> Self {
		let cfg = Arc::new(cfg);
		let analyzer = QueryAnalyzer::new(cfg.clone(), providers.completion.clone());
		let feedback = FeedbackLoop::new(cfg.clone(), backends.conversations.clone());
		let retriever = HybridRetriever::new(
			cfg.clone(),
			providers.embedding.clone(),
			backends.index.clone(),
			backends.documents.clone(),
			feedback.clone(),
		);
		let fusion = FusionStage::new(cfg.clone(), retriever.clone());
		let gate = QualityGate::new(cfg.clone(), providers.completion.clone());
		let reranker = Reranker::new(cfg.clone(), providers.completion.clone());

		Self { cfg, providers, backends, analyzer, retriever, fusion, gate, reranker, feedback }
	}
}

/// Blank or missing user ids act as the anonymous user.
pub(crate) fn normalize_user_id(user_id: Option<&str>) -> String {
	user_id
		.map(str::trim)
		.filter(|user_id| !user_id.is_empty())
		.unwrap_or(lore_domain::ANONYMOUS_USER)
		.to_string()
}

/// One system message followed by one user message, the shape of every analysis sub-call.
pub(crate) fn instruction(system: &str, input: &str) -> [ChatMessage; 2] {
	[ChatMessage::system(system), ChatMessage::user(input)]
}

#[cfg(test)]
mod tests {
	use crate::normalize_user_id;

	#[test]
	fn blank_user_ids_become_anonymous() {
		assert_eq!(normalize_user_id(None), "anonymous");
		assert_eq!(normalize_user_id(Some("  ")), "anonymous");
		assert_eq!(normalize_user_id(Some(" u1 ")), "u1");
	}
}
