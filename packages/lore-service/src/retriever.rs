use std::{
	collections::{BTreeSet, HashMap, HashSet},
	sync::Arc,
};

use lore_config::Config;
use lore_domain::{DocumentMeta, MetadataFilter, RetrievalMatch, Visibility, plan};

use crate::{
	DocumentStore, EmbeddingProvider, Error, FeedbackLoop, Result, SearchIndex, index::HybridQuery,
};

/// Runs one retrieval query against the index, then applies access control, metadata
/// filtering, and feedback boosting, in that order, before truncating to `top_k`.
#[derive(Clone)]
pub struct HybridRetriever {
	cfg: Arc<Config>,
	embedding: Arc<dyn EmbeddingProvider>,
	index: Arc<dyn SearchIndex>,
	documents: Arc<dyn DocumentStore>,
	feedback: FeedbackLoop,
}
impl HybridRetriever {
	pub fn new(
		cfg: Arc<Config>,
		embedding: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn SearchIndex>,
		documents: Arc<dyn DocumentStore>,
		feedback: FeedbackLoop,
	) -> Self {
		Self { cfg, embedding, index, documents, feedback }
	}

	/// Hybrid vector and lexical retrieval. Degrades to lexical-only when the query cannot be
	/// embedded and to an empty list when the index does not exist.
	pub async fn retrieve(
		&self,
		query: &str,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Result<Vec<RetrievalMatch>> {
		let Some(vector) = self.embed_query(query).await else {
			tracing::warn!("Query embedding unavailable, retrieving lexically.");

			return self.text_only(query, top_k, user_id, filter).await;
		};
		let hybrid = HybridQuery::new(query, vector, top_k);
		let matches = match self.index.hybrid(&hybrid).await {
			Ok(matches) => matches,
			Err(Error::IndexMissing { message }) => {
				tracing::warn!(error = %message, "Search index missing, returning no matches.");

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};

		tracing::debug!(
			candidates = matches.len(),
			recall_size = hybrid.recall_size,
			"Hybrid recall finished."
		);

		self.post_process(matches, top_k, user_id, filter).await
	}

	/// k-NN recall only. Any failure yields an empty list.
	pub async fn retrieve_vector_only(
		&self,
		query: &str,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Vec<RetrievalMatch> {
		let Some(vector) = self.embed_query(query).await else {
			return Vec::new();
		};
		let recall_size = plan::recall_size(query, top_k);
		let result = match self.index.vector(&vector, recall_size).await {
			Ok(matches) => self.post_process(matches, top_k, user_id, filter).await,
			Err(err) => Err(err),
		};

		degrade(result, "Vector-only retrieval failed.")
	}

	/// Lexical match only. Any failure yields an empty list.
	pub async fn retrieve_text_only(
		&self,
		query: &str,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Vec<RetrievalMatch> {
		degrade(self.text_only(query, top_k, user_id, filter).await, "Text-only retrieval failed.")
	}

	async fn text_only(
		&self,
		query: &str,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Result<Vec<RetrievalMatch>> {
		let recall_size = plan::recall_size(query, top_k);
		let matches = match self.index.text(query, recall_size).await {
			Ok(matches) => matches,
			Err(Error::IndexMissing { message }) => {
				tracing::warn!(error = %message, "Search index missing, returning no matches.");

				return Ok(Vec::new());
			},
			Err(err) => return Err(err),
		};

		self.post_process(matches, top_k, user_id, filter).await
	}

	async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
		let texts = [query.to_string()];

		match self.embedding.embed(&self.cfg.providers.embedding, &texts).await {
			Ok(vectors) => vectors.into_iter().next().filter(|vector| !vector.is_empty()),
			Err(err) => {
				tracing::warn!(error = %err, "Query embedding failed.");

				None
			},
		}
	}

	async fn post_process(
		&self,
		matches: Vec<RetrievalMatch>,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Result<Vec<RetrievalMatch>> {
		if matches.is_empty() {
			return Ok(matches);
		}

		let accessible = self.accessible_documents(user_id).await?;
		let mut matches = matches
			.into_iter()
			.filter(|item| accessible.contains(&item.document_id))
			.collect::<Vec<_>>();

		if matches.is_empty() {
			return Ok(matches);
		}

		let records = self.document_records(&matches).await?;

		matches.retain_mut(|item| {
			let Some(record) = records.get(&item.document_id) else {
				return false;
			};

			if !filter.matches(record) {
				return false;
			}

			item.source_name = record.source_name.clone();

			true
		});

		self.feedback.apply(&mut matches).await;

		matches.truncate(top_k);

		Ok(matches)
	}

	/// Public documents plus the ones `user_id` owns.
	async fn accessible_documents(&self, user_id: &str) -> Result<HashSet<String>> {
		let (public, owned) = futures::try_join!(
			self.documents.ids_by_visibility(Visibility::Public),
			self.documents.ids_by_owner(user_id),
		)?;

		Ok(public.into_iter().chain(owned).collect())
	}

	async fn document_records(
		&self,
		matches: &[RetrievalMatch],
	) -> Result<HashMap<String, DocumentMeta>> {
		let ids = matches
			.iter()
			.map(|item| item.document_id.clone())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect::<Vec<_>>();
		let records = self.documents.documents(&ids).await?;

		Ok(records.into_iter().map(|record| (record.document_id.clone(), record)).collect())
	}
}

fn degrade(result: Result<Vec<RetrievalMatch>>, context: &'static str) -> Vec<RetrievalMatch> {
	match result {
		Ok(matches) => matches,
		Err(Error::IndexMissing { message }) => {
			tracing::warn!(error = %message, "Search index missing, returning no matches.");

			Vec::new()
		},
		Err(err) => {
			tracing::warn!(error = %err, "{context}");

			Vec::new()
		},
	}
}
