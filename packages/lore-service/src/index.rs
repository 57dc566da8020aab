use std::collections::{HashMap, HashSet};

use lore_domain::{RetrievalMatch, fusion, plan, text};
use lore_storage::qdrant::{QdrantStore, ScoredChunk};

use crate::{BoxFuture, Result, SearchIndex};

pub const VECTOR_WEIGHT: f64 = 0.2;
pub const LEXICAL_WEIGHT: f64 = 1.0;

/// How lexical terms must match inside the vector recall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchOperator {
	/// Any term.
	Or,
	/// Every term.
	And,
}

/// Vector recall narrowed and rescored by a lexical match on the same text.
#[derive(Clone, Debug)]
pub struct HybridQuery {
	pub text: String,
	pub vector: Vec<f32>,
	/// Size of the k-NN candidate pool, which is also the rescoring window.
	pub recall_size: usize,
	pub operator: MatchOperator,
}
impl HybridQuery {
	pub fn new(text: &str, vector: Vec<f32>, top_k: usize) -> Self {
		let operator =
			if text::is_short_query(text) { MatchOperator::Or } else { MatchOperator::And };

		Self {
			text: text.to_string(),
			vector,
			recall_size: plan::recall_size(text, top_k),
			operator,
		}
	}
}

pub struct QdrantIndex {
	store: QdrantStore,
}
impl QdrantIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}

	async fn run_hybrid(&self, query: &HybridQuery) -> Result<Vec<RetrievalMatch>> {
		let recall = query.recall_size as u64;
		let dense = self.store.dense_search(query.vector.clone(), recall).await?;

		if dense.is_empty() {
			return Ok(Vec::new());
		}

		let within = dense.iter().map(|chunk| chunk.point_id.clone()).collect::<Vec<_>>();
		let lexical = self.store.lexical_search(&query.text, recall, &within).await?;

		Ok(rescore(query, &dense, lexical))
	}
}

impl SearchIndex for QdrantIndex {
	fn hybrid<'a>(&'a self, query: &'a HybridQuery) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>> {
		Box::pin(self.run_hybrid(query))
	}

	fn vector<'a>(
		&'a self,
		vector: &'a [f32],
		limit: usize,
	) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>> {
		Box::pin(async move {
			let chunks = self.store.dense_search(vector.to_vec(), limit as u64).await?;

			Ok(chunks.into_iter().map(into_match).collect())
		})
	}

	fn text<'a>(&'a self, text: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<RetrievalMatch>>> {
		Box::pin(async move {
			let chunks = self.store.lexical_search(text, limit as u64, &[]).await?;

			Ok(chunks.into_iter().map(into_match).collect())
		})
	}
}

/// Keeps lexical hits that sit inside the vector recall and satisfy the operator, scored
/// `0.2 * vector + 1.0 * lexical`.
fn rescore(
	query: &HybridQuery,
	dense: &[ScoredChunk],
	lexical: Vec<ScoredChunk>,
) -> Vec<RetrievalMatch> {
	let vector_scores = dense
		.iter()
		.map(|chunk| ((chunk.document_id.as_str(), chunk.chunk_index), chunk.score))
		.collect::<HashMap<_, _>>();
	let terms = match query.operator {
		MatchOperator::Or => Vec::new(),
		MatchOperator::And => text::lexical_terms(&query.text),
	};
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for chunk in lexical {
		let key = (chunk.document_id.clone(), chunk.chunk_index);
		let Some(vector_score) = vector_scores.get(&(key.0.as_str(), key.1)).copied() else {
			continue;
		};

		if !seen.insert(key) || !contains_all_terms(&chunk.text, &terms) {
			continue;
		}

		let score = VECTOR_WEIGHT * f64::from(vector_score) + LEXICAL_WEIGHT * f64::from(chunk.score);
		let mut item = into_match(chunk);

		item.relevance_score = score;

		out.push(item);
	}

	fusion::sort_by_score(&mut out);
	out.truncate(query.recall_size);

	out
}

fn contains_all_terms(body: &str, terms: &[String]) -> bool {
	if terms.is_empty() {
		return true;
	}

	let body = body.to_lowercase();

	terms.iter().all(|term| body.contains(term.as_str()))
}

fn into_match(chunk: ScoredChunk) -> RetrievalMatch {
	RetrievalMatch {
		document_id: chunk.document_id,
		chunk_index: chunk.chunk_index,
		text: chunk.text,
		relevance_score: f64::from(chunk.score),
		source_name: None,
	}
}

#[cfg(test)]
mod tests {
	use lore_storage::qdrant::ScoredChunk;

	use crate::index::{HybridQuery, MatchOperator, rescore};

	fn chunk(id: u64, document_id: &str, text: &str, score: f32) -> ScoredChunk {
		ScoredChunk {
			point_id: id.into(),
			document_id: document_id.to_string(),
			chunk_index: 0,
			text: text.to_string(),
			score,
		}
	}

	#[test]
	fn short_queries_match_any_term() {
		let query = HybridQuery::new("奖学金", vec![0.0; 4], 5);

		assert_eq!(query.operator, MatchOperator::Or);
		assert_eq!(query.recall_size, 250);
		assert_eq!(HybridQuery::new("国家奖学金的申请条件是什么", vec![], 5).recall_size, 150);
	}

	#[test]
	fn rescoring_blends_and_intersects() {
		let query = HybridQuery::new("fee", vec![], 5);
		let dense = vec![chunk(1, "a", "fee waiver", 0.5), chunk(2, "b", "fee table", 0.9)];
		let lexical = vec![
			chunk(1, "a", "fee waiver", 2.0),
			chunk(2, "b", "fee table", 1.0),
			chunk(3, "c", "fee outside recall", 9.0),
		];
		let out = rescore(&query, &dense, lexical);

		assert_eq!(out.len(), 2);
		assert_eq!(out[0].document_id, "a");
		assert!((out[0].relevance_score - (0.2 * 0.5 + 2.0)).abs() < 1e-6);
		assert!((out[1].relevance_score - (0.2 * 0.9 + 1.0)).abs() < 1e-6);
	}

	#[test]
	fn and_operator_requires_every_term() {
		let query = HybridQuery::new("tuition refund policy", vec![], 5);

		assert_eq!(query.operator, MatchOperator::And);

		let dense = vec![chunk(1, "a", "", 0.5), chunk(2, "b", "", 0.5)];
		let lexical = vec![
			chunk(1, "a", "Tuition refund policy for 2024", 1.0),
			chunk(2, "b", "Tuition payment policy", 3.0),
		];
		let out = rescore(&query, &dense, lexical);

		assert_eq!(out.len(), 1);
		assert_eq!(out[0].document_id, "a");
	}
}
