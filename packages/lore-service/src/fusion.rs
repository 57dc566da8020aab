use std::sync::Arc;

use lore_config::Config;
use lore_domain::{MetadataFilter, QueryPlan, RetrievalMatch, fusion, plan, text};

use crate::{BoxFuture, HybridRetriever, Result};

/// Fans one query plan out to the retriever and merges the ranked lists with reciprocal rank
/// fusion.
#[derive(Clone)]
pub struct FusionStage {
	cfg: Arc<Config>,
	retriever: HybridRetriever,
}
impl FusionStage {
	pub fn new(cfg: Arc<Config>, retriever: HybridRetriever) -> Self {
		Self { cfg, retriever }
	}

	/// Retrieves the original query, then the rewrites and HyDE probe that fit the query
	/// budget, concurrently, and fuses whatever lists came back.
	pub async fn retrieve(
		&self,
		query_plan: &QueryPlan,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Result<Vec<RetrievalMatch>> {
		let cfg = &self.cfg.retrieval;
		let mut calls: Vec<BoxFuture<'_, Result<Vec<RetrievalMatch>>>> = vec![Box::pin(
			self.retrieve_with_fallback(&query_plan.original_query, top_k, user_id, filter),
		)];

		if cfg.fusion.enabled {
			let rewrite_budget = if cfg.rewrite.enabled {
				plan::rewrite_budget(cfg.fusion.max_queries as usize, cfg.hyde.enabled)
			} else {
				0
			};

			for rewrite in query_plan.rewritten_queries.iter().take(rewrite_budget) {
				calls.push(Box::pin(self.retrieve_with_fallback(rewrite, top_k, user_id, filter)));
			}

			if cfg.hyde.enabled
				&& let Some(hyde) =
					query_plan.hyde_answer.as_deref().filter(|answer| !answer.trim().is_empty())
			{
				calls.push(Box::pin(async move {
					Ok(self.retriever.retrieve_vector_only(hyde, top_k, user_id, filter).await)
				}));
			}
		}

		let lists = futures::future::try_join_all(calls).await?;

		tracing::debug!(lists = lists.len(), "Retrieval fan-out finished.");

		Ok(self.fuse(lists, top_k))
	}

	/// RRF over `lists`. A single list, or fusion switched off, passes the first list through.
	pub fn fuse(&self, lists: Vec<Vec<RetrievalMatch>>, top_k: usize) -> Vec<RetrievalMatch> {
		let cfg = &self.cfg.retrieval.fusion;

		if !cfg.enabled || lists.len() <= 1 {
			return lists.into_iter().next().unwrap_or_default();
		}

		fusion::reciprocal_rank_fusion(&lists, cfg.rrf_k, top_k)
	}

	/// Requeries once with normalized text when the first attempt scores under the floor. The
	/// retry wins only when it clears the floor itself.
	pub async fn retrieve_with_fallback(
		&self,
		query: &str,
		top_k: usize,
		user_id: &str,
		filter: &MetadataFilter,
	) -> Result<Vec<RetrievalMatch>> {
		let results = self.retriever.retrieve(query, top_k, user_id, filter).await?;

		if !plan::is_low_quality(&results, plan::MIN_ACCEPTABLE_SCORE) {
			return Ok(results);
		}

		let refined = text::normalize_query(query);

		if refined.is_empty() || refined == query {
			return Ok(results);
		}

		let widened = top_k.saturating_mul(2).min(plan::MAX_TOP_K);
		let retry = self.retriever.retrieve(&refined, widened, user_id, filter).await?;

		if plan::is_low_quality(&retry, plan::MIN_ACCEPTABLE_SCORE) {
			return Ok(results);
		}

		tracing::debug!(refined = %refined, "Normalized requery replaced a low-quality result.");

		Ok(retry)
	}
}
