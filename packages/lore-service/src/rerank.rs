use std::sync::Arc;

use lore_config::Config;
use lore_domain::{RetrievalMatch, rerank};

use crate::CompletionProvider;

const DEFAULT_RERANK_PROMPT: &str = "\
你是检索重排助手，请根据用户问题为候选片段打相关度分数。
要求：
1. 评分范围 0.0-1.0，越高越相关
2. 只输出 “id:score” 每行一条
3. 不要输出多余解释或符号";
const JUDGE_MAX_TOKENS: u32 = 256;

/// Rescores the head of a ranked list with the completion model acting as a relevance judge.
#[derive(Clone)]
pub struct Reranker {
	cfg: Arc<Config>,
	completion: Arc<dyn CompletionProvider>,
}
impl Reranker {
	pub fn new(cfg: Arc<Config>, completion: Arc<dyn CompletionProvider>) -> Self {
		Self { cfg, completion }
	}

	/// Returns `matches` untouched when reranking is off, when there is nothing to reorder, or
	/// when the judge produces no usable score. Only a scored list is cut to `top_k`.
	pub async fn rerank(
		&self,
		query: &str,
		matches: Vec<RetrievalMatch>,
		top_k: usize,
	) -> Vec<RetrievalMatch> {
		let cfg = &self.cfg.retrieval.rerank;

		if !cfg.enabled || matches.len() <= 1 {
			return matches;
		}

		let candidate_count = (cfg.max_candidates as usize).min(matches.len());
		let input = rerank::build_judge_input(
			query,
			&matches[..candidate_count],
			cfg.snippet_chars as usize,
		);
		let prompt = cfg.prompt.as_deref().unwrap_or(DEFAULT_RERANK_PROMPT);
		let messages = crate::instruction(prompt, &input);
		let scores = match self
			.completion
			.complete(&self.cfg.providers.llm, &messages, Some(JUDGE_MAX_TOKENS))
			.await
		{
			Ok(output) => rerank::parse_scores(&output),
			Err(err) => {
				tracing::warn!(error = %err, "Rerank judge failed, keeping retrieval order.");

				Default::default()
			},
		};

		if scores.is_empty() {
			tracing::debug!("Rerank judge returned no scores, keeping retrieval order.");

			return matches;
		}

		tracing::debug!(candidates = candidate_count, scored = scores.len(), "Reranked candidates.");

		rerank::apply_scores(matches, candidate_count, &scores, top_k)
	}
}
