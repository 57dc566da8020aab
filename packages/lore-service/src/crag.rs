use std::sync::Arc;

use lore_config::Config;
use lore_domain::{
	CragAction, CragDecision, RetrievalMatch,
	crag::{self, DEFAULT_CLARIFY_QUESTION},
};

use crate::CompletionProvider;

const DEFAULT_REVIEW_PROMPT: &str = r#"你是检索质量评估器，请根据问题和候选片段判断是否足以回答。
只输出 JSON，字段如下：
{
  "action": "ANSWER|REFINE|CLARIFY|NO_ANSWER",
  "clarifyQuestion": "当需要澄清时给出一句问题"
}
如果问题本身模糊返回 CLARIFY；资料不足返回 REFINE 或 NO_ANSWER。"#;
const DEFAULT_CLARIFY_PROMPT: &str = "\
你是问答助手，请基于用户问题生成一个澄清问题，帮助补充场景信息。
要求：
1. 一句话
2. 不要给出答案
3. 使用简体中文";
const REVIEW_MAX_TOKENS: u32 = 256;
const CLARIFY_MAX_TOKENS: u32 = 64;

/// Decides whether fused evidence is good enough to answer from.
#[derive(Clone)]
pub struct QualityGate {
	cfg: Arc<Config>,
	completion: Arc<dyn CompletionProvider>,
}
impl QualityGate {
	pub fn new(cfg: Arc<Config>, completion: Arc<dyn CompletionProvider>) -> Self {
		Self { cfg, completion }
	}

	/// One decision per turn. Model review runs only for weak evidence and falls back to the
	/// score heuristic when the verdict cannot be used.
	pub async fn evaluate(&self, query: &str, matches: &[RetrievalMatch]) -> CragDecision {
		let cfg = &self.cfg.retrieval.crag;

		if !cfg.enabled {
			return CragDecision::answer();
		}
		if matches.is_empty() {
			if crag::is_ambiguous(query) {
				return CragDecision::clarify(self.clarify_question(query).await);
			}

			return CragDecision::no_answer(self.no_result_message());
		}

		let min_score = f64::from(cfg.min_score);

		if cfg.use_llm
			&& crag::needs_review(matches, min_score)
			&& let Some(decision) = self.review(query, matches).await
		{
			return decision;
		}

		match crag::heuristic_action(matches, min_score) {
			CragAction::Answer => CragDecision::answer(),
			_ => CragDecision::refine(),
		}
	}

	/// A one-sentence clarifying question, or the built-in one when the model is off or
	/// silent.
	pub async fn clarify_question(&self, query: &str) -> String {
		let cfg = &self.cfg.retrieval.crag;

		if !cfg.use_llm {
			return DEFAULT_CLARIFY_QUESTION.to_string();
		}

		let prompt = cfg.clarify_prompt.as_deref().unwrap_or(DEFAULT_CLARIFY_PROMPT);
		let messages = crate::instruction(prompt, query);

		match self
			.completion
			.complete(&self.cfg.providers.llm, &messages, Some(CLARIFY_MAX_TOKENS))
			.await
		{
			Ok(output) if !output.trim().is_empty() => output.trim().to_string(),
			Ok(_) => DEFAULT_CLARIFY_QUESTION.to_string(),
			Err(err) => {
				tracing::warn!(error = %err, "Clarifying question generation failed.");

				DEFAULT_CLARIFY_QUESTION.to_string()
			},
		}
	}

	pub fn no_result_message(&self) -> String {
		self.cfg.prompt.no_result_text.clone()
	}

	async fn review(&self, query: &str, matches: &[RetrievalMatch]) -> Option<CragDecision> {
		let cfg = &self.cfg.retrieval.crag;
		let prompt = cfg.prompt.as_deref().unwrap_or(DEFAULT_REVIEW_PROMPT);
		let input = crag::build_review_input(query, matches, cfg.review_top_k as usize);
		let messages = crate::instruction(prompt, &input);
		let output = match self
			.completion
			.complete(&self.cfg.providers.llm, &messages, Some(REVIEW_MAX_TOKENS))
			.await
		{
			Ok(output) => output,
			Err(err) => {
				tracing::warn!(error = %err, "Evidence review failed, using the score heuristic.");

				return None;
			},
		};
		let Some(review) = crag::parse_review(&output) else {
			tracing::debug!("Evidence review verdict did not parse.");

			return None;
		};

		tracing::debug!(action = ?review.action, "Evidence review verdict.");

		let decision = match review.action {
			CragAction::Answer => CragDecision::answer(),
			CragAction::Refine => CragDecision::refine(),
			CragAction::Clarify => match review.clarify_question {
				Some(question) => CragDecision::clarify(question),
				None => CragDecision::clarify(self.clarify_question(query).await),
			},
			CragAction::NoAnswer => CragDecision::no_answer(self.no_result_message()),
		};

		Some(decision)
	}
}
