use std::sync::Arc;

use lore_config::Config;
use lore_domain::{
	MetadataFilter, QueryPlan, crag, plan,
	routing::{self, ExtractedFilter},
};

use crate::{CompletionProvider, Result};

const DEFAULT_REWRITE_PROMPT: &str = "\
你是检索查询改写助手，请根据用户问题生成多条可用于检索的改写：
1. 每行只输出一条改写
2. 不要编号或引号
3. 保持简洁，避免增加新事实";
const DEFAULT_HYDE_PROMPT: &str = "\
请根据用户问题生成一个可能的理想答案，用于检索。
要求：
1. 使用简体中文
2. 80-150字
3. 不要编造具体数值或机构名称";
const DEFAULT_ROUTING_PROMPT: &str = r#"你是检索路由助手，请从用户问题中抽取可能的元数据过滤条件。
只输出 JSON，字段如下：
{
  "department": "学院或部门",
  "docType": "文档类型",
  "policyYear": "年份",
  "tags": ["标签1","标签2"]
}
若无法确定请输出空字符串或空数组，不要输出解释。"#;
const ANALYSIS_MAX_TOKENS: u32 = 256;

/// Expands a user query into retrieval variants and a metadata filter.
#[derive(Clone)]
pub struct QueryAnalyzer {
	cfg: Arc<Config>,
	completion: Arc<dyn CompletionProvider>,
}
impl QueryAnalyzer {
	pub fn new(cfg: Arc<Config>, completion: Arc<dyn CompletionProvider>) -> Self {
		Self { cfg, completion }
	}

	/// Never fails: a sub-step whose provider call fails leaves its field empty.
	pub async fn create_plan(&self, query: &str) -> QueryPlan {
		let (rewritten_queries, hyde_answer) =
			futures::join!(self.rewrites(query), self.hyde_answer(query));

		QueryPlan { original_query: query.to_string(), rewritten_queries, hyde_answer }
	}

	/// Keyword heuristics, merged with a model extraction when enabled. Heuristic values win.
	pub async fn resolve_filter(&self, query: &str) -> MetadataFilter {
		let heuristic = routing::heuristic_filter(query);
		let cfg = &self.cfg.retrieval.routing;

		if !cfg.enabled || !cfg.use_llm {
			return heuristic;
		}

		let prompt = cfg.prompt.as_deref().unwrap_or(DEFAULT_ROUTING_PROMPT);
		let extracted = match self.ask(prompt, query, ANALYSIS_MAX_TOKENS).await {
			Ok(output) => parse_extracted_filter(&output),
			Err(err) => {
				tracing::warn!(error = %err, "Routing extraction failed.");

				MetadataFilter::default()
			},
		};

		routing::merge_filters(heuristic, extracted, cfg.max_tags as usize)
	}

	async fn rewrites(&self, query: &str) -> Vec<String> {
		let cfg = &self.cfg.retrieval.rewrite;

		if !cfg.enabled {
			return Vec::new();
		}

		let prompt = cfg.prompt.as_deref().unwrap_or(DEFAULT_REWRITE_PROMPT);

		match self.ask(prompt, query, ANALYSIS_MAX_TOKENS).await {
			Ok(output) => plan::normalize_rewrites(&output, cfg.variants as usize),
			Err(err) => {
				tracing::warn!(error = %err, "Query rewrite failed.");

				Vec::new()
			},
		}
	}

	async fn hyde_answer(&self, query: &str) -> Option<String> {
		let cfg = &self.cfg.retrieval.hyde;

		if !cfg.enabled {
			return None;
		}

		let prompt = cfg.prompt.as_deref().unwrap_or(DEFAULT_HYDE_PROMPT);

		match self.ask(prompt, query, cfg.max_tokens).await {
			Ok(output) => Some(output.trim().to_string()).filter(|answer| !answer.is_empty()),
			Err(err) => {
				tracing::warn!(error = %err, "Hypothetical answer generation failed.");

				None
			},
		}
	}

	async fn ask(&self, system: &str, input: &str, max_tokens: u32) -> Result<String> {
		let messages = crate::instruction(system, input);

		self.completion.complete(&self.cfg.providers.llm, &messages, Some(max_tokens)).await
	}
}

fn parse_extracted_filter(output: &str) -> MetadataFilter {
	match serde_json::from_str::<ExtractedFilter>(crag::strip_code_fence(output.trim())) {
		Ok(extracted) => extracted.into_filter(),
		Err(err) => {
			tracing::debug!(error = %err, "Routing output is not a filter object.");

			MetadataFilter::default()
		},
	}
}
