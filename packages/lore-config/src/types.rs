use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub prompt: Prompt,
	#[serde(default)]
	pub conversation: Conversation,
	#[serde(default)]
	pub eval: Eval,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	#[serde(default = "default_top_p")]
	pub top_p: f32,
	/// Token ceiling for the final answer. Analysis sub-calls pass their own limit.
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub rewrite: Rewrite,
	pub hyde: Hyde,
	pub fusion: Fusion,
	pub rerank: Rerank,
	pub routing: Routing,
	pub crag: Crag,
	pub feedback: Feedback,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rewrite {
	pub enabled: bool,
	pub variants: u32,
	pub prompt: Option<String>,
}
impl Default for Rewrite {
	fn default() -> Self {
		Self { enabled: true, variants: 3, prompt: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hyde {
	pub enabled: bool,
	pub max_tokens: u32,
	pub prompt: Option<String>,
}
impl Default for Hyde {
	fn default() -> Self {
		Self { enabled: false, max_tokens: 256, prompt: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Fusion {
	pub enabled: bool,
	pub rrf_k: u32,
	/// Upper bound on retrieval calls per turn, the original query included.
	pub max_queries: u32,
}
impl Default for Fusion {
	fn default() -> Self {
		Self { enabled: true, rrf_k: 60, max_queries: 4 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rerank {
	pub enabled: bool,
	pub max_candidates: u32,
	pub snippet_chars: u32,
	pub prompt: Option<String>,
}
impl Default for Rerank {
	fn default() -> Self {
		Self { enabled: true, max_candidates: 8, snippet_chars: 200, prompt: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Routing {
	pub enabled: bool,
	pub use_llm: bool,
	pub max_tags: u32,
	pub prompt: Option<String>,
}
impl Default for Routing {
	fn default() -> Self {
		Self { enabled: true, use_llm: false, max_tags: 4, prompt: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Crag {
	pub enabled: bool,
	pub use_llm: bool,
	pub min_score: f32,
	pub review_top_k: u32,
	pub fallback_multiplier: u32,
	pub prompt: Option<String>,
	pub clarify_prompt: Option<String>,
}
impl Default for Crag {
	fn default() -> Self {
		Self {
			enabled: true,
			use_llm: true,
			min_score: 0.2,
			review_top_k: 3,
			fallback_multiplier: 2,
			prompt: None,
			clarify_prompt: None,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Feedback {
	pub enabled: bool,
	pub max_boost: f32,
}
impl Default for Feedback {
	fn default() -> Self {
		Self { enabled: true, max_boost: 0.15 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Prompt {
	pub rules: Option<String>,
	pub ref_start: String,
	pub ref_end: String,
	pub no_result_text: String,
}
impl Default for Prompt {
	fn default() -> Self {
		Self {
			rules: None,
			ref_start: "<<参考资料开始>>".to_string(),
			ref_end: "<<参考资料结束>>".to_string(),
			no_result_text: "暂无相关信息".to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Conversation {
	pub answer_timeout_secs: u64,
	pub max_history: u32,
	pub max_reference_chars: u32,
}
impl Default for Conversation {
	fn default() -> Self {
		Self { answer_timeout_secs: 120, max_history: 20, max_reference_chars: 300 }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Eval {
	pub dataset: Option<String>,
	pub with_answer: bool,
}

fn default_temperature() -> f32 {
	0.3
}

fn default_top_p() -> f32 {
	0.9
}

fn default_max_tokens() -> u32 {
	2_000
}
