mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Conversation, Crag, EmbeddingProviderConfig, Eval, Feedback, Fusion, Hyde,
	LlmProviderConfig, Postgres, Prompt, Providers, Qdrant, Rerank, Retrieval, Rewrite, Routing,
	Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in
		[("embedding", &cfg.providers.embedding.api_key), ("llm", &cfg.providers.llm.api_key)]
	{
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.providers.llm.max_tokens == 0 {
		return Err(Error::Validation {
			message: "providers.llm.max_tokens must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.llm.temperature.is_finite() || cfg.providers.llm.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.providers.llm.top_p) {
		return Err(Error::Validation {
			message: "providers.llm.top_p must be in the range 0.0-1.0.".to_string(),
		});
	}

	let retrieval = &cfg.retrieval;

	if retrieval.rewrite.enabled && retrieval.rewrite.variants == 0 {
		return Err(Error::Validation {
			message: "retrieval.rewrite.variants must be greater than zero when enabled."
				.to_string(),
		});
	}
	if retrieval.hyde.enabled && retrieval.hyde.max_tokens == 0 {
		return Err(Error::Validation {
			message: "retrieval.hyde.max_tokens must be greater than zero when enabled."
				.to_string(),
		});
	}
	if retrieval.fusion.max_queries == 0 {
		return Err(Error::Validation {
			message: "retrieval.fusion.max_queries must be greater than zero.".to_string(),
		});
	}
	if retrieval.fusion.rrf_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.fusion.rrf_k must be greater than zero.".to_string(),
		});
	}
	if retrieval.rerank.max_candidates == 0 {
		return Err(Error::Validation {
			message: "retrieval.rerank.max_candidates must be greater than zero.".to_string(),
		});
	}
	if retrieval.rerank.snippet_chars == 0 {
		return Err(Error::Validation {
			message: "retrieval.rerank.snippet_chars must be greater than zero.".to_string(),
		});
	}
	if !retrieval.crag.min_score.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.crag.min_score must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&retrieval.crag.min_score) {
		return Err(Error::Validation {
			message: "retrieval.crag.min_score must be in the range 0.0-1.0.".to_string(),
		});
	}
	if retrieval.crag.fallback_multiplier == 0 {
		return Err(Error::Validation {
			message: "retrieval.crag.fallback_multiplier must be greater than zero.".to_string(),
		});
	}
	if !retrieval.feedback.max_boost.is_finite() {
		return Err(Error::Validation {
			message: "retrieval.feedback.max_boost must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&retrieval.feedback.max_boost) {
		return Err(Error::Validation {
			message: "retrieval.feedback.max_boost must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.conversation.answer_timeout_secs == 0 {
		return Err(Error::Validation {
			message: "conversation.answer_timeout_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.conversation.max_history == 0 {
		return Err(Error::Validation {
			message: "conversation.max_history must be greater than zero.".to_string(),
		});
	}
	if cfg.conversation.max_reference_chars == 0 {
		return Err(Error::Validation {
			message: "conversation.max_reference_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let retrieval = &mut cfg.retrieval;

	for value in [
		&mut retrieval.rewrite.prompt,
		&mut retrieval.hyde.prompt,
		&mut retrieval.rerank.prompt,
		&mut retrieval.routing.prompt,
		&mut retrieval.crag.prompt,
		&mut retrieval.crag.clarify_prompt,
		&mut cfg.prompt.rules,
		&mut cfg.eval.dataset,
	] {
		if value.as_deref().map(|text| text.trim().is_empty()).unwrap_or(false) {
			*value = None;
		}
	}
}
