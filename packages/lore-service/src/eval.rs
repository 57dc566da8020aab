use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use lore_domain::{
	RetrievalMatch, eval, plan,
	prompt::{self, SystemPrompt},
};
use lore_providers::completion::ChatMessage;
use lore_storage::models::EvaluationResult;

use crate::{Error, LoreService, Result};

const EVAL_USER: &str = "eval";
const ANSWER_REFERENCE_ITEMS: usize = 5;
const ANSWER_REFERENCE_CHARS: usize = 280;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationItem {
	#[serde(default)]
	pub id: Option<String>,
	pub question: String,
	#[serde(default)]
	pub expected_answer: Option<String>,
	#[serde(default)]
	pub expected_keywords: Vec<String>,
	#[serde(default)]
	pub expected_sources: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationItemResult {
	pub item_id: Option<String>,
	pub question: String,
	pub hit: bool,
	pub similarity: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub answer: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
	/// Absent when the run could not be persisted.
	pub run_id: Option<i64>,
	pub total: usize,
	pub hit_rate: f64,
	pub avg_similarity: Option<f64>,
	pub results: Vec<EvaluationItemResult>,
}

/// Reads a JSON array of evaluation items.
pub fn load_dataset(path: &Path) -> Result<Vec<EvaluationItem>> {
	let raw = fs::read_to_string(path).map_err(|err| Error::InvalidRequest {
		message: format!("Failed to read dataset at {}: {err}.", path.display()),
	})?;

	serde_json::from_str(&raw).map_err(|err| Error::InvalidRequest {
		message: format!("Failed to parse dataset at {}: {err}.", path.display()),
	})
}

impl LoreService {
	/// Scores retrieval (and optionally answers) over a labelled dataset.
	///
	/// Items are processed sequentially. Retrieval, generation, and persistence failures are
	/// logged and count as misses or missing values; they never abort the run.
	pub async fn run_evaluation(
		&self,
		items: &[EvaluationItem],
		with_answer: bool,
	) -> Result<EvaluationReport> {
		if items.is_empty() {
			return Ok(EvaluationReport {
				run_id: None,
				total: 0,
				hit_rate: 0.0,
				avg_similarity: None,
				results: Vec::new(),
			});
		}

		let evaluations = &self.backends.evaluations;
		let run_id = match evaluations.start_run().await {
			Ok(run_id) => Some(run_id),
			Err(err) => {
				tracing::warn!(error = %err, "Evaluation run was not persisted.");

				None
			},
		};
		let mut results = Vec::with_capacity(items.len());
		let mut hits = 0_usize;
		let mut similarities = Vec::new();

		for item in items {
			let matches = self.evaluation_matches(&item.question).await;
			let hit = eval::is_hit(&matches, &item.expected_keywords, &item.expected_sources);
			let answer = if with_answer {
				Some(self.evaluation_answer(&item.question, &matches).await)
			} else {
				None
			};
			let expected = item
				.expected_answer
				.as_deref()
				.map(str::trim)
				.filter(|expected| !expected.is_empty());
			let similarity = match (expected, answer.as_deref()) {
				(Some(expected), Some(actual)) => self.answer_similarity(expected, actual).await,
				_ => None,
			};

			if hit {
				hits += 1;
			}
			if let Some(similarity) = similarity {
				similarities.push(similarity);
			}
			if let Some(run_id) = run_id {
				let record = EvaluationResult {
					item_id: item.id.clone(),
					question: item.question.clone(),
					expected_answer: item.expected_answer.clone(),
					actual_answer: answer.clone(),
					hit,
					similarity,
				};

				if let Err(err) = evaluations.record_result(run_id, &record).await {
					tracing::warn!(error = %err, run_id, "Evaluation result was not persisted.");
				}
			}

			tracing::debug!(item_id = ?item.id, hit, similarity, "Evaluated item.");

			results.push(EvaluationItemResult {
				item_id: item.id.clone(),
				question: item.question.clone(),
				hit,
				similarity,
				answer,
			});
		}

		let total = items.len();
		let hit_rate = hits as f64 / total as f64;
		let avg_similarity = if similarities.is_empty() {
			None
		} else {
			Some(similarities.iter().sum::<f64>() / similarities.len() as f64)
		};

		if let Some(run_id) = run_id
			&& let Err(err) = evaluations.finish_run(run_id, total, hit_rate, avg_similarity).await
		{
			tracing::warn!(error = %err, run_id, "Evaluation run totals were not persisted.");
		}

		tracing::info!(total, hits, hit_rate, "Evaluation run finished.");

		Ok(EvaluationReport { run_id, total, hit_rate, avg_similarity, results })
	}

	async fn evaluation_matches(&self, question: &str) -> Vec<RetrievalMatch> {
		let top_k = plan::adaptive_top_k(question);
		let (filter, query_plan) = futures::join!(
			self.analyzer.resolve_filter(question),
			self.analyzer.create_plan(question),
		);

		match self.fusion.retrieve(&query_plan, top_k, EVAL_USER, &filter).await {
			Ok(fused) => self.reranker.rerank(question, fused, top_k).await,
			Err(err) => {
				tracing::warn!(error = %err, "Evaluation retrieval failed, counting a miss.");

				Vec::new()
			},
		}
	}

	async fn evaluation_answer(&self, question: &str, matches: &[RetrievalMatch]) -> String {
		let cfg = &self.cfg.prompt;
		let reference =
			prompt::reference_block(matches, ANSWER_REFERENCE_ITEMS, ANSWER_REFERENCE_CHARS);
		let system = SystemPrompt {
			rules: cfg.rules.as_deref(),
			ref_start: &cfg.ref_start,
			ref_end: &cfg.ref_end,
			no_result_text: &cfg.no_result_text,
		}
		.render(&reference);
		let messages = [ChatMessage::system(system), ChatMessage::user(question)];

		match self.providers.completion.complete(&self.cfg.providers.llm, &messages, None).await {
			Ok(answer) => answer.trim().to_string(),
			Err(err) => {
				tracing::warn!(error = %err, "Evaluation answer generation failed.");

				String::new()
			},
		}
	}

	async fn answer_similarity(&self, expected: &str, actual: &str) -> Option<f64> {
		if actual.trim().is_empty() {
			return None;
		}

		let texts = [expected.to_string(), actual.to_string()];

		match self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await {
			Ok(vectors) => match vectors.as_slice() {
				[expected, actual] => eval::cosine_similarity(expected, actual),
				_ => None,
			},
			Err(err) => {
				tracing::warn!(error = %err, "Answer similarity embedding failed.");

				None
			},
		}
	}
}
