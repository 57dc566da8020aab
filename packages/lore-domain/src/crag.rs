use serde::Deserialize;

use crate::{
	model::{CragAction, RetrievalMatch},
	text,
};

pub const DEFAULT_CLARIFY_QUESTION: &str =
	"为了更准确回答，请补充问题的具体场景，例如涉及哪一年、学院或制度名称。";

const AMBIGUOUS_MAX_CHARS: usize = 6;
const VAGUE_MARKERS: &[&str] = &["这个", "那个", "之前", "上面", "怎么弄", "怎么办"];
const REVIEW_SNIPPET_CHARS: usize = 240;
const REVIEW_TRIGGER_FACTOR: f64 = 1.5;

/// Short questions and questions leaning on deictic or vague markers.
pub fn is_ambiguous(query: &str) -> bool {
	let trimmed = query.trim();

	text::char_len(trimmed) < AMBIGUOUS_MAX_CHARS
		|| VAGUE_MARKERS.iter().any(|marker| trimmed.contains(marker))
}

pub fn top_score(matches: &[RetrievalMatch]) -> Option<f64> {
	matches.first().map(|item| item.relevance_score)
}

pub fn needs_review(matches: &[RetrievalMatch], min_score: f64) -> bool {
	top_score(matches).map(|score| score < min_score * REVIEW_TRIGGER_FACTOR).unwrap_or(true)
}

pub fn heuristic_action(matches: &[RetrievalMatch], min_score: f64) -> CragAction {
	match top_score(matches) {
		Some(score) if score >= min_score => CragAction::Answer,
		_ => CragAction::Refine,
	}
}

pub fn build_review_input(query: &str, matches: &[RetrievalMatch], review_top_k: usize) -> String {
	let mut body = format!("问题：{query}\n候选片段：\n");

	for (idx, item) in matches.iter().take(review_top_k).enumerate() {
		body.push_str(&format!(
			"{}|{}\n",
			idx + 1,
			text::truncate_chars(&item.text, REVIEW_SNIPPET_CHARS, "...")
		));
	}

	body
}

#[derive(Debug, PartialEq, Eq)]
pub struct Review {
	pub action: CragAction,
	pub clarify_question: Option<String>,
}

/// Parses the judge's JSON verdict. `None` means the verdict is unusable and the heuristic
/// decides.
pub fn parse_review(output: &str) -> Option<Review> {
	#[derive(Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct Raw {
		#[serde(default)]
		action: String,
		#[serde(default)]
		clarify_question: Option<String>,
	}

	let raw: Raw = serde_json::from_str(strip_code_fence(output.trim())).ok()?;
	let action = CragAction::parse(&raw.action)?;
	let clarify_question = raw
		.clarify_question
		.map(|question| question.trim().to_string())
		.filter(|question| !question.is_empty());

	Some(Review { action, clarify_question })
}

/// Models often wrap JSON in a Markdown fence.
pub fn strip_code_fence(output: &str) -> &str {
	let Some(inner) = output.strip_prefix("```") else {
		return output;
	};
	let inner = inner.strip_prefix("json").unwrap_or(inner);

	inner.strip_suffix("```").unwrap_or(inner).trim()
}
