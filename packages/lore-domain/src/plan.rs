use std::sync::LazyLock;

use regex::Regex;

use crate::{model::RetrievalMatch, text};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 10;
/// Retrieval results whose top score falls under this floor get one normalized requery.
pub const MIN_ACCEPTABLE_SCORE: f64 = 0.25;
pub const MAX_RECALL_SIZE: usize = 300;

const SHORT_RECALL_FACTOR: usize = 50;
const LONG_RECALL_FACTOR: usize = 30;
const MULTI_INTENT_HINTS: &[&str] = &["以及", "和", "、"];

static LIST_MARKER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[-*\d.、)]+").expect("List marker pattern must compile."));

/// Base 5, +3 above 40 characters or +1 above 20, +2 for multi-intent connectors, capped.
pub fn adaptive_top_k(query: &str) -> usize {
	let length = text::char_len(query);

	if length == 0 {
		return DEFAULT_TOP_K;
	}

	let mut top_k = DEFAULT_TOP_K;

	if length > 40 {
		top_k += 3;
	} else if length > 20 {
		top_k += 1;
	}
	if MULTI_INTENT_HINTS.iter().any(|hint| query.contains(hint)) {
		top_k += 2;
	}

	top_k.min(MAX_TOP_K)
}

/// Candidate pool for the vector stage: wider for short queries, never above 300.
pub fn recall_size(query: &str, top_k: usize) -> usize {
	let factor = if text::is_short_query(query) { SHORT_RECALL_FACTOR } else { LONG_RECALL_FACTOR };

	top_k.saturating_mul(factor).min(MAX_RECALL_SIZE)
}

/// Number of rewrites that fit next to the original query and, when enabled, the HyDE probe.
pub fn rewrite_budget(max_queries: usize, hyde_enabled: bool) -> usize {
	let remaining = max_queries.saturating_sub(1);

	if hyde_enabled { remaining.saturating_sub(1) } else { remaining }
}

pub fn is_low_quality(matches: &[RetrievalMatch], floor: f64) -> bool {
	matches.first().map(|item| item.relevance_score < floor).unwrap_or(true)
}

/// One rewrite per line with list markers stripped, deduplicated in order, capped at `limit`.
pub fn normalize_rewrites(output: &str, limit: usize) -> Vec<String> {
	let mut rewrites: Vec<String> = Vec::new();

	for line in output.lines() {
		let cleaned = LIST_MARKER.replace(line, "");
		let cleaned = cleaned.trim();

		if cleaned.is_empty() || rewrites.iter().any(|known| known == cleaned) {
			continue;
		}

		rewrites.push(cleaned.to_string());
	}

	if limit > 0 {
		rewrites.truncate(limit);
	}

	rewrites
}
