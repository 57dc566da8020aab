use std::collections::HashMap;

use crate::{
	fusion,
	model::RetrievalMatch,
	text::{self, UNKNOWN_SOURCE},
};

/// Judge input: the question followed by one `index|source|snippet` line per candidate,
/// 1-based.
pub fn build_judge_input(query: &str, candidates: &[RetrievalMatch], snippet_chars: usize) -> String {
	let mut body = format!("问题：{query}\n候选片段：\n");

	for (idx, candidate) in candidates.iter().enumerate() {
		let snippet = text::truncate_chars(
			&text::collapse_whitespace(&candidate.text),
			snippet_chars,
			"...",
		);
		let source = candidate.source_name.as_deref().unwrap_or(UNKNOWN_SOURCE);

		body.push_str(&format!("{}|{source}|{snippet}\n", idx + 1));
	}

	body.push_str("请输出评分：\n");

	body
}

/// Reads `id:score` lines (ASCII or full-width colon). Scores are clamped to `[0, 1]`; lines
/// that do not parse are skipped.
pub fn parse_scores(output: &str) -> HashMap<usize, f64> {
	let mut scores = HashMap::new();

	for line in output.lines() {
		let trimmed = line.trim();

		if trimmed.is_empty() {
			continue;
		}

		let mut parts = trimmed.split([':', '：']);
		let (Some(id), Some(score)) = (parts.next(), parts.next()) else {
			continue;
		};
		let (Ok(id), Ok(score)) = (id.trim().parse::<usize>(), score.trim().parse::<f64>()) else {
			continue;
		};

		if score.is_nan() {
			continue;
		}

		scores.insert(id, score.clamp(0.0, 1.0));
	}

	scores
}

/// Applies judge scores to the first `candidate_count` matches and re-sorts them; the
/// unscored remainder follows in its original order with scores capped at the lowest judged
/// score. An empty score map returns the input unchanged.
pub fn apply_scores(
	mut matches: Vec<RetrievalMatch>,
	candidate_count: usize,
	scores: &HashMap<usize, f64>,
	top_k: usize,
) -> Vec<RetrievalMatch> {
	if scores.is_empty() {
		return matches;
	}

	let candidate_count = candidate_count.min(matches.len());
	let remainder = matches.split_off(candidate_count);
	let mut reranked = matches;

	for (idx, candidate) in reranked.iter_mut().enumerate() {
		if let Some(score) = scores.get(&(idx + 1)) {
			candidate.relevance_score = *score;
		}
	}

	fusion::sort_by_score(&mut reranked);

	let floor = reranked.last().map(|item| item.relevance_score);

	reranked.extend(remainder.into_iter().map(|mut item| {
		if let Some(floor) = floor {
			item.relevance_score = item.relevance_score.min(floor);
		}

		item
	}));
	reranked.truncate(top_k);

	reranked
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(document_id: &str, score: f64) -> RetrievalMatch {
		RetrievalMatch {
			document_id: document_id.to_string(),
			chunk_index: 0,
			text: format!("text of {document_id}"),
			relevance_score: score,
			source_name: None,
		}
	}

	#[test]
	fn parse_scores_skips_noise_and_clamps() {
		let scores = parse_scores("score list:\n1: 0.4\n2：1.7\nthree:0.2\n4:-1\n\n");

		assert_eq!(scores.len(), 3);
		assert_eq!(scores.get(&1), Some(&0.4));
		assert_eq!(scores.get(&2), Some(&1.0));
		assert_eq!(scores.get(&4), Some(&0.0));
	}

	#[test]
	fn unparsable_output_keeps_input_order() {
		let input = vec![item("a", 0.3), item("b", 0.2), item("c", 0.1)];
		let output = apply_scores(input.clone(), 2, &parse_scores("no scores here"), 2);

		assert_eq!(output, input);
	}

	#[test]
	fn scored_candidates_precede_unscored_remainder() {
		let input = vec![item("a", 0.03), item("b", 0.02), item("c", 0.01)];
		let scores = HashMap::from([(1, 0.2), (2, 0.9)]);
		let output = apply_scores(input, 2, &scores, 3);
		let order: Vec<_> = output.iter().map(|m| m.document_id.as_str()).collect();

		assert_eq!(order, vec!["b", "a", "c"]);
		assert_eq!(output[0].relevance_score, 0.9);
		assert_eq!(output[2].relevance_score, 0.01);
	}

	#[test]
	fn remainder_never_outranks_judged_candidates() {
		let input = vec![item("a", 0.5), item("b", 0.4), item("c", 0.3)];
		let scores = HashMap::from([(1, 0.1), (2, 0.0)]);
		let output = apply_scores(input, 2, &scores, 3);
		let order: Vec<_> = output.iter().map(|m| m.document_id.as_str()).collect();

		assert_eq!(order, vec!["a", "b", "c"]);
		assert!(output.windows(2).all(|pair| pair[0].relevance_score >= pair[1].relevance_score));
	}

	#[test]
	fn judge_input_lists_one_based_candidates() {
		let mut first = item("a", 0.5);

		first.text = "多行\n  文本".to_string();
		first.source_name = Some("奖学金办法.pdf".to_string());

		let body = build_judge_input("怎么申请", &[first, item("b", 0.4)], 200);

		assert!(body.starts_with("问题：怎么申请\n候选片段：\n"));
		assert!(body.contains("1|奖学金办法.pdf|多行 文本\n"));
		assert!(body.contains("2|未知来源|text of b\n"));
	}
}
