use std::collections::HashMap;

use crate::model::RetrievalMatch;

/// Stable descending sort; equal scores keep their incoming order.
pub fn sort_by_score(matches: &mut [RetrievalMatch]) {
	matches.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
}

/// Reciprocal Rank Fusion over ranked lists.
///
/// Each appearance at 0-based rank `i` contributes `1 / (rrf_k + i + 1)` to its
/// `(document_id, chunk_index)` key. The first-seen match carries the summed score; later
/// duplicates only add to it.
pub fn reciprocal_rank_fusion(
	lists: &[Vec<RetrievalMatch>],
	rrf_k: u32,
	top_k: usize,
) -> Vec<RetrievalMatch> {
	let mut fused: Vec<RetrievalMatch> = Vec::new();
	let mut slots: HashMap<(String, i32), usize> = HashMap::new();

	for list in lists {
		for (rank, item) in list.iter().enumerate() {
			let contribution = 1.0 / (f64::from(rrf_k) + rank as f64 + 1.0);
			let key = (item.document_id.clone(), item.chunk_index);

			match slots.get(&key) {
				Some(&slot) => fused[slot].relevance_score += contribution,
				None => {
					slots.insert(key, fused.len());

					let mut first = item.clone();

					first.relevance_score = contribution;

					fused.push(first);
				},
			}
		}
	}

	sort_by_score(&mut fused);
	fused.truncate(top_k);

	fused
}

#[cfg(test)]
mod tests {
	use super::*;

	fn item(document_id: &str, chunk_index: i32, text: &str) -> RetrievalMatch {
		RetrievalMatch {
			document_id: document_id.to_string(),
			chunk_index,
			text: text.to_string(),
			relevance_score: 0.5,
			source_name: None,
		}
	}

	#[test]
	fn fused_score_sums_reciprocal_ranks() {
		let first = vec![item("a", 1, "a1"), item("b", 1, "b1")];
		let second = vec![item("b", 1, "b1 later"), item("c", 1, "c1")];
		let fused = reciprocal_rank_fusion(&[first, second], 60, 10);
		let score_of = |id: &str| {
			fused.iter().find(|m| m.document_id == id).map(|m| m.relevance_score).unwrap_or(-1.0)
		};

		assert!((score_of("a") - 1.0 / 61.0).abs() < 1e-12);
		assert!((score_of("b") - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
		assert!((score_of("c") - 1.0 / 62.0).abs() < 1e-12);
		assert_eq!(fused[0].document_id, "b");
		assert_eq!(fused[0].text, "b1");
	}

	#[test]
	fn fusing_a_list_with_itself_doubles_without_duplicates() {
		let list = vec![item("a", 1, "a1"), item("a", 2, "a2")];
		let once = reciprocal_rank_fusion(std::slice::from_ref(&list), 60, 10);
		let twice = reciprocal_rank_fusion(&[list.clone(), list], 60, 10);

		assert_eq!(twice.len(), once.len());

		for (single, double) in once.iter().zip(&twice) {
			assert_eq!(single.key(), double.key());
			assert!((double.relevance_score - 2.0 * single.relevance_score).abs() < 1e-12);
		}
	}

	#[test]
	fn fusion_keeps_every_key_until_truncation() {
		let lists = vec![vec![item("a", 1, "")], vec![item("b", 1, "")], vec![item("c", 1, "")]];

		assert_eq!(reciprocal_rank_fusion(&lists, 60, 10).len(), 3);
		assert_eq!(reciprocal_rank_fusion(&lists, 60, 2).len(), 2);
	}
}
