use std::collections::HashMap;

use crate::{fusion, model::RetrievalMatch};

const NEUTRAL_RATING: f64 = 3.0;
const RATING_HALF_SPAN: f64 = 2.0;

/// Maps an average 1-5 rating to a multiplier offset in `[-max_boost, max_boost]`, centered
/// at 3.
pub fn boost_for_rating(average: f64, max_boost: f64) -> f64 {
	let centered = (average - NEUTRAL_RATING) / RATING_HALF_SPAN;

	(centered * max_boost).clamp(-max_boost, max_boost)
}

pub fn boost_map(averages: &HashMap<String, f64>, max_boost: f64) -> HashMap<String, f64> {
	averages
		.iter()
		.filter(|(_, average)| average.is_finite())
		.map(|(document_id, average)| (document_id.clone(), boost_for_rating(*average, max_boost)))
		.collect()
}

/// Multiplies each score by `1 + boost` and restores descending order. An empty map leaves
/// the list untouched.
pub fn apply_boosts(matches: &mut [RetrievalMatch], boosts: &HashMap<String, f64>) {
	if boosts.is_empty() {
		return;
	}

	for item in matches.iter_mut() {
		let boost = boosts.get(&item.document_id).copied().unwrap_or(0.0);

		item.relevance_score *= 1.0 + boost;
	}

	fusion::sort_by_score(matches);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ratings_map_to_bounded_boosts() {
		assert!((boost_for_rating(5.0, 0.15) - 0.15).abs() < 1e-12);
		assert!((boost_for_rating(1.0, 0.15) + 0.15).abs() < 1e-12);
		assert!(boost_for_rating(3.0, 0.15).abs() < 1e-12);
		assert!((boost_for_rating(4.0, 0.15) - 0.075).abs() < 1e-12);
	}

	#[test]
	fn boosts_reorder_matches() {
		let mut matches = vec![
			RetrievalMatch {
				document_id: "low".to_string(),
				chunk_index: 0,
				text: String::new(),
				relevance_score: 1.0,
				source_name: None,
			},
			RetrievalMatch {
				document_id: "high".to_string(),
				chunk_index: 0,
				text: String::new(),
				relevance_score: 0.9,
				source_name: None,
			},
		];
		let averages = HashMap::from([("low".to_string(), 1.0), ("high".to_string(), 5.0)]);

		apply_boosts(&mut matches, &boost_map(&averages, 0.15));

		assert_eq!(matches[0].document_id, "high");
		assert!((matches[0].relevance_score - 0.9 * 1.15).abs() < 1e-12);
		assert!((matches[1].relevance_score - 0.85).abs() < 1e-12);
	}
}
