use crate::model::RetrievalMatch;

/// True when any match's text contains an expected keyword or its source name contains an
/// expected source, both compared lowercased.
pub fn is_hit(matches: &[RetrievalMatch], keywords: &[String], sources: &[String]) -> bool {
	let keywords = lowered_needles(keywords);
	let sources = lowered_needles(sources);

	matches.iter().any(|item| {
		let text = item.text.to_lowercase();
		let source = item.source_name.as_deref().unwrap_or_default().to_lowercase();

		keywords.iter().any(|keyword| text.contains(keyword))
			|| sources.iter().any(|expected| source.contains(expected))
	})
}

/// `None` when the vectors differ in length or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
	if a.is_empty() || a.len() != b.len() {
		return None;
	}

	let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return None;
	}

	Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn lowered_needles(values: &[String]) -> Vec<String> {
	values
		.iter()
		.map(|value| value.trim().to_lowercase())
		.filter(|value| !value.is_empty())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hit_matches_keywords_or_sources() {
		let matches = vec![RetrievalMatch {
			document_id: "d".to_string(),
			chunk_index: 0,
			text: "申请国家奖学金需提交 GPA 证明".to_string(),
			relevance_score: 1.0,
			source_name: Some("Scholarship-2024.pdf".to_string()),
		}];

		assert!(is_hit(&matches, &["gpa".to_string()], &[]));
		assert!(is_hit(&matches, &[], &["scholarship".to_string()]));
		assert!(!is_hit(&matches, &[" ".to_string()], &["请假".to_string()]));
		assert!(!is_hit(&[], &["gpa".to_string()], &[]));
	}

	#[test]
	fn cosine_similarity_handles_degenerate_vectors() {
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
	}
}
