use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use unicode_segmentation::UnicodeSegmentation;

pub const UNKNOWN_SOURCE: &str = "未知来源";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
	format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const TAG_DELIMITERS: [char; 4] = [',', '，', ';', '；'];
const QUERY_PUNCTUATION: [char; 6] = ['，', '。', '！', '？', '；', '、'];
const SHORT_QUERY_CHARS: usize = 6;

/// Length in characters after trimming. CJK text counts one per ideograph.
pub fn char_len(text: &str) -> usize {
	text.trim().chars().count()
}

pub fn is_short_query(text: &str) -> bool {
	char_len(text) <= SHORT_QUERY_CHARS
}

/// Cuts `text` to at most `max_chars` characters and appends `marker` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
	match text.char_indices().nth(max_chars) {
		Some((byte_idx, _)) => format!("{}{marker}", &text[..byte_idx]),
		None => text.to_string(),
	}
}

pub fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replaces control whitespace and full-width sentence punctuation with spaces, then collapses
/// runs of whitespace.
pub fn normalize_query(text: &str) -> String {
	let replaced: String = text
		.chars()
		.map(|ch| {
			if matches!(ch, '\t' | '\n' | '\r') || QUERY_PUNCTUATION.contains(&ch) {
				' '
			} else {
				ch
			}
		})
		.collect();

	collapse_whitespace(&replaced)
}

pub fn split_tags(raw: &str) -> Vec<String> {
	raw.split(TAG_DELIMITERS)
		.map(|tag| tag.trim().to_lowercase())
		.filter(|tag| !tag.is_empty())
		.collect()
}

/// Lowercased UAX #29 words, deduplicated in first-seen order. Ideographs segment one per word.
pub fn lexical_terms(text: &str) -> Vec<String> {
	let mut terms: Vec<String> = Vec::new();

	for word in text.unicode_words() {
		let term = word.to_lowercase();

		if !terms.contains(&term) {
			terms.push(term);
		}
	}

	terms
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
	at.format(TIMESTAMP_FORMAT).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncate_counts_characters_not_bytes() {
		assert_eq!(truncate_chars("奖学金申请流程", 3, "…"), "奖学金…");
		assert_eq!(truncate_chars("short", 10, "…"), "short");
		assert_eq!(truncate_chars("exact", 5, "..."), "exact");
	}

	#[test]
	fn normalize_query_strips_full_width_punctuation() {
		assert_eq!(normalize_query("奖学金，怎么申请？\n 需要什么材料。"), "奖学金 怎么申请 需要什么材料");
		assert_eq!(normalize_query("plain query"), "plain query");
	}

	#[test]
	fn split_tags_handles_mixed_delimiters() {
		assert_eq!(split_tags("挑战杯，竞赛; Award ；"), vec!["挑战杯", "竞赛", "award"]);
	}

	#[test]
	fn lexical_terms_segment_ideographs() {
		assert_eq!(lexical_terms("奖学金 Policy policy"), vec!["奖", "学", "金", "policy"]);
	}

	#[test]
	fn short_query_threshold_is_six_characters() {
		assert!(is_short_query("  奖学金申请  "));
		assert!(!is_short_query("奖学金怎么申请呢"));
	}

	#[test]
	fn timestamp_has_second_precision() {
		let at = time::macros::datetime!(2024-09-01 08:30:05 UTC);

		assert_eq!(format_timestamp(at), "2024-09-01T08:30:05");
	}
}
