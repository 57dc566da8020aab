//! Keyword routing from a raw question to a [`MetadataFilter`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::model::MetadataFilter;

// Ordered: the first keyword found wins, so competition keywords sit ahead of the scholarship
// family a competition question often also mentions.
const DOC_TYPE_KEYWORDS: &[(&str, &str)] = &[
	("挑战杯", "竞赛奖励"),
	("竞赛", "竞赛奖励"),
	("综测", "综合测评"),
	("综合测评", "综合测评"),
	("评奖", "评奖评优"),
	("奖学金", "评奖评优"),
	("助学金", "评奖评优"),
	("请假", "请假审批"),
	("转专业", "转专业"),
	("学籍", "学籍管理"),
	("毕业", "毕业条件"),
	("课程", "课程修读"),
];
const DEPARTMENT_KEYWORDS: &[(&str, &str)] = &[
	("计算机学院", "计算机学院"),
	("自动化学院", "自动化学院"),
	("航空学院", "航空学院"),
	("电子信息工程学院", "电子信息工程学院"),
	("软件学院", "软件学院"),
	("材料学院", "材料学院"),
	("机械学院", "机械学院"),
	("经管学院", "经济管理学院"),
	("人文学院", "人文社会科学学院"),
	("数学学院", "数学科学学院"),
	("物理学院", "物理学院"),
];
const TAG_KEYWORDS: &[&str] = &["挑战杯", "竞赛"];

static YEAR_PATTERN: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(20\d{2})").expect("Year pattern must compile."));

/// Table-driven filter. Blank input yields the empty filter.
pub fn heuristic_filter(query: &str) -> MetadataFilter {
	let normalized = query.trim();
	let mut filter = MetadataFilter::default();

	if normalized.is_empty() {
		return filter;
	}

	filter.policy_year =
		YEAR_PATTERN.captures(normalized).map(|captures| captures[1].to_string());
	filter.doc_type = first_keyword(normalized, DOC_TYPE_KEYWORDS);
	filter.department = first_keyword(normalized, DEPARTMENT_KEYWORDS);
	filter.tags = TAG_KEYWORDS
		.iter()
		.filter(|keyword| normalized.contains(*keyword))
		.map(|keyword| keyword.to_string())
		.collect();

	filter
}

/// Field values extracted by the language model. Every field is optional and blank strings
/// count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFilter {
	#[serde(default)]
	department: Option<LenientText>,
	#[serde(default)]
	doc_type: Option<LenientText>,
	#[serde(default)]
	policy_year: Option<LenientText>,
	#[serde(default)]
	tags: Vec<LenientText>,
}
impl ExtractedFilter {
	pub fn into_filter(self) -> MetadataFilter {
		MetadataFilter {
			department: self.department.and_then(LenientText::into_text),
			doc_type: self.doc_type.and_then(LenientText::into_text),
			policy_year: self.policy_year.and_then(LenientText::into_text),
			tags: self.tags.into_iter().filter_map(LenientText::into_text).collect(),
		}
	}
}

/// Combines the table-driven filter with an extracted one. Table values win per field; tags
/// are the ordered union capped at `max_tags`.
pub fn merge_filters(base: MetadataFilter, extra: MetadataFilter, max_tags: usize) -> MetadataFilter {
	let mut tags: Vec<String> = Vec::new();

	for tag in base.normalized_tags().into_iter().chain(extra.normalized_tags()) {
		if !tags.iter().any(|known| known == tag) {
			tags.push(tag.to_string());
		}
	}

	tags.truncate(max_tags);

	MetadataFilter {
		department: select_first(base.department, extra.department),
		doc_type: select_first(base.doc_type, extra.doc_type),
		policy_year: select_first(base.policy_year, extra.policy_year),
		tags,
	}
}

fn first_keyword(text: &str, table: &[(&str, &str)]) -> Option<String> {
	table
		.iter()
		.find(|(keyword, _)| text.contains(keyword))
		.map(|(_, canonical)| canonical.to_string())
}

fn select_first(primary: Option<String>, secondary: Option<String>) -> Option<String> {
	primary
		.filter(|value| !value.trim().is_empty())
		.or_else(|| secondary.filter(|value| !value.trim().is_empty()))
}

/// A JSON string or number; models sometimes emit `"policyYear": 2024`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LenientText {
	Text(String),
	Integer(i64),
	Float(f64),
}
impl LenientText {
	fn into_text(self) -> Option<String> {
		let text = match self {
			Self::Text(text) => text,
			Self::Integer(value) => value.to_string(),
			Self::Float(value) => value.to_string(),
		};
		let trimmed = text.trim();

		if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn competition_question_routes_to_competition_doc_type() {
		let filter = heuristic_filter("挑战杯竞赛获奖后奖学金怎么申请");

		assert_eq!(filter.doc_type.as_deref(), Some("竞赛奖励"));
		assert_eq!(filter.tags, vec!["挑战杯".to_string(), "竞赛".to_string()]);
		assert_eq!(filter.department, None);
		assert_eq!(filter.policy_year, None);
	}

	#[test]
	fn year_and_department_aliases_are_extracted() {
		let filter = heuristic_filter("2024年经管学院奖学金评定");

		assert_eq!(filter.policy_year.as_deref(), Some("2024"));
		assert_eq!(filter.department.as_deref(), Some("经济管理学院"));
		assert_eq!(filter.doc_type.as_deref(), Some("评奖评优"));
		assert!(filter.tags.is_empty());
	}

	#[test]
	fn heuristic_values_win_on_merge() {
		let base = MetadataFilter {
			doc_type: Some("竞赛奖励".to_string()),
			tags: vec!["挑战杯".to_string()],
			..Default::default()
		};
		let extra = MetadataFilter {
			doc_type: Some("评奖评优".to_string()),
			department: Some("软件学院".to_string()),
			tags: vec!["挑战杯".to_string(), "创新".to_string(), "科研".to_string()],
			..Default::default()
		};
		let merged = merge_filters(base, extra, 2);

		assert_eq!(merged.doc_type.as_deref(), Some("竞赛奖励"));
		assert_eq!(merged.department.as_deref(), Some("软件学院"));
		assert_eq!(merged.tags, vec!["挑战杯".to_string(), "创新".to_string()]);
	}

	#[test]
	fn extracted_filter_tolerates_numbers_and_blanks() {
		let extracted: ExtractedFilter = serde_json::from_str(
			r#"{"department":"","docType":"学籍管理","policyYear":2023,"tags":[" ","学籍"]}"#,
		)
		.expect("Extraction payload must parse.");
		let filter = extracted.into_filter();

		assert_eq!(filter.department, None);
		assert_eq!(filter.doc_type.as_deref(), Some("学籍管理"));
		assert_eq!(filter.policy_year.as_deref(), Some("2023"));
		assert_eq!(filter.tags, vec!["学籍".to_string()]);
	}
}
