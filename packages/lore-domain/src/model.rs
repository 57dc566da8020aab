use serde::{Deserialize, Serialize};

use crate::text;

pub const ANONYMOUS_USER: &str = "anonymous";

/// One retrieved passage.
///
/// Only `relevance_score` changes after creation: it is engine-native out of the index,
/// RRF-derived after fusion, judge-derived after reranking, and boost-adjusted after feedback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalMatch {
	pub document_id: String,
	pub chunk_index: i32,
	pub text: String,
	pub relevance_score: f64,
	pub source_name: Option<String>,
}
impl RetrievalMatch {
	pub fn key(&self) -> (&str, i32) {
		(self.document_id.as_str(), self.chunk_index)
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
	pub original_query: String,
	pub rewritten_queries: Vec<String>,
	pub hyde_answer: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
	#[serde(default)]
	pub department: Option<String>,
	#[serde(default)]
	pub doc_type: Option<String>,
	#[serde(default)]
	pub policy_year: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
}
impl MetadataFilter {
	pub fn is_empty(&self) -> bool {
		is_blank(self.department.as_deref())
			&& is_blank(self.doc_type.as_deref())
			&& is_blank(self.policy_year.as_deref())
			&& self.normalized_tags().is_empty()
	}

	/// Trimmed, non-empty tags in their original order.
	pub fn normalized_tags(&self) -> Vec<&str> {
		self.tags.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty()).collect()
	}

	/// Case-insensitive containment on every set field; when tags are set the document must
	/// carry at least one tag containing one of them.
	pub fn matches(&self, document: &DocumentMeta) -> bool {
		if self.is_empty() {
			return true;
		}
		if !field_matches(document.department.as_deref(), self.department.as_deref()) {
			return false;
		}
		if !field_matches(document.doc_type.as_deref(), self.doc_type.as_deref()) {
			return false;
		}
		if !field_matches(document.policy_year.as_deref(), self.policy_year.as_deref()) {
			return false;
		}

		let wanted = self.normalized_tags();

		if wanted.is_empty() {
			return true;
		}

		let carried = document.normalized_tags();

		if carried.is_empty() {
			return false;
		}

		wanted.iter().any(|tag| {
			let needle = tag.to_lowercase();

			carried.iter().any(|token| token.contains(&needle))
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CragAction {
	Answer,
	Refine,
	Clarify,
	NoAnswer,
}
impl CragAction {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_uppercase().as_str() {
			"ANSWER" => Some(Self::Answer),
			"REFINE" => Some(Self::Refine),
			"CLARIFY" => Some(Self::Clarify),
			"NO_ANSWER" => Some(Self::NoAnswer),
			_ => None,
		}
	}

	pub fn short_circuits(self) -> bool {
		matches!(self, Self::Clarify | Self::NoAnswer)
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CragDecision {
	pub action: CragAction,
	pub message: Option<String>,
}
impl CragDecision {
	pub fn answer() -> Self {
		Self { action: CragAction::Answer, message: None }
	}

	pub fn refine() -> Self {
		Self { action: CragAction::Refine, message: None }
	}

	pub fn clarify(question: impl Into<String>) -> Self {
		Self { action: CragAction::Clarify, message: Some(question.into()) }
	}

	pub fn no_answer(message: impl Into<String>) -> Self {
		Self { action: CragAction::NoAnswer, message: Some(message.into()) }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
	Public,
	Private,
}
impl Visibility {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Public => "PUBLIC",
			Self::Private => "PRIVATE",
		}
	}
}

/// Metadata of an ingested document. Content never flows through this type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
	pub document_id: String,
	pub source_name: Option<String>,
	pub owner_id: Option<String>,
	pub visibility: String,
	pub doc_type: Option<String>,
	pub department: Option<String>,
	pub policy_year: Option<String>,
	pub tags: Vec<String>,
}
impl DocumentMeta {
	/// Lowercased tag tokens; a stored tag may itself hold a delimited list.
	pub fn normalized_tags(&self) -> Vec<String> {
		self.tags.iter().flat_map(|raw| text::split_tags(raw)).collect()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}
impl Role {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"user" => Some(Self::User),
			"assistant" => Some(Self::Assistant),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
	pub role: Role,
	pub content: String,
	pub timestamp: String,
}

fn is_blank(value: Option<&str>) -> bool {
	value.map(|text| text.trim().is_empty()).unwrap_or(true)
}

fn field_matches(value: Option<&str>, expected: Option<&str>) -> bool {
	let Some(expected) = expected.map(str::trim).filter(|text| !text.is_empty()) else {
		return true;
	};
	let Some(value) = value.map(str::trim).filter(|text| !text.is_empty()) else {
		return false;
	};

	value.to_lowercase().contains(&expected.to_lowercase())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn document(tags: &[&str]) -> DocumentMeta {
		DocumentMeta {
			document_id: "d1".to_string(),
			visibility: "PUBLIC".to_string(),
			doc_type: Some("竞赛奖励办法".to_string()),
			department: Some("计算机学院".to_string()),
			policy_year: Some("2024".to_string()),
			tags: tags.iter().map(|tag| tag.to_string()).collect(),
			..Default::default()
		}
	}

	#[test]
	fn empty_filter_matches_everything() {
		assert!(MetadataFilter::default().matches(&document(&[])));
	}

	#[test]
	fn field_match_is_case_insensitive_containment() {
		let filter = MetadataFilter { doc_type: Some(" 竞赛奖励 ".to_string()), ..Default::default() };

		assert!(filter.matches(&document(&[])));

		let filter = MetadataFilter { policy_year: Some("2023".to_string()), ..Default::default() };

		assert!(!filter.matches(&document(&[])));
	}

	#[test]
	fn tag_filter_requires_document_tags() {
		let filter = MetadataFilter { tags: vec!["挑战杯".to_string()], ..Default::default() };

		assert!(!filter.matches(&document(&[])));
		assert!(filter.matches(&document(&["科创，挑战杯"])));
		assert!(!filter.matches(&document(&["奖学金"])));
	}

	#[test]
	fn crag_action_parses_case_insensitively() {
		assert_eq!(CragAction::parse("no_answer"), Some(CragAction::NoAnswer));
		assert_eq!(CragAction::parse(" Refine "), Some(CragAction::Refine));
		assert_eq!(CragAction::parse("maybe"), None);
	}
}
