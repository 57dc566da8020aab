use crate::{
	model::RetrievalMatch,
	text::{self, UNKNOWN_SOURCE},
};

/// Numbered `[i] (source) snippet` lines, one per match, limited to `max_items`.
pub fn reference_block(matches: &[RetrievalMatch], max_items: usize, max_chars: usize) -> String {
	let mut block = String::new();

	for (idx, item) in matches.iter().take(max_items).enumerate() {
		let source = item.source_name.as_deref().unwrap_or(UNKNOWN_SOURCE);
		let snippet = text::truncate_chars(&item.text, max_chars, "…");

		block.push_str(&format!("[{}] ({source}) {snippet}\n", idx + 1));
	}

	block
}

pub struct SystemPrompt<'a> {
	pub rules: Option<&'a str>,
	pub ref_start: &'a str,
	pub ref_end: &'a str,
	pub no_result_text: &'a str,
}
impl SystemPrompt<'_> {
	/// Rules, then the reference block between the markers, or the no-result text when empty.
	pub fn render(&self, reference: &str) -> String {
		let mut prompt = String::new();

		if let Some(rules) = self.rules.filter(|rules| !rules.is_empty()) {
			prompt.push_str(rules);
			prompt.push_str("\n\n");
		}

		prompt.push_str(self.ref_start);
		prompt.push('\n');

		if reference.is_empty() {
			prompt.push_str(self.no_result_text);
			prompt.push('\n');
		} else {
			prompt.push_str(reference);
		}

		prompt.push_str(self.ref_end);

		prompt
	}
}
