pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_documents.sql")),
				"tables/002_conversation_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_conversation_messages.sql")),
				"tables/003_conversation_message_sources.sql" => out.push_str(include_str!(
					"../../../sql/tables/003_conversation_message_sources.sql"
				)),
				"tables/004_conversation_message_feedback.sql" => out.push_str(include_str!(
					"../../../sql/tables/004_conversation_message_feedback.sql"
				)),
				"tables/005_evaluation_runs.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_evaluation_runs.sql")),
				"tables/006_evaluation_results.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_evaluation_results.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use crate::schema;

	#[test]
	fn every_include_is_expanded() {
		let sql = schema::render_schema();

		assert!(!sql.contains("\\ir "));

		for table in [
			"documents",
			"conversation_messages",
			"conversation_message_sources",
			"conversation_message_feedback",
			"evaluation_runs",
			"evaluation_results",
		] {
			assert!(
				sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
				"missing table {table}"
			);
		}
	}
}
