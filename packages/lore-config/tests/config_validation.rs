use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lore_config::Config;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &[&str], key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for name in section {
		table = table
			.entry(name.to_string())
			.or_insert(Value::Table(Default::default()))
			.as_table_mut()
			.expect("Template section must be a table.");
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lore_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> lore_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = lore_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation_error(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected validation error.");
	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn template_loads_with_defaults() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Template config must be valid.");

	assert_eq!(cfg.retrieval.fusion.rrf_k, 60);
	assert_eq!(cfg.retrieval.rerank.max_candidates, 8);
	assert_eq!(cfg.retrieval.rerank.snippet_chars, 200);
	assert!(cfg.retrieval.routing.enabled);
	assert!(!cfg.retrieval.routing.use_llm);
	assert_eq!(cfg.retrieval.routing.max_tags, 4);
	assert_eq!(cfg.retrieval.crag.review_top_k, 3);
	assert_eq!(cfg.retrieval.crag.fallback_multiplier, 2);
	assert!((cfg.retrieval.feedback.max_boost - 0.15).abs() < f32::EPSILON);
	assert_eq!(cfg.prompt.ref_start, "<<参考资料开始>>");
	assert_eq!(cfg.prompt.ref_end, "<<参考资料结束>>");
	assert_eq!(cfg.conversation.answer_timeout_secs, 120);
	assert_eq!(cfg.conversation.max_history, 20);
	assert_eq!(cfg.providers.llm.max_tokens, 2_000);
	assert!(cfg.providers.embedding.default_headers.is_empty());
}

#[test]
fn blank_prompt_overrides_normalize_to_none() {
	let payload =
		sample_toml_with(&["retrieval", "rewrite"], "prompt", Value::String("   ".to_string()));
	let cfg = load_payload(payload).expect("Blank prompt override must be accepted.");

	assert!(cfg.retrieval.rewrite.prompt.is_none());
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let payload =
		sample_toml_with(&["providers", "embedding"], "dimensions", Value::Integer(768));

	expect_validation_error(
		payload,
		"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
	);
}

#[test]
fn api_keys_must_be_non_empty() {
	let payload = sample_toml_with(&["providers", "llm"], "api_key", Value::String(" ".into()));

	expect_validation_error(payload, "Provider llm api_key must be non-empty.");
}

#[test]
fn max_queries_must_be_positive() {
	let payload =
		sample_toml_with(&["retrieval", "fusion"], "max_queries", Value::Integer(0));

	expect_validation_error(payload, "retrieval.fusion.max_queries must be greater than zero.");
}

#[test]
fn min_score_must_be_in_unit_range() {
	let payload = sample_toml_with(&["retrieval", "crag"], "min_score", Value::Float(1.5));

	expect_validation_error(payload, "retrieval.crag.min_score must be in the range 0.0-1.0.");
}

#[test]
fn max_boost_must_be_in_unit_range() {
	let payload =
		sample_toml_with(&["retrieval", "feedback"], "max_boost", Value::Float(-0.1));

	expect_validation_error(
		payload,
		"retrieval.feedback.max_boost must be in the range 0.0-1.0.",
	);
}

#[test]
fn answer_timeout_must_be_positive() {
	let payload =
		sample_toml_with(&["conversation"], "answer_timeout_secs", Value::Integer(0));

	expect_validation_error(
		payload,
		"conversation.answer_timeout_secs must be greater than zero.",
	);
}

#[test]
fn unreadable_path_reports_read_error() {
	let err = lore_config::load(&PathBuf::from("/nonexistent/lore.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, lore_config::Error::ReadConfig { .. }));
}
