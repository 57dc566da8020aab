use lore_config::Postgres;
use lore_storage::{db::Db, models::MessageSource, queries};
use lore_testkit::TestDatabase;

async fn bootstrap(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some(base_dsn) = lore_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_idempotent; set LORE_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	db.ensure_schema().await.expect("Second bootstrap failed.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'conversation_message_feedback'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	drop(db);
	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn history_returns_newest_messages_in_order() {
	let Some(base_dsn) = lore_testkit::env_dsn() else {
		eprintln!(
			"Skipping history_returns_newest_messages_in_order; set LORE_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;

	for idx in 0..5 {
		let role = if idx % 2 == 0 { "user" } else { "assistant" };

		queries::insert_message(&db.pool, "s-1", "u-1", role, &format!("m{idx}"))
			.await
			.expect("Failed to insert message.");
	}

	let recent = queries::recent_messages(&db.pool, "s-1", 3).await.expect("Failed to load.");
	let contents = recent.iter().map(|row| row.content.as_str()).collect::<Vec<_>>();

	assert_eq!(contents, vec!["m2", "m3", "m4"]);

	let session = queries::latest_session_for_user(&db.pool, "u-1").await.expect("Failed to load.");

	assert_eq!(session.as_deref(), Some("s-1"));
	assert!(
		queries::latest_session_for_user(&db.pool, "nobody")
			.await
			.expect("Failed to load.")
			.is_none()
	);

	drop(db);
	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set LORE_PG_DSN to run."]
async fn feedback_averages_per_cited_document() {
	let Some(base_dsn) = lore_testkit::env_dsn() else {
		eprintln!(
			"Skipping feedback_averages_per_cited_document; set LORE_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrap(&test_db).await;
	let source = |document_id: &str, chunk_index| MessageSource {
		document_id: document_id.to_string(),
		chunk_index,
		relevance_score: 0.5,
		source_name: None,
	};
	let first = queries::insert_message(&db.pool, "s", "u", "assistant", "a1")
		.await
		.expect("Failed to insert message.");
	let second = queries::insert_message(&db.pool, "s", "u", "assistant", "a2")
		.await
		.expect("Failed to insert message.");

	queries::insert_message_sources(&db.pool, first, &[source("d1", 0), source("d1", 1)])
		.await
		.expect("Failed to insert sources.");
	queries::insert_message_sources(&db.pool, second, &[source("d1", 0), source("d2", 0)])
		.await
		.expect("Failed to insert sources.");
	queries::insert_feedback(&db.pool, first, "u", 5, Some("helpful"))
		.await
		.expect("Failed to insert feedback.");
	queries::insert_feedback(&db.pool, second, "u", 2, None)
		.await
		.expect("Failed to insert feedback.");

	assert!(queries::message_exists(&db.pool, first).await.expect("Failed to check."));
	assert!(!queries::message_exists(&db.pool, second + 100).await.expect("Failed to check."));

	let mut rows = queries::average_feedback_by_document(
		&db.pool,
		&["d1".to_string(), "d2".to_string(), "d3".to_string()],
	)
	.await
	.expect("Failed to aggregate feedback.");

	rows.sort_by(|a, b| a.document_id.cmp(&b.document_id));

	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0].document_id, "d1");
	assert!((rows[0].avg_score - 3.5).abs() < 1e-9);
	assert_eq!(rows[1].document_id, "d2");
	assert!((rows[1].avg_score - 2.0).abs() < 1e-9);

	drop(db);
	test_db.cleanup().await.expect("Failed to clean up test database.");
}
