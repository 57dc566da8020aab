use lore_service::{Error, HybridQuery, QdrantIndex, SearchIndex};
use lore_storage::qdrant::QdrantStore;
use lore_testkit::TestDatabase;

#[tokio::test]
async fn missing_collection_is_reported_distinctly() {
	let (Some(base_dsn), Some(qdrant_url)) = (lore_testkit::env_dsn(), lore_testkit::env_qdrant_url())
	else {
		eprintln!("Skipping missing_collection_is_reported_distinctly; set LORE_PG_DSN and LORE_QDRANT_URL.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = lore_config::Qdrant {
		url: qdrant_url,
		collection: test_db.collection_name("lore_index"),
		vector_dim: 4,
	};
	let store = QdrantStore::new(&cfg).expect("Failed to build Qdrant client.");
	let index = QdrantIndex::new(store);
	let result = index.vector(&[1.0, 0.0, 0.0, 0.0], 5).await;

	assert!(matches!(result, Err(Error::IndexMissing { .. })), "Unexpected result: {result:?}");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
async fn empty_collection_returns_no_matches() {
	let (Some(base_dsn), Some(qdrant_url)) = (lore_testkit::env_dsn(), lore_testkit::env_qdrant_url())
	else {
		eprintln!("Skipping empty_collection_returns_no_matches; set LORE_PG_DSN and LORE_QDRANT_URL.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = lore_config::Qdrant {
		url: qdrant_url,
		collection: test_db.collection_name("lore_index"),
		vector_dim: 4,
	};
	let store = QdrantStore::new(&cfg).expect("Failed to build Qdrant client.");

	store.ensure_collection().await.expect("Failed to create collection.");

	let index = QdrantIndex::new(store);
	let query = HybridQuery::new("奖学金", vec![1.0, 0.0, 0.0, 0.0], 5);
	let matches = index.hybrid(&query).await.expect("Hybrid query failed.");

	assert!(matches.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
