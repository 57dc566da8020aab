use std::sync::Arc;

use lore_service::LoreService;
use lore_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LoreService>,
}
impl AppState {
	/// Connects both stores and bootstraps the schema and the collection before serving.
	pub async fn new(config: lore_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		Ok(Self::from_service(LoreService::new(config, db, qdrant)))
	}

	pub fn from_service(service: LoreService) -> Self {
		Self { service: Arc::new(service) }
	}
}
