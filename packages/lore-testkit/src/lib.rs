//! Scratch Postgres databases and Qdrant collections for tests that need live backends.
//!
//! Both backends are opt-in: tests read `LORE_PG_DSN` and `LORE_QDRANT_URL` and skip themselves
//! when either is unset.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_TIMEOUT: Duration = Duration::from_secs(10);

/// A uniquely named database, dropped on [`TestDatabase::cleanup`] or, failing that, on drop.
///
/// Qdrant collections reserved through [`TestDatabase::collection_name`] share its lifetime.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin: PgConnectOptions,
	collections: Mutex<Vec<String>>,
	torn_down: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)?;
		let (admin, mut conn) = connect_admin(&base).await?;
		let name = format!("lore_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin, collections: Mutex::new(Vec::new()), torn_down: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.lock().unwrap_or_else(|err| err.into_inner()).push(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.torn_down = true;

		teardown(&self.name, &self.admin, &self.reserved()).await
	}

	fn reserved(&self) -> Vec<String> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.torn_down {
			return;
		}

		let name = self.name.clone();
		let admin = self.admin.clone();
		let collections = self.reserved();
		// Async tests drop this inside their runtime, which cannot be blocked on.
		let handle = thread::spawn(move || {
			let result = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(teardown(&name, &admin, &collections)));

			if let Err(err) = result {
				eprintln!("Test backend cleanup for {name} failed: {err}.");
			}
		});
		let _ = handle.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("LORE_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("LORE_QDRANT_URL").ok()
}

async fn connect_admin(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => last_err = Some(err),
		}
	}

	Err(Error::Message(format!("No admin database accepted the connection: {last_err:?}.")))
}

/// Drops the reserved collections that exist, then the database with its open sessions.
async fn teardown(name: &str, admin: &PgConnectOptions, collections: &[String]) -> Result<()> {
	if !collections.is_empty() {
		match env_qdrant_url() {
			Some(url) => drop_collections(&url, collections).await?,
			None => eprintln!("LORE_QDRANT_URL is unset; leaving collections {collections:?}."),
		}
	}

	let mut conn = PgConnection::connect_with(admin).await?;

	sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
		 WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).await?;

	Ok(())
}

async fn drop_collections(url: &str, collections: &[String]) -> Result<()> {
	let client = Qdrant::from_url(url).build().map_err(|err| Error::Message(err.to_string()))?;

	for collection in collections {
		let removal = async {
			if client.collection_exists(collection.clone()).await? {
				client.delete_collection(collection.clone()).await?;
			}

			Ok::<_, qdrant_client::QdrantError>(())
		};

		time::timeout(QDRANT_TIMEOUT, removal)
			.await
			.map_err(|_| Error::Message(format!("Timed out dropping collection {collection}.")))?
			.map_err(|err| Error::Message(format!("Failed to drop collection {collection}: {err}.")))?;
	}

	Ok(())
}
