use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre;

use lore_service::{LoreService, eval};
use lore_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = lore_cli::VERSION,
	rename_all = "kebab",
	styles = lore_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Overrides `eval.dataset` from the config.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: Option<PathBuf>,
	/// Also generate an answer per item and score it against the expected answer.
	#[arg(long)]
	pub with_answer: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lore_config::load(&args.config)?;

	lore_cli::init_tracing(&config.service.log_level);

	let dataset_path = args
		.dataset
		.clone()
		.or_else(|| config.eval.dataset.as_ref().map(PathBuf::from))
		.ok_or_else(|| eyre::eyre!("--dataset or eval.dataset is required."))?;
	let with_answer = args.with_answer || config.eval.with_answer;
	let items = eval::load_dataset(&dataset_path)?;
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let service = LoreService::new(config, db, qdrant);

	tracing::info!(
		dataset = %dataset_path.display(),
		items = items.len(),
		with_answer,
		"Evaluation started."
	);

	let report = service.run_evaluation(&items, with_answer).await?;
	let json = serde_json::to_string_pretty(&report)?;

	println!("{json}");

	Ok(())
}
