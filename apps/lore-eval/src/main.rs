use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lore_eval::Args::parse();

	lore_eval::run(args).await
}
