use anyhow::{Context, Result};
use clap::Parser;
use itemcf_engine::config::{CliArgs, Command, EngineConfig};
use itemcf_engine::driver;
use itemcf_engine::recommender::Recommender;
use itemcf_engine::server::RecommenderServer;
use itemcf_engine::store::{MemoryStore, RatingStore};
use itemcf_engine::transport::NdjsonTransport;
use itemcf_engine::types::PredictionMethod;

fn main() -> Result<()> {
	let args = CliArgs::parse();

	// Logs go to stderr; stdout carries protocol and command output.
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	let config = EngineConfig::from(&args);

	match args.command.clone().unwrap_or(Command::Serve) {
		Command::Serve => serve(config),
		Command::Predict { method } => predict(config, method),
		Command::Evaluate => evaluate(config),
	}
}

fn serve(config: EngineConfig) -> Result<()> {
	let transport = NdjsonTransport::new();
	let mut server = RecommenderServer::new(transport, config);

	tracing::info!("itemcf-engine JSON-RPC server ready");
	server.run()?;
	Ok(())
}

fn open_store(config: &EngineConfig) -> Result<MemoryStore> {
	let dir = config
		.storage_path
		.as_ref()
		.context("--data-dir (or ITEMCF_DATA_DIR) is required for batch commands")?;
	let store = MemoryStore::open(dir)
		.with_context(|| format!("failed to open store at {}", dir.display()))?;
	Ok(store)
}

fn predict(config: EngineConfig, method: PredictionMethod) -> Result<()> {
	let store = open_store(&config)?;
	let ratings = store.load_rating_matrix()?;
	let averages = store.load_user_averages()?;

	let mut engine = Recommender::new(store);
	let summary = driver::run_pending(
		&mut engine,
		method,
		&ratings,
		&averages,
		config.commit_every,
	)?;
	engine
		.store_mut()
		.dispose()
		.context("failed to save store")?;

	println!("{}", serde_json::to_string(&summary)?);
	Ok(())
}

fn evaluate(config: EngineConfig) -> Result<()> {
	let store = open_store(&config)?;
	let ratings = store.load_rating_matrix()?;
	let mae = driver::evaluate(&store, &ratings)?;

	println!("{}", serde_json::json!({ "mae": mae }));
	Ok(())
}
