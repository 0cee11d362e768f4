use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::types::PredictionMethod;

/// Predictions between store commits during batch runs.
pub const DEFAULT_COMMIT_EVERY: usize = 20;

#[derive(Parser, Debug)]
#[command(
	name = "itemcf-engine",
	about = "Item-based collaborative filtering engine",
	version
)]
pub struct CliArgs {
	/// Store directory holding the snapshot (store.gz or store.json)
	#[arg(long, env = "ITEMCF_DATA_DIR")]
	pub data_dir: Option<PathBuf>,

	/// Save the store after this many predictions (0 saves only at the end)
	#[arg(long, default_value_t = DEFAULT_COMMIT_EVERY, env = "ITEMCF_COMMIT_EVERY")]
	pub commit_every: usize,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, default_value = "info", env = "ITEMCF_LOG_LEVEL")]
	pub log_level: String,

	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
	/// Serve JSON-RPC 2.0 over NDJSON stdio (the default)
	Serve,
	/// Compute every pending prediction for one method, then exit
	Predict {
		#[arg(long, value_enum, default_value = "basic")]
		method: PredictionMethod,
	},
	/// Print the mean absolute error of the store's evaluation table
	Evaluate,
}

/// Runtime settings shared by the server and the batch driver.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
	pub storage_path: Option<PathBuf>,
	pub commit_every: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			storage_path: None,
			commit_every: DEFAULT_COMMIT_EVERY,
		}
	}
}

impl From<&CliArgs> for EngineConfig {
	fn from(args: &CliArgs) -> Self {
		Self {
			storage_path: args.data_dir.clone(),
			commit_every: args.commit_every,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_to_serve_without_storage() {
		let args = CliArgs::parse_from(["itemcf-engine"]);
		assert_eq!(args.command, None);
		let config = EngineConfig::from(&args);
		assert_eq!(config, EngineConfig::default());
	}

	#[test]
	fn parses_predict_subcommand() {
		let args = CliArgs::parse_from([
			"itemcf-engine",
			"--data-dir",
			"/tmp/cf",
			"--commit-every",
			"5",
			"predict",
			"--method",
			"adjusted",
		]);
		assert_eq!(
			args.command,
			Some(Command::Predict {
				method: PredictionMethod::Adjusted
			})
		);
		let config = EngineConfig::from(&args);
		assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/cf")));
		assert_eq!(config.commit_every, 5);
	}
}
