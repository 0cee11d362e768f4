pub mod baseline;
pub mod config;
pub mod corated;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod persistence;
pub mod prediction;
pub mod protocol;
pub mod recommender;
pub mod server;
pub mod similarity;
pub mod store;
pub mod transport;
pub mod types;
