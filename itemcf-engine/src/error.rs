use thiserror::Error;

use crate::types::{ItemId, UserId};

#[derive(Debug, Error)]
pub enum RecommenderError {
	#[error("Engine not initialized: call engine/initialize first")]
	NotInitialized,
	#[error("Invalid rating {rating} for user {user} on item {item}: must be between 1 and 5")]
	InvalidRating { user: UserId, item: ItemId, rating: i64 },
	#[error("Insufficient data: {0}")]
	InsufficientData(String),
	#[error("No data: {0}")]
	NoData(String),
	#[error("No true rating for user {user} on item {item}")]
	MissingRating { user: UserId, item: ItemId },
	#[error("Store error: {0}")]
	Store(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Storage corruption: {0}")]
	Corruption(String),
}

impl RecommenderError {
	pub fn code(&self) -> &str {
		match self {
			Self::NotInitialized => "NOT_INITIALIZED",
			Self::InvalidRating { .. } => "INVALID_RATING",
			Self::InsufficientData(_) => "INSUFFICIENT_DATA",
			Self::NoData(_) => "NO_DATA",
			Self::MissingRating { .. } => "MISSING_RATING",
			Self::Store(_) => "STORE_ERROR",
			Self::Io(_) => "IO_ERROR",
			Self::Serialization(_) => "SERIALIZATION_ERROR",
			Self::Corruption(_) => "STORE_CORRUPT",
		}
	}

	pub fn to_json_rpc_error(&self) -> serde_json::Value {
		serde_json::json!({
			"recommenderCode": self.code(),
			"message": self.to_string(),
		})
	}
}
