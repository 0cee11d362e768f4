// ---------------------------------------------------------------------------
// Snapshot persistence — gzipped JSON store file
// ---------------------------------------------------------------------------
//
// A store directory holds a single snapshot file:
//   store.gz    gzipped JSON (written by `save_to_directory`)
//   store.json  plain JSON (accepted on load, handy for hand-written fixtures)
//
// Snapshot layout (version 1):
//   {
//     "version": 1,
//     "ratings": [{ "user", "item", "rating" }],
//     "averages": { "<user>": <avg> } | null,
//     "similarities": [{ "item1", "item2", "similarity" }],
//     "predictions": { "basic": [{ "user", "item", "prediction" | null }],
//                      "adjusted": [...] },
//     "evaluation": [{ "user", "item", "prediction" }]
//   }
// ---------------------------------------------------------------------------

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::error::RecommenderError;
use crate::types::{KnownPrediction, PredictionRecord, RatingRecord, SimilarityRecord, UserAverages};

pub const SNAPSHOT_VERSION: u32 = 1;
pub const GZ_FILE: &str = "store.gz";
pub const JSON_FILE: &str = "store.json";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PersistenceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Corruption: {0}")]
	Corruption(String),
	#[error("Serialization: {0}")]
	Serialization(String),
}

impl From<PersistenceError> for RecommenderError {
	fn from(e: PersistenceError) -> Self {
		match e {
			PersistenceError::Io(io) => RecommenderError::Io(io),
			PersistenceError::Corruption(msg) => RecommenderError::Corruption(msg),
			PersistenceError::Serialization(msg) => RecommenderError::Serialization(msg),
		}
	}
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSlots {
	#[serde(default)]
	pub basic: Vec<PredictionRecord>,
	#[serde(default)]
	pub adjusted: Vec<PredictionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
	pub version: u32,
	#[serde(default)]
	pub ratings: Vec<RatingRecord>,
	#[serde(default)]
	pub averages: Option<UserAverages>,
	#[serde(default)]
	pub similarities: Vec<SimilarityRecord>,
	#[serde(default)]
	pub predictions: PredictionSlots,
	#[serde(default)]
	pub evaluation: Vec<KnownPrediction>,
}

impl Default for StoreSnapshot {
	fn default() -> Self {
		Self {
			version: SNAPSHOT_VERSION,
			ratings: Vec::new(),
			averages: None,
			similarities: Vec::new(),
			predictions: PredictionSlots::default(),
			evaluation: Vec::new(),
		}
	}
}

// ---------------------------------------------------------------------------
// Gzip compress / decompress
// ---------------------------------------------------------------------------

/// Gzip-compress a byte slice at level 6.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	let mut encoder = GzEncoder::new(data, Compression::new(6));
	let mut compressed = Vec::new();
	encoder.read_to_end(&mut compressed)?;
	Ok(compressed)
}

/// Gunzip-decompress a byte slice.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	let mut decoder = GzDecoder::new(data);
	let mut decompressed = Vec::new();
	decoder.read_to_end(&mut decompressed)?;
	Ok(decompressed)
}

/// Check if data starts with gzip magic bytes (0x1f, 0x8b).
pub fn is_gzipped(data: &[u8]) -> bool {
	data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Parse snapshot bytes, gzipped or plain.
pub fn decode_snapshot(raw: &[u8]) -> Result<StoreSnapshot, PersistenceError> {
	let json_bytes = if is_gzipped(raw) {
		decompress(raw)?
	} else {
		raw.to_vec()
	};

	let json_str = std::str::from_utf8(&json_bytes)
		.map_err(|e| PersistenceError::Corruption(format!("Invalid UTF-8 in snapshot: {}", e)))?;

	let snapshot: StoreSnapshot = serde_json::from_str(json_str)
		.map_err(|e| PersistenceError::Corruption(format!("Invalid snapshot JSON: {}", e)))?;

	if snapshot.version != SNAPSHOT_VERSION {
		return Err(PersistenceError::Corruption(format!(
			"Unsupported snapshot version: {}",
			snapshot.version
		)));
	}

	Ok(snapshot)
}

/// Serialize and gzip a snapshot.
pub fn encode_snapshot(snapshot: &StoreSnapshot) -> Result<Vec<u8>, PersistenceError> {
	let json = serde_json::to_vec(snapshot).map_err(|e| {
		PersistenceError::Serialization(format!("Failed to serialize snapshot: {}", e))
	})?;
	compress(&json)
}

// ---------------------------------------------------------------------------
// File I/O
// ---------------------------------------------------------------------------

/// Write `store.gz` into `dir`, creating the directory if needed.
pub fn save_to_directory(dir: &Path, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
	std::fs::create_dir_all(dir)?;
	let compressed = encode_snapshot(snapshot)?;

	// Write to a temp file, then rename over the snapshot.
	let tmp = dir.join(format!("{}.tmp", GZ_FILE));
	std::fs::write(&tmp, &compressed)?;
	std::fs::rename(&tmp, dir.join(GZ_FILE))?;

	tracing::debug!(
		dir = %dir.display(),
		ratings = snapshot.ratings.len(),
		similarities = snapshot.similarities.len(),
		"Snapshot saved"
	);
	Ok(())
}

/// Load a snapshot from `dir`. Reads `store.gz` first, then `store.json`.
/// A directory without either file yields an empty snapshot.
pub fn load_from_directory(dir: &Path) -> Result<StoreSnapshot, PersistenceError> {
	let gz_path = dir.join(GZ_FILE);
	let json_path = dir.join(JSON_FILE);

	let raw = if gz_path.exists() {
		std::fs::read(&gz_path)?
	} else if json_path.exists() {
		std::fs::read(&json_path)?
	} else {
		return Ok(StoreSnapshot::default());
	};

	decode_snapshot(&raw)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> StoreSnapshot {
		StoreSnapshot {
			ratings: vec![
				RatingRecord { user: 1, item: 10, rating: 5 },
				RatingRecord { user: 2, item: 10, rating: 3 },
			],
			averages: Some([(1, 4.5), (2, 2.5)].into_iter().collect()),
			similarities: vec![SimilarityRecord {
				item1: 10,
				item2: 20,
				similarity: -0.25,
			}],
			predictions: PredictionSlots {
				basic: vec![PredictionRecord { user: 3, item: 10, prediction: None }],
				adjusted: vec![PredictionRecord {
					user: 3,
					item: 10,
					prediction: Some(4.0),
				}],
			},
			evaluation: vec![KnownPrediction { user: 1, item: 10, prediction: 4.5 }],
			..StoreSnapshot::default()
		}
	}

	#[test]
	fn gzip_detection() {
		let compressed = compress(b"test").unwrap();
		assert!(is_gzipped(&compressed));
		assert!(!is_gzipped(b"{}"));
		assert!(!is_gzipped(&[0x1f]));
	}

	#[test]
	fn save_and_load_directory() {
		let dir = tempfile::tempdir().unwrap();
		let snapshot = sample();
		save_to_directory(dir.path(), &snapshot).unwrap();
		assert!(dir.path().join(GZ_FILE).exists());
		assert!(!dir.path().join(format!("{}.tmp", GZ_FILE)).exists());

		let loaded = load_from_directory(dir.path()).unwrap();
		assert_eq!(loaded, snapshot);
	}

	#[test]
	fn plain_json_file_is_accepted() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join(JSON_FILE),
			r#"{"version":1,"ratings":[{"user":1,"item":2,"rating":4}]}"#,
		)
		.unwrap();
		let loaded = load_from_directory(dir.path()).unwrap();
		assert_eq!(loaded.ratings.len(), 1);
		assert!(loaded.averages.is_none());
		assert!(loaded.predictions.basic.is_empty());
	}

	#[test]
	fn missing_directory_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let loaded = load_from_directory(&dir.path().join("nope")).unwrap();
		assert_eq!(loaded, StoreSnapshot::default());
	}

	#[test]
	fn unsupported_version_is_corruption() {
		let err = decode_snapshot(br#"{"version":7}"#).unwrap_err();
		assert!(matches!(err, PersistenceError::Corruption(_)));
	}

	#[test]
	fn garbage_is_corruption() {
		let err = decode_snapshot(b"not json").unwrap_err();
		assert!(matches!(err, PersistenceError::Corruption(_)));
		let mapped: RecommenderError = err.into();
		assert_eq!(mapped.code(), "STORE_CORRUPT");
	}

	#[test]
	fn save_creates_nested_directory() {
		let parent = tempfile::tempdir().unwrap();
		let nested = parent.path().join("a").join("b");
		save_to_directory(&nested, &StoreSnapshot::default()).unwrap();
		assert!(nested.join(GZ_FILE).exists());
	}
}
