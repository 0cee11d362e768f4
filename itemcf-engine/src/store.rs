// ---------------------------------------------------------------------------
// Rating store — the engine's only view of persistent state
// ---------------------------------------------------------------------------
//
// `RatingStore` is the accessor contract the engine reads ratings through and
// writes similarities and predictions through. `MemoryStore` is the in-process
// implementation, optionally backed by a snapshot directory (see
// `persistence`). Writes mark the store dirty; `flush()` saves when dirty.
// ---------------------------------------------------------------------------

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::RecommenderError;
use crate::persistence::{self, PredictionSlots, StoreSnapshot};
use crate::types::{
	CanonicalPair, ItemId, KnownPrediction, PredictionMethod, PredictionRecord, PredictionTable,
	RatingMatrix, RatingRecord, SimilarityRecord, UserAverages, UserId,
};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

pub trait RatingStore {
	/// Read-only snapshot of every rating for the run.
	fn load_rating_matrix(&self) -> Result<RatingMatrix, RecommenderError>;

	fn load_user_averages(&self) -> Result<UserAverages, RecommenderError>;

	/// Look up a similarity by canonical pair.
	fn get_similarity(&self, pair: CanonicalPair) -> Result<Option<f64>, RecommenderError>;

	fn store_similarity(
		&mut self,
		pair: CanonicalPair,
		similarity: f64,
	) -> Result<(), RecommenderError>;

	/// `(user, item)` pairs still waiting for a prediction under `method`.
	fn pending_predictions(
		&self,
		method: PredictionMethod,
	) -> Result<Vec<(UserId, ItemId)>, RecommenderError>;

	fn store_prediction(
		&mut self,
		method: PredictionMethod,
		user: UserId,
		item: ItemId,
		prediction: f64,
	) -> Result<(), RecommenderError>;

	/// Predictions with known true ratings, used for evaluation only.
	fn load_known_predictions(&self) -> Result<PredictionTable, RecommenderError>;

	/// Commit buffered writes. Returns whether anything was written; stores
	/// that write through need not override this.
	fn flush(&mut self) -> Result<bool, RecommenderError> {
		Ok(false)
	}
}

impl<S: RatingStore + ?Sized> RatingStore for &mut S {
	fn load_rating_matrix(&self) -> Result<RatingMatrix, RecommenderError> {
		(**self).load_rating_matrix()
	}

	fn load_user_averages(&self) -> Result<UserAverages, RecommenderError> {
		(**self).load_user_averages()
	}

	fn get_similarity(&self, pair: CanonicalPair) -> Result<Option<f64>, RecommenderError> {
		(**self).get_similarity(pair)
	}

	fn store_similarity(
		&mut self,
		pair: CanonicalPair,
		similarity: f64,
	) -> Result<(), RecommenderError> {
		(**self).store_similarity(pair, similarity)
	}

	fn pending_predictions(
		&self,
		method: PredictionMethod,
	) -> Result<Vec<(UserId, ItemId)>, RecommenderError> {
		(**self).pending_predictions(method)
	}

	fn store_prediction(
		&mut self,
		method: PredictionMethod,
		user: UserId,
		item: ItemId,
		prediction: f64,
	) -> Result<(), RecommenderError> {
		(**self).store_prediction(method, user, item, prediction)
	}

	fn load_known_predictions(&self) -> Result<PredictionTable, RecommenderError> {
		(**self).load_known_predictions()
	}

	fn flush(&mut self) -> Result<bool, RecommenderError> {
		(**self).flush()
	}
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Counts reported by `store/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
	pub items: usize,
	pub ratings: usize,
	pub users_with_average: usize,
	pub similarities: usize,
	pub pending_basic: usize,
	pub pending_adjusted: usize,
	pub evaluation_entries: usize,
	pub dirty: bool,
}

/// In-memory rating store with optional snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
	ratings: RatingMatrix,
	averages: Option<UserAverages>,
	similarities: HashMap<CanonicalPair, f64>,
	basic: BTreeMap<(UserId, ItemId), Option<f64>>,
	adjusted: BTreeMap<(UserId, ItemId), Option<f64>>,
	evaluation: PredictionTable,
	storage_path: Option<PathBuf>,
	dirty: bool,
}

impl MemoryStore {
	// -- Lifecycle -----------------------------------------------------------

	pub fn new() -> Self {
		Self::default()
	}

	/// Open a store backed by `dir`, loading its snapshot if one exists.
	/// Snapshot ratings outside [1, 5] are skipped with a warning.
	pub fn open(dir: impl AsRef<Path>) -> Result<Self, RecommenderError> {
		let dir = dir.as_ref();
		let snapshot = persistence::load_from_directory(dir)?;
		let (mut store, skipped) = Self::from_snapshot(snapshot);
		if skipped > 0 {
			tracing::warn!(skipped, dir = %dir.display(), "Skipped invalid ratings in snapshot");
		}
		store.storage_path = Some(dir.to_path_buf());
		tracing::info!(
			dir = %dir.display(),
			items = store.ratings.item_count(),
			ratings = store.ratings.rating_count(),
			similarities = store.similarities.len(),
			"Store opened"
		);
		Ok(store)
	}

	/// Build a store from a snapshot. Returns the store and the number of
	/// invalid ratings that were dropped.
	pub fn from_snapshot(snapshot: StoreSnapshot) -> (Self, usize) {
		let mut store = Self::new();
		let mut skipped = 0;

		for r in snapshot.ratings {
			if store.ratings.insert(r.user, r.item, r.rating).is_err() {
				skipped += 1;
			}
		}
		store.averages = snapshot.averages;
		for s in snapshot.similarities {
			if let Some(pair) = CanonicalPair::new(s.item1, s.item2) {
				store.similarities.insert(pair, s.similarity);
			}
		}
		for p in snapshot.predictions.basic {
			store.basic.insert((p.user, p.item), p.prediction);
		}
		for p in snapshot.predictions.adjusted {
			store.adjusted.insert((p.user, p.item), p.prediction);
		}
		for k in snapshot.evaluation {
			store.evaluation.insert(k.user, k.item, k.prediction);
		}

		(store, skipped)
	}

	pub fn to_snapshot(&self) -> StoreSnapshot {
		let mut ratings: Vec<RatingRecord> = self
			.ratings
			.triples()
			.map(|(user, item, rating)| RatingRecord {
				user,
				item,
				rating: rating as i64,
			})
			.collect();
		ratings.sort_by_key(|r| (r.item, r.user));

		let mut similarities: Vec<SimilarityRecord> = self
			.similarities
			.iter()
			.map(|(pair, &similarity)| SimilarityRecord {
				item1: pair.lo,
				item2: pair.hi,
				similarity,
			})
			.collect();
		similarities.sort_by_key(|s| (s.item1, s.item2));

		let mut evaluation: Vec<KnownPrediction> = self
			.evaluation
			.entries()
			.map(|(user, item, prediction)| KnownPrediction {
				user,
				item,
				prediction,
			})
			.collect();
		evaluation.sort_by_key(|k| (k.item, k.user));

		StoreSnapshot {
			ratings,
			averages: self.averages.clone(),
			similarities,
			predictions: PredictionSlots {
				basic: slot_records(&self.basic),
				adjusted: slot_records(&self.adjusted),
			},
			evaluation,
			..StoreSnapshot::default()
		}
	}

	/// Write the snapshot to the storage directory. No-op without one.
	pub fn save(&mut self) -> Result<(), RecommenderError> {
		let Some(path) = self.storage_path.clone() else {
			return Ok(());
		};
		persistence::save_to_directory(&path, &self.to_snapshot())?;
		self.dirty = false;
		Ok(())
	}

	/// Save if dirty.
	pub fn dispose(&mut self) -> Result<(), RecommenderError> {
		if self.dirty {
			self.save()?;
		}
		Ok(())
	}

	pub fn storage_path(&self) -> Option<&Path> {
		self.storage_path.as_deref()
	}

	pub fn set_storage_path(&mut self, path: Option<PathBuf>) {
		self.storage_path = path;
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	// -- Mutation ------------------------------------------------------------

	/// Add or replace a rating. Stored similarities are left untouched.
	pub fn add_rating(
		&mut self,
		user: UserId,
		item: ItemId,
		rating: i64,
	) -> Result<(), RecommenderError> {
		self.ratings.insert(user, item, rating)?;
		self.dirty = true;
		Ok(())
	}

	/// Replace the precomputed average table. `None` means averages are
	/// derived from the ratings on load.
	pub fn set_averages(&mut self, averages: Option<UserAverages>) {
		self.averages = averages;
		self.dirty = true;
	}

	pub fn has_precomputed_averages(&self) -> bool {
		self.averages.is_some()
	}

	/// Open an empty prediction slot for `(user, item)`. An existing slot
	/// keeps its value.
	pub fn request_prediction(&mut self, method: PredictionMethod, user: UserId, item: ItemId) {
		self.slots_mut(method).entry((user, item)).or_insert(None);
		self.dirty = true;
	}

	pub fn add_known_prediction(&mut self, user: UserId, item: ItemId, prediction: f64) {
		self.evaluation.insert(user, item, prediction);
		self.dirty = true;
	}

	// -- Queries -------------------------------------------------------------

	pub fn ratings(&self) -> &RatingMatrix {
		&self.ratings
	}

	/// Every slot for `method`, computed or not, ordered by `(user, item)`.
	pub fn predictions(&self, method: PredictionMethod) -> Vec<PredictionRecord> {
		slot_records(self.slots(method))
	}

	pub fn prediction(&self, method: PredictionMethod, user: UserId, item: ItemId) -> Option<f64> {
		self.slots(method).get(&(user, item)).copied().flatten()
	}

	pub fn similarity_count(&self) -> usize {
		self.similarities.len()
	}

	pub fn stats(&self) -> StoreStats {
		let pending = |m| self.slots(m).values().filter(|p| p.is_none()).count();
		StoreStats {
			items: self.ratings.item_count(),
			ratings: self.ratings.rating_count(),
			users_with_average: self.averages.as_ref().map_or(0, |a| a.len()),
			similarities: self.similarities.len(),
			pending_basic: pending(PredictionMethod::Basic),
			pending_adjusted: pending(PredictionMethod::Adjusted),
			evaluation_entries: self.evaluation.len(),
			dirty: self.dirty,
		}
	}

	fn slots(&self, method: PredictionMethod) -> &BTreeMap<(UserId, ItemId), Option<f64>> {
		match method {
			PredictionMethod::Basic => &self.basic,
			PredictionMethod::Adjusted => &self.adjusted,
		}
	}

	fn slots_mut(
		&mut self,
		method: PredictionMethod,
	) -> &mut BTreeMap<(UserId, ItemId), Option<f64>> {
		match method {
			PredictionMethod::Basic => &mut self.basic,
			PredictionMethod::Adjusted => &mut self.adjusted,
		}
	}
}

fn slot_records(slots: &BTreeMap<(UserId, ItemId), Option<f64>>) -> Vec<PredictionRecord> {
	slots
		.iter()
		.map(|(&(user, item), &prediction)| PredictionRecord {
			user,
			item,
			prediction,
		})
		.collect()
}

impl RatingStore for MemoryStore {
	fn load_rating_matrix(&self) -> Result<RatingMatrix, RecommenderError> {
		Ok(self.ratings.clone())
	}

	fn load_user_averages(&self) -> Result<UserAverages, RecommenderError> {
		Ok(match &self.averages {
			Some(a) => a.clone(),
			None => UserAverages::from_matrix(&self.ratings),
		})
	}

	fn get_similarity(&self, pair: CanonicalPair) -> Result<Option<f64>, RecommenderError> {
		Ok(self.similarities.get(&pair).copied())
	}

	fn store_similarity(
		&mut self,
		pair: CanonicalPair,
		similarity: f64,
	) -> Result<(), RecommenderError> {
		self.similarities.insert(pair, similarity);
		self.dirty = true;
		Ok(())
	}

	fn pending_predictions(
		&self,
		method: PredictionMethod,
	) -> Result<Vec<(UserId, ItemId)>, RecommenderError> {
		Ok(self
			.slots(method)
			.iter()
			.filter(|(_, p)| p.is_none())
			.map(|(&key, _)| key)
			.collect())
	}

	fn store_prediction(
		&mut self,
		method: PredictionMethod,
		user: UserId,
		item: ItemId,
		prediction: f64,
	) -> Result<(), RecommenderError> {
		self.slots_mut(method).insert((user, item), Some(prediction));
		self.dirty = true;
		Ok(())
	}

	fn load_known_predictions(&self) -> Result<PredictionTable, RecommenderError> {
		Ok(self.evaluation.clone())
	}

	fn flush(&mut self) -> Result<bool, RecommenderError> {
		if !self.dirty || self.storage_path.is_none() {
			return Ok(false);
		}
		self.save()?;
		Ok(true)
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn pair(a: ItemId, b: ItemId) -> CanonicalPair {
		CanonicalPair::new(a, b).unwrap()
	}

	#[test]
	fn new_store_is_clean_and_empty() {
		let store = MemoryStore::new();
		assert!(!store.is_dirty());
		assert!(store.load_rating_matrix().unwrap().is_empty());
		assert!(store.load_user_averages().unwrap().is_empty());
		assert_eq!(store.get_similarity(pair(1, 2)).unwrap(), None);
	}

	#[test]
	fn similarity_is_keyed_by_canonical_pair() {
		let mut store = MemoryStore::new();
		store.store_similarity(pair(5, 2), 0.75).unwrap();
		assert_eq!(store.get_similarity(pair(2, 5)).unwrap(), Some(0.75));
		assert!(store.is_dirty());
	}

	#[test]
	fn averages_are_derived_when_not_precomputed() {
		let mut store = MemoryStore::new();
		store.add_rating(1, 1, 4).unwrap();
		store.add_rating(1, 2, 2).unwrap();
		assert_eq!(store.load_user_averages().unwrap().get(1), Some(3.0));

		store.set_averages(Some([(1, 4.25)].into_iter().collect()));
		assert_eq!(store.load_user_averages().unwrap().get(1), Some(4.25));
	}

	#[test]
	fn add_rating_rejects_invalid() {
		let mut store = MemoryStore::new();
		let err = store.add_rating(1, 1, 9).unwrap_err();
		assert_eq!(err.code(), "INVALID_RATING");
		assert!(!store.is_dirty());
	}

	#[test]
	fn pending_predictions_are_ordered_and_resolve() {
		let mut store = MemoryStore::new();
		store.request_prediction(PredictionMethod::Basic, 2, 1);
		store.request_prediction(PredictionMethod::Basic, 1, 9);
		store.request_prediction(PredictionMethod::Adjusted, 1, 9);

		assert_eq!(
			store.pending_predictions(PredictionMethod::Basic).unwrap(),
			vec![(1, 9), (2, 1)]
		);

		store
			.store_prediction(PredictionMethod::Basic, 1, 9, 3.5)
			.unwrap();
		assert_eq!(
			store.pending_predictions(PredictionMethod::Basic).unwrap(),
			vec![(2, 1)]
		);
		// The other table is independent.
		assert_eq!(
			store.pending_predictions(PredictionMethod::Adjusted).unwrap(),
			vec![(1, 9)]
		);
		assert_eq!(store.prediction(PredictionMethod::Basic, 1, 9), Some(3.5));
	}

	#[test]
	fn request_keeps_existing_value() {
		let mut store = MemoryStore::new();
		store
			.store_prediction(PredictionMethod::Adjusted, 1, 1, 2.0)
			.unwrap();
		store.request_prediction(PredictionMethod::Adjusted, 1, 1);
		assert_eq!(store.prediction(PredictionMethod::Adjusted, 1, 1), Some(2.0));
	}

	#[test]
	fn snapshot_round_trip_through_directory() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = MemoryStore::open(dir.path()).unwrap();
		store.add_rating(1, 10, 5).unwrap();
		store.add_rating(2, 10, 3).unwrap();
		store.store_similarity(pair(10, 20), -0.5).unwrap();
		store.request_prediction(PredictionMethod::Basic, 3, 10);
		store.add_known_prediction(1, 10, 4.0);
		assert!(store.flush().unwrap());
		assert!(!store.is_dirty());
		assert!(!store.flush().unwrap());

		let reopened = MemoryStore::open(dir.path()).unwrap();
		assert_eq!(reopened.ratings().rating(10, 2), Some(3));
		assert_eq!(reopened.get_similarity(pair(20, 10)).unwrap(), Some(-0.5));
		assert_eq!(
			reopened.pending_predictions(PredictionMethod::Basic).unwrap(),
			vec![(3, 10)]
		);
		assert_eq!(reopened.load_known_predictions().unwrap().get(1, 10), Some(4.0));
		assert!(!reopened.has_precomputed_averages());
	}

	#[test]
	fn flush_without_directory_keeps_dirty_flag() {
		let mut store = MemoryStore::new();
		store.add_rating(1, 1, 3).unwrap();
		assert!(!store.flush().unwrap());
		assert!(store.is_dirty());
	}

	#[test]
	fn from_snapshot_skips_invalid_ratings_and_self_pairs() {
		let snapshot = StoreSnapshot {
			ratings: vec![
				RatingRecord { user: 1, item: 1, rating: 4 },
				RatingRecord { user: 1, item: 2, rating: 0 },
			],
			similarities: vec![SimilarityRecord {
				item1: 3,
				item2: 3,
				similarity: 1.0,
			}],
			..StoreSnapshot::default()
		};
		let (store, skipped) = MemoryStore::from_snapshot(snapshot);
		assert_eq!(skipped, 1);
		assert_eq!(store.ratings().rating_count(), 1);
		assert_eq!(store.similarity_count(), 0);
	}

	#[test]
	fn stats_count_pending_slots() {
		let mut store = MemoryStore::new();
		store.add_rating(1, 1, 3).unwrap();
		store.request_prediction(PredictionMethod::Basic, 2, 1);
		store.request_prediction(PredictionMethod::Adjusted, 2, 1);
		store
			.store_prediction(PredictionMethod::Adjusted, 2, 1, 3.0)
			.unwrap();
		let stats = store.stats();
		assert_eq!(stats.ratings, 1);
		assert_eq!(stats.pending_basic, 1);
		assert_eq!(stats.pending_adjusted, 0);
		assert!(stats.dirty);
	}
}
