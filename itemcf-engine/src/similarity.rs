// ---------------------------------------------------------------------------
// Item-item similarity — adjusted cosine over co-rated users
// ---------------------------------------------------------------------------
//
// Each canonical pair is computed at most once: the first computation is
// written to the store, and every later request returns the stored value
// even if the ratings have changed since.
// ---------------------------------------------------------------------------

use crate::corated::{co_rated, CoRated};
use crate::store::RatingStore;
use crate::types::{CanonicalPair, ItemId, RatingMatrix, UserAverages};

/// Adjusted cosine similarity of two items from their co-rated working set.
///
/// Each rating is centred on the rater's average before the cosine is taken.
/// Returns 0.0 when the denominator is zero (no co-raters, or no deviation
/// from the average). Result clamped to [-1.0, 1.0].
pub fn adjusted_cosine(set: &CoRated, averages: &UserAverages) -> f64 {
	let mut numerator: f64 = 0.0;
	let mut denom_a: f64 = 0.0;
	let mut denom_b: f64 = 0.0;

	for (user, r1, r2) in set.iter() {
		let Some(avg) = averages.get(user) else {
			// A rater without an average: inconsistent input, leave them out.
			tracing::warn!(user, "Co-rater has no average rating, skipping");
			continue;
		};
		let d1 = r1 as f64 - avg;
		let d2 = r2 as f64 - avg;
		numerator += d1 * d2;
		denom_a += d1 * d1;
		denom_b += d2 * d2;
	}

	let denom = denom_a.sqrt() * denom_b.sqrt();
	if denom == 0.0 {
		return 0.0;
	}

	let result = numerator / denom;
	if !result.is_finite() {
		return 0.0;
	}
	result.clamp(-1.0, 1.0)
}

/// Similarity between two items, computed on first demand and persisted.
///
/// Self-similarity is 1.0 and never touches the store. A failed store read
/// counts as a miss; a failed write is logged and the computed value is
/// still returned.
pub fn similarity<S: RatingStore + ?Sized>(
	store: &mut S,
	a: ItemId,
	b: ItemId,
	ratings: &RatingMatrix,
	averages: &UserAverages,
) -> f64 {
	let Some(pair) = CanonicalPair::new(a, b) else {
		return 1.0;
	};

	match store.get_similarity(pair) {
		Ok(Some(stored)) => return stored,
		Ok(None) => {}
		Err(e) => {
			tracing::warn!(item1 = pair.lo, item2 = pair.hi, "Similarity lookup failed: {}", e);
		}
	}

	let set = co_rated(ratings.item_ratings(pair.lo), ratings.item_ratings(pair.hi));
	let value = adjusted_cosine(&set, averages);
	tracing::debug!(
		item1 = pair.lo,
		item2 = pair.hi,
		co_raters = set.len(),
		similarity = value,
		"Computed similarity"
	);

	if let Err(e) = store.store_similarity(pair, value) {
		tracing::warn!(item1 = pair.lo, item2 = pair.hi, "Failed to store similarity: {}", e);
	}

	value
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;

	use crate::error::RecommenderError;
	use crate::store::MemoryStore;
	use crate::types::{PredictionMethod, PredictionTable, UserId};

	fn matrix(triples: &[(UserId, ItemId, i64)]) -> RatingMatrix {
		RatingMatrix::from_triples(triples.iter().copied()).unwrap()
	}

	fn averages(pairs: &[(UserId, f64)]) -> UserAverages {
		pairs.iter().copied().collect()
	}

	/// Store whose every call fails, counting the calls it receives.
	#[derive(Default)]
	struct BrokenStore {
		reads: Cell<usize>,
		writes: usize,
	}

	impl RatingStore for BrokenStore {
		fn load_rating_matrix(&self) -> Result<RatingMatrix, RecommenderError> {
			Err(RecommenderError::Store("down".into()))
		}
		fn load_user_averages(&self) -> Result<UserAverages, RecommenderError> {
			Err(RecommenderError::Store("down".into()))
		}
		fn get_similarity(&self, _: CanonicalPair) -> Result<Option<f64>, RecommenderError> {
			self.reads.set(self.reads.get() + 1);
			Err(RecommenderError::Store("down".into()))
		}
		fn store_similarity(&mut self, _: CanonicalPair, _: f64) -> Result<(), RecommenderError> {
			self.writes += 1;
			Err(RecommenderError::Store("down".into()))
		}
		fn pending_predictions(
			&self,
			_: PredictionMethod,
		) -> Result<Vec<(UserId, ItemId)>, RecommenderError> {
			Err(RecommenderError::Store("down".into()))
		}
		fn store_prediction(
			&mut self,
			_: PredictionMethod,
			_: UserId,
			_: ItemId,
			_: f64,
		) -> Result<(), RecommenderError> {
			Err(RecommenderError::Store("down".into()))
		}
		fn load_known_predictions(&self) -> Result<PredictionTable, RecommenderError> {
			Err(RecommenderError::Store("down".into()))
		}
	}

	#[test]
	fn self_similarity_is_one_without_store_access() {
		let mut store = BrokenStore::default();
		let m = matrix(&[(1, 1, 3)]);
		assert_eq!(similarity(&mut store, 4, 4, &m, &UserAverages::new()), 1.0);
		assert_eq!(store.reads.get() + store.writes, 0);
	}

	#[test]
	fn perfectly_correlated_deviations() {
		let m = matrix(&[(1, 1, 5), (1, 2, 5), (2, 1, 1), (2, 2, 1)]);
		let avg = averages(&[(1, 3.0), (2, 3.0)]);
		let mut store = MemoryStore::new();
		let sim = similarity(&mut store, 1, 2, &m, &avg);
		assert!((sim - 1.0).abs() < 1e-12);
	}

	#[test]
	fn users_above_on_one_item_and_below_on_the_other() {
		// Both users sit 0.5 above their average on item 1 and 0.5 below on
		// item 2, so the centred vectors point in opposite directions.
		let m = matrix(&[(1, 1, 5), (2, 1, 3), (1, 2, 4), (2, 2, 2)]);
		let avg = averages(&[(1, 4.5), (2, 2.5)]);
		let set = co_rated(m.item_ratings(1), m.item_ratings(2));
		assert_eq!(set.len(), 2);
		let mut store = MemoryStore::new();
		let sim = similarity(&mut store, 1, 2, &m, &avg);
		assert!((sim + 1.0).abs() < 1e-12);
	}

	#[test]
	fn opposite_deviations_are_negative() {
		let m = matrix(&[(1, 1, 5), (2, 1, 1), (1, 2, 1), (2, 2, 5)]);
		let avg = averages(&[(1, 3.0), (2, 3.0)]);
		let mut store = MemoryStore::new();
		let sim = similarity(&mut store, 1, 2, &m, &avg);
		assert!((sim + 1.0).abs() < 1e-12);
	}

	#[test]
	fn no_co_raters_is_zero() {
		let m = matrix(&[(1, 1, 5), (2, 2, 3)]);
		let avg = averages(&[(1, 5.0), (2, 3.0)]);
		let mut store = MemoryStore::new();
		assert_eq!(similarity(&mut store, 1, 2, &m, &avg), 0.0);
	}

	#[test]
	fn zero_variance_is_zero() {
		// Every co-rater rates both items exactly at their average.
		let m = matrix(&[(1, 1, 4), (1, 2, 4), (2, 1, 2), (2, 2, 2)]);
		let avg = averages(&[(1, 4.0), (2, 2.0)]);
		let mut store = MemoryStore::new();
		let sim = similarity(&mut store, 1, 2, &m, &avg);
		assert_eq!(sim, 0.0);
		assert!(!sim.is_nan());
	}

	#[test]
	fn symmetric_and_stored_once() {
		let m = matrix(&[(1, 1, 5), (2, 1, 2), (3, 1, 4), (1, 2, 3), (2, 2, 1), (3, 2, 5)]);
		let avg = UserAverages::from_matrix(&m);
		let mut store = MemoryStore::new();
		let ab = similarity(&mut store, 1, 2, &m, &avg);
		let ba = similarity(&mut store, 2, 1, &m, &avg);
		assert_eq!(ab, ba);
		assert_eq!(store.similarity_count(), 1);
		assert!((-1.0..=1.0).contains(&ab));
	}

	#[test]
	fn stored_value_wins_over_changed_ratings() {
		let mut m = matrix(&[(1, 1, 5), (2, 1, 3), (1, 2, 4), (2, 2, 2)]);
		let avg = averages(&[(1, 4.5), (2, 2.5)]);
		let mut store = MemoryStore::new();
		let first = similarity(&mut store, 1, 2, &m, &avg);

		m.insert(1, 2, 1).unwrap();
		m.insert(2, 2, 5).unwrap();
		let second = similarity(&mut store, 2, 1, &m, &avg);
		assert_eq!(first, second);
	}

	#[test]
	fn store_failures_do_not_block_computation() {
		let m = matrix(&[(1, 1, 5), (2, 1, 3), (1, 2, 4), (2, 2, 2)]);
		let avg = averages(&[(1, 4.5), (2, 2.5)]);
		let mut store = BrokenStore::default();
		let sim = similarity(&mut store, 1, 2, &m, &avg);
		assert!((sim + 1.0).abs() < 1e-12);
		assert_eq!(store.reads.get(), 1);
		assert_eq!(store.writes, 1);
	}

	#[test]
	fn co_rater_without_average_is_skipped() {
		let m = matrix(&[(1, 1, 5), (2, 1, 3), (3, 1, 1), (1, 2, 4), (2, 2, 2), (3, 2, 5)]);
		let avg = averages(&[(1, 4.5), (2, 2.5)]);
		let set = co_rated(m.item_ratings(1), m.item_ratings(2));
		assert_eq!(set.len(), 3);
		assert!((adjusted_cosine(&set, &avg) + 1.0).abs() < 1e-12);
	}
}
