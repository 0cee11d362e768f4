// ---------------------------------------------------------------------------
// Rating prediction — similarity-weighted sums over the user's rated items
// ---------------------------------------------------------------------------
//
// Two formulas share the same fallback ladder:
//   1. weighted sum, when its denominator is non-zero (clamped to [1, 5])
//   2. the user's average rating, when the user has one
//   3. the item's mean rating across all raters
// `predict_adjusted` skips straight to 3 for users without an average.
// ---------------------------------------------------------------------------

use crate::baseline::baseline;
use crate::error::RecommenderError;
use crate::similarity::similarity;
use crate::store::RatingStore;
use crate::types::{clamp_rating, ItemId, PredictionMethod, RatingMatrix, UserAverages, UserId};

/// Predict `user`'s rating for `item` from non-negative similarities only.
///
/// `prediction = Σ sim·rating / Σ sim` over every item the user rated whose
/// similarity to `item` is ≥ 0. Stored in the basic prediction table.
pub fn predict_basic<S: RatingStore + ?Sized>(
	store: &mut S,
	user: UserId,
	item: ItemId,
	ratings: &RatingMatrix,
	averages: &UserAverages,
) -> Result<f64, RecommenderError> {
	let mut numerator = 0.0;
	let mut denominator = 0.0;

	for (other, rating) in ratings.items_rated_by(user) {
		let sim = similarity(store, other, item, ratings, averages);
		if sim < 0.0 {
			continue;
		}
		numerator += sim * rating as f64;
		denominator += sim;
	}

	let prediction = if denominator == 0.0 {
		match averages.get(user) {
			Some(avg) => avg,
			None => item_average(item, ratings)?,
		}
	} else {
		clamp_rating(numerator / denominator)
	};

	persist(store, PredictionMethod::Basic, user, item, prediction);
	Ok(prediction)
}

/// Predict `user`'s rating for `item` using every similarity, negative ones
/// included, around a baseline estimate.
///
/// `prediction = baseline + Σ sim·(rating − baseline) / Σ |sim|`.
/// Stored in the adjusted prediction table.
pub fn predict_adjusted<S: RatingStore + ?Sized>(
	store: &mut S,
	user: UserId,
	item: ItemId,
	ratings: &RatingMatrix,
	averages: &UserAverages,
) -> Result<f64, RecommenderError> {
	let prediction = match averages.get(user) {
		None => item_average(item, ratings)?,
		Some(avg) => {
			let base = baseline(user, item, ratings, averages)?;

			let mut numerator = 0.0;
			let mut denominator = 0.0;
			for (other, rating) in ratings.items_rated_by(user) {
				let sim = similarity(store, other, item, ratings, averages);
				numerator += sim * (rating as f64 - base);
				denominator += sim.abs();
			}

			if denominator == 0.0 {
				avg
			} else {
				clamp_rating(numerator / denominator + base)
			}
		}
	};

	persist(store, PredictionMethod::Adjusted, user, item, prediction);
	Ok(prediction)
}

/// Predict with the given method.
pub fn predict<S: RatingStore + ?Sized>(
	store: &mut S,
	method: PredictionMethod,
	user: UserId,
	item: ItemId,
	ratings: &RatingMatrix,
	averages: &UserAverages,
) -> Result<f64, RecommenderError> {
	match method {
		PredictionMethod::Basic => predict_basic(store, user, item, ratings, averages),
		PredictionMethod::Adjusted => predict_adjusted(store, user, item, ratings, averages),
	}
}

fn item_average(item: ItemId, ratings: &RatingMatrix) -> Result<f64, RecommenderError> {
	ratings.item_average(item).ok_or_else(|| {
		RecommenderError::InsufficientData(format!(
			"item {} has no ratings to fall back on",
			item
		))
	})
}

fn persist<S: RatingStore + ?Sized>(
	store: &mut S,
	method: PredictionMethod,
	user: UserId,
	item: ItemId,
	prediction: f64,
) {
	if let Err(e) = store.store_prediction(method, user, item, prediction) {
		tracing::warn!(%method, user, item, "Failed to store prediction: {}", e);
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
