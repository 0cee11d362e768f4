// ---------------------------------------------------------------------------
// Recommender — the engine bound to a rating store
// ---------------------------------------------------------------------------
//
// Holds no working state between calls besides the store itself: the rating
// matrix and averages are passed in per call, and co-rated sets are built
// fresh for every similarity.
// ---------------------------------------------------------------------------

use crate::error::RecommenderError;
use crate::evaluation;
use crate::prediction;
use crate::similarity;
use crate::store::RatingStore;
use crate::types::{ItemId, PredictionMethod, PredictionTable, RatingMatrix, UserAverages, UserId};

/// Item-based collaborative filtering engine over a [`RatingStore`].
#[derive(Debug)]
pub struct Recommender<S> {
	store: S,
}

impl<S: RatingStore> Recommender<S> {
	pub fn new(store: S) -> Self {
		Self { store }
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn store_mut(&mut self) -> &mut S {
		&mut self.store
	}

	pub fn into_store(self) -> S {
		self.store
	}

	/// Adjusted cosine similarity between two items, in [-1, 1].
	pub fn similarity(
		&mut self,
		a: ItemId,
		b: ItemId,
		ratings: &RatingMatrix,
		averages: &UserAverages,
	) -> f64 {
		similarity::similarity(&mut self.store, a, b, ratings, averages)
	}

	/// Prediction excluding negative similarities, in [1, 5].
	pub fn predict_basic(
		&mut self,
		user: UserId,
		item: ItemId,
		ratings: &RatingMatrix,
		averages: &UserAverages,
	) -> Result<f64, RecommenderError> {
		prediction::predict_basic(&mut self.store, user, item, ratings, averages)
	}

	/// Baseline-adjusted prediction including negative similarities, in [1, 5].
	pub fn predict_adjusted(
		&mut self,
		user: UserId,
		item: ItemId,
		ratings: &RatingMatrix,
		averages: &UserAverages,
	) -> Result<f64, RecommenderError> {
		prediction::predict_adjusted(&mut self.store, user, item, ratings, averages)
	}

	pub fn predict(
		&mut self,
		method: PredictionMethod,
		user: UserId,
		item: ItemId,
		ratings: &RatingMatrix,
		averages: &UserAverages,
	) -> Result<f64, RecommenderError> {
		prediction::predict(&mut self.store, method, user, item, ratings, averages)
	}

	/// Mean absolute error of `predicted` against `ratings`.
	pub fn mean_absolute_error(
		&self,
		predicted: &PredictionTable,
		ratings: &RatingMatrix,
	) -> Result<f64, RecommenderError> {
		evaluation::mean_absolute_error(predicted, ratings)
	}
}
