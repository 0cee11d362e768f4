// ---------------------------------------------------------------------------
// Baseline predictor — additive user/item bias around the user's average
// ---------------------------------------------------------------------------

use crate::error::RecommenderError;
use crate::types::{ItemId, RatingMatrix, UserAverages, UserId};

/// Baseline estimate of `user`'s rating for `item`:
///
/// ```text
/// user_bias = mean over items rated by user of (rating - avg(user))
/// item_bias = mean over raters u of item of (rating(u) - user_bias - avg(user))
/// baseline  = item_bias + user_bias + avg(user)
/// ```
///
/// Both means are over non-empty sets; an empty set is reported as
/// `InsufficientData` rather than producing NaN.
pub fn baseline(
	user: UserId,
	item: ItemId,
	ratings: &RatingMatrix,
	averages: &UserAverages,
) -> Result<f64, RecommenderError> {
	let avg = averages.get(user).ok_or_else(|| {
		RecommenderError::InsufficientData(format!("user {} has no average rating", user))
	})?;

	let mut user_sum = 0.0;
	let mut rated = 0usize;
	for (_, rating) in ratings.items_rated_by(user) {
		user_sum += rating as f64 - avg;
		rated += 1;
	}
	if rated == 0 {
		return Err(RecommenderError::InsufficientData(format!(
			"user {} has not rated any item",
			user
		)));
	}
	let user_bias = user_sum / rated as f64;

	let raters = ratings
		.item_ratings(item)
		.filter(|r| !r.is_empty())
		.ok_or_else(|| {
			RecommenderError::InsufficientData(format!("item {} has no ratings", item))
		})?;
	let item_sum: f64 = raters
		.values()
		.map(|&rating| rating as f64 - user_bias - avg)
		.sum();
	let item_bias = item_sum / raters.len() as f64;

	Ok(item_bias + user_bias + avg)
}
