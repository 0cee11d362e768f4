use crate::error::RecommenderError;
use crate::types::{PredictionTable, RatingMatrix};

/// Mean absolute error of `predicted` against the true ratings.
///
/// Every predicted `(user, item)` must have a true rating in `ratings`;
/// an empty table is `NoData`.
pub fn mean_absolute_error(
	predicted: &PredictionTable,
	ratings: &RatingMatrix,
) -> Result<f64, RecommenderError> {
	if predicted.is_empty() {
		return Err(RecommenderError::NoData(
			"cannot compute MAE of an empty prediction set".into(),
		));
	}

	let mut total = 0.0;
	let mut n = 0usize;
	for (user, item, prediction) in predicted.entries() {
		let actual = ratings
			.rating(item, user)
			.ok_or(RecommenderError::MissingRating { user, item })?;
		total += (prediction - actual as f64).abs();
		n += 1;
	}

	Ok(total / n as f64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_predictions_have_zero_error() {
		let m = RatingMatrix::from_triples([(1, 1, 5), (2, 1, 3), (1, 2, 1)]).unwrap();
		let predicted: PredictionTable = m
			.triples()
			.map(|(u, i, r)| (u, i, r as f64))
			.collect();
		assert_eq!(mean_absolute_error(&predicted, &m).unwrap(), 0.0);
	}

	#[test]
	fn averages_absolute_differences() {
		let m = RatingMatrix::from_triples([(1, 1, 5), (2, 1, 3), (1, 2, 1)]).unwrap();
		let predicted: PredictionTable =
			[(1, 1, 4.0), (2, 1, 4.5), (1, 2, 1.5)].into_iter().collect();
		// (1.0 + 1.5 + 0.5) / 3
		let mae = mean_absolute_error(&predicted, &m).unwrap();
		assert!((mae - 1.0).abs() < 1e-12);
	}

	#[test]
	fn empty_set_is_no_data() {
		let m = RatingMatrix::from_triples([(1, 1, 5)]).unwrap();
		let err = mean_absolute_error(&PredictionTable::new(), &m).unwrap_err();
		assert_eq!(err.code(), "NO_DATA");
	}

	#[test]
	fn prediction_without_true_rating_is_rejected() {
		let m = RatingMatrix::from_triples([(1, 1, 5)]).unwrap();
		let predicted: PredictionTable = [(2, 1, 4.0)].into_iter().collect();
		assert!(matches!(
			mean_absolute_error(&predicted, &m),
			Err(RecommenderError::MissingRating { user: 2, item: 1 })
		));
	}
}
