// ---------------------------------------------------------------------------
// Batch driver — resolve pending predictions, evaluate known ones
// ---------------------------------------------------------------------------

use serde::Serialize;

use crate::error::RecommenderError;
use crate::evaluation::mean_absolute_error;
use crate::recommender::Recommender;
use crate::store::RatingStore;
use crate::types::{PredictionMethod, RatingMatrix, UserAverages};

/// Outcome of a `run_pending` batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
	pub method: PredictionMethod,
	pub pending: usize,
	pub predicted: usize,
	pub skipped: usize,
	pub commits: usize,
}

/// Predict every pending `(user, item)` for `method`, flushing the store
/// after every `commit_every` predictions and once at the end.
///
/// Pairs without enough data to predict are logged and skipped. A failed
/// flush is logged; the run carries on. `commits` counts only flushes that
/// wrote something.
pub fn run_pending<S: RatingStore>(
	engine: &mut Recommender<S>,
	method: PredictionMethod,
	ratings: &RatingMatrix,
	averages: &UserAverages,
	commit_every: usize,
) -> Result<RunSummary, RecommenderError> {
	let pending = engine.store().pending_predictions(method)?;
	tracing::info!(%method, pending = pending.len(), "Starting prediction run");

	let mut summary = RunSummary {
		method,
		pending: pending.len(),
		predicted: 0,
		skipped: 0,
		commits: 0,
	};

	for (user, item) in pending {
		match engine.predict(method, user, item, ratings, averages) {
			Ok(prediction) => {
				summary.predicted += 1;
				tracing::debug!(%method, user, item, prediction, "Predicted");
			}
			Err(RecommenderError::InsufficientData(reason)) => {
				summary.skipped += 1;
				tracing::warn!(%method, user, item, "Skipping prediction: {}", reason);
				continue;
			}
			Err(e) => return Err(e),
		}

		if commit_every > 0 && summary.predicted % commit_every == 0 {
			commit(engine.store_mut(), &mut summary);
		}
	}

	commit(engine.store_mut(), &mut summary);

	tracing::info!(
		%method,
		predicted = summary.predicted,
		skipped = summary.skipped,
		"Prediction run finished"
	);
	Ok(summary)
}

fn commit<S: RatingStore>(store: &mut S, summary: &mut RunSummary) {
	match store.flush() {
		Ok(true) => summary.commits += 1,
		Ok(false) => {}
		Err(e) => tracing::warn!("Commit failed, results kept in memory only: {}", e),
	}
}

/// MAE of the store's known-prediction table against `ratings`.
pub fn evaluate<S: RatingStore + ?Sized>(
	store: &S,
	ratings: &RatingMatrix,
) -> Result<f64, RecommenderError> {
	let known = store.load_known_predictions()?;
	let mae = mean_absolute_error(&known, ratings)?;
	tracing::info!(entries = known.len(), mae, "Evaluated predictions");
	Ok(mae)
}
