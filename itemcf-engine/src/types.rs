// ---------------------------------------------------------------------------
// Data model — ratings, averages, canonical pairs, prediction tables
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RecommenderError;

pub type ItemId = u32;
pub type UserId = u32;
pub type Rating = u8;

pub const MIN_RATING: Rating = 1;
pub const MAX_RATING: Rating = 5;

/// Clamp a predicted value into the rating scale.
pub fn clamp_rating(value: f64) -> f64 {
	if value > MAX_RATING as f64 {
		MAX_RATING as f64
	} else if value < MIN_RATING as f64 {
		MIN_RATING as f64
	} else {
		value
	}
}

// ---------------------------------------------------------------------------
// Rating matrix
// ---------------------------------------------------------------------------

/// Sparse item -> (user -> rating) matrix. Every stored rating is in [1, 5].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingMatrix {
	items: HashMap<ItemId, HashMap<UserId, Rating>>,
}

impl RatingMatrix {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a matrix from `(user, item, rating)` triples.
	pub fn from_triples<I>(triples: I) -> Result<Self, RecommenderError>
	where
		I: IntoIterator<Item = (UserId, ItemId, i64)>,
	{
		let mut matrix = Self::new();
		for (user, item, rating) in triples {
			matrix.insert(user, item, rating)?;
		}
		Ok(matrix)
	}

	/// Insert or replace a rating. Returns the previous rating, if any.
	pub fn insert(
		&mut self,
		user: UserId,
		item: ItemId,
		rating: i64,
	) -> Result<Option<Rating>, RecommenderError> {
		if rating < MIN_RATING as i64 || rating > MAX_RATING as i64 {
			return Err(RecommenderError::InvalidRating { user, item, rating });
		}
		Ok(self
			.items
			.entry(item)
			.or_default()
			.insert(user, rating as Rating))
	}

	/// Every user who rated `item`, with their rating.
	pub fn item_ratings(&self, item: ItemId) -> Option<&HashMap<UserId, Rating>> {
		self.items.get(&item)
	}

	pub fn rating(&self, item: ItemId, user: UserId) -> Option<Rating> {
		self.items.get(&item).and_then(|r| r.get(&user).copied())
	}

	/// Every item rated by `user`, with the rating. Scans all items.
	pub fn items_rated_by(&self, user: UserId) -> impl Iterator<Item = (ItemId, Rating)> + '_ {
		self.items
			.iter()
			.filter_map(move |(&item, raters)| raters.get(&user).map(|&r| (item, r)))
	}

	/// Arithmetic mean of all known ratings for `item`; `None` when nobody rated it.
	pub fn item_average(&self, item: ItemId) -> Option<f64> {
		let raters = self.items.get(&item)?;
		if raters.is_empty() {
			return None;
		}
		let sum: f64 = raters.values().map(|&r| r as f64).sum();
		Some(sum / raters.len() as f64)
	}

	/// All ratings as `(user, item, rating)` triples, in no particular order.
	pub fn triples(&self) -> impl Iterator<Item = (UserId, ItemId, Rating)> + '_ {
		self.items.iter().flat_map(|(&item, raters)| {
			raters.iter().map(move |(&user, &rating)| (user, item, rating))
		})
	}

	pub fn item_count(&self) -> usize {
		self.items.len()
	}

	pub fn rating_count(&self) -> usize {
		self.items.values().map(|r| r.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.rating_count() == 0
	}
}

// ---------------------------------------------------------------------------
// User averages
// ---------------------------------------------------------------------------

/// User -> average rating. A missing user has rated nothing in the training data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserAverages(HashMap<UserId, f64>);

impl UserAverages {
	pub fn new() -> Self {
		Self::default()
	}

	/// Derive every user's mean rating from the matrix.
	pub fn from_matrix(matrix: &RatingMatrix) -> Self {
		let mut sums: HashMap<UserId, (f64, usize)> = HashMap::new();
		for (user, _, rating) in matrix.triples() {
			let entry = sums.entry(user).or_insert((0.0, 0));
			entry.0 += rating as f64;
			entry.1 += 1;
		}
		Self(
			sums.into_iter()
				.map(|(user, (sum, n))| (user, sum / n as f64))
				.collect(),
		)
	}

	pub fn get(&self, user: UserId) -> Option<f64> {
		self.0.get(&user).copied()
	}

	pub fn contains(&self, user: UserId) -> bool {
		self.0.contains_key(&user)
	}

	pub fn insert(&mut self, user: UserId, average: f64) {
		self.0.insert(user, average);
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (UserId, f64)> + '_ {
		self.0.iter().map(|(&u, &a)| (u, a))
	}
}

impl FromIterator<(UserId, f64)> for UserAverages {
	fn from_iter<T: IntoIterator<Item = (UserId, f64)>>(iter: T) -> Self {
		Self(iter.into_iter().collect())
	}
}

// ---------------------------------------------------------------------------
// Canonical pair
// ---------------------------------------------------------------------------

/// Unordered item pair, always held with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalPair {
	pub lo: ItemId,
	pub hi: ItemId,
}

impl CanonicalPair {
	/// `None` for `a == b`: self-similarity is never stored.
	pub fn new(a: ItemId, b: ItemId) -> Option<Self> {
		match a.cmp(&b) {
			std::cmp::Ordering::Less => Some(Self { lo: a, hi: b }),
			std::cmp::Ordering::Greater => Some(Self { lo: b, hi: a }),
			std::cmp::Ordering::Equal => None,
		}
	}
}

// ---------------------------------------------------------------------------
// Prediction method
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMethod {
	/// Weighted sum over non-negative similarities only.
	Basic,
	/// Baseline-adjusted weighted sum over all similarities.
	Adjusted,
}

impl PredictionMethod {
	pub const ALL: [PredictionMethod; 2] = [PredictionMethod::Basic, PredictionMethod::Adjusted];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Basic => "basic",
			Self::Adjusted => "adjusted",
		}
	}
}

impl fmt::Display for PredictionMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PredictionMethod {
	type Err = RecommenderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"basic" => Ok(Self::Basic),
			"adjusted" => Ok(Self::Adjusted),
			other => Err(RecommenderError::Serialization(format!(
				"Unknown prediction method: {}",
				other
			))),
		}
	}
}

// ---------------------------------------------------------------------------
// Prediction table
// ---------------------------------------------------------------------------

/// Item -> (user -> predicted rating). Input to MAE evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionTable {
	items: HashMap<ItemId, HashMap<UserId, f64>>,
}

impl PredictionTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, user: UserId, item: ItemId, prediction: f64) {
		self.items.entry(item).or_default().insert(user, prediction);
	}

	pub fn get(&self, user: UserId, item: ItemId) -> Option<f64> {
		self.items.get(&item).and_then(|u| u.get(&user).copied())
	}

	/// All entries as `(user, item, prediction)`.
	pub fn entries(&self) -> impl Iterator<Item = (UserId, ItemId, f64)> + '_ {
		self.items.iter().flat_map(|(&item, users)| {
			users.iter().map(move |(&user, &p)| (user, item, p))
		})
	}

	pub fn len(&self) -> usize {
		self.items.values().map(|u| u.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl FromIterator<(UserId, ItemId, f64)> for PredictionTable {
	fn from_iter<T: IntoIterator<Item = (UserId, ItemId, f64)>>(iter: T) -> Self {
		let mut table = Self::new();
		for (user, item, p) in iter {
			table.insert(user, item, p);
		}
		table
	}
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
	pub user: UserId,
	pub item: ItemId,
	pub rating: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
	pub item1: ItemId,
	pub item2: ItemId,
	pub similarity: f64,
}

/// A prediction slot; `prediction` is `None` until computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
	pub user: UserId,
	pub item: ItemId,
	pub prediction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPrediction {
	pub user: UserId,
	pub item: ItemId,
	pub prediction: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
