// ---------------------------------------------------------------------------
// Co-rated users — restrict two items' ratings to their common raters
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use crate::types::{Rating, UserId};

/// Ratings of two items by the users who rated both.
/// Both maps always share the same key set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoRated {
	pub first: HashMap<UserId, Rating>,
	pub second: HashMap<UserId, Rating>,
}

impl CoRated {
	pub fn len(&self) -> usize {
		self.first.len()
	}

	pub fn is_empty(&self) -> bool {
		self.first.is_empty()
	}

	/// `(user, first rating, second rating)` for every co-rater.
	pub fn iter(&self) -> impl Iterator<Item = (UserId, Rating, Rating)> + '_ {
		self.first
			.iter()
			.filter_map(|(&user, &r1)| self.second.get(&user).map(|&r2| (user, r1, r2)))
	}
}

/// Extract the co-rated working set for two items. A missing item behaves
/// as one nobody rated. Walks the smaller of the two maps.
pub fn co_rated(
	first: Option<&HashMap<UserId, Rating>>,
	second: Option<&HashMap<UserId, Rating>>,
) -> CoRated {
	let (Some(a), Some(b)) = (first, second) else {
		return CoRated::default();
	};

	let mut out = CoRated::default();
	if a.len() <= b.len() {
		for (&user, &ra) in a {
			if let Some(&rb) = b.get(&user) {
				out.first.insert(user, ra);
				out.second.insert(user, rb);
			}
		}
	} else {
		for (&user, &rb) in b {
			if let Some(&ra) = a.get(&user) {
				out.first.insert(user, ra);
				out.second.insert(user, rb);
			}
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn map(pairs: &[(UserId, Rating)]) -> HashMap<UserId, Rating> {
		pairs.iter().copied().collect()
	}

	#[test]
	fn keeps_only_common_users() {
		let a = map(&[(1, 5), (2, 3), (3, 1)]);
		let b = map(&[(2, 4), (3, 2), (4, 5)]);
		let set = co_rated(Some(&a), Some(&b));
		assert_eq!(set.len(), 2);
		assert_eq!(set.first, map(&[(2, 3), (3, 1)]));
		assert_eq!(set.second, map(&[(2, 4), (3, 2)]));
	}

	#[test]
	fn ratings_come_from_the_right_side_when_second_is_smaller() {
		let a = map(&[(1, 5), (2, 3), (3, 1), (4, 2)]);
		let b = map(&[(3, 4)]);
		let set = co_rated(Some(&a), Some(&b));
		assert_eq!(set.first, map(&[(3, 1)]));
		assert_eq!(set.second, map(&[(3, 4)]));
	}

	#[test]
	fn disjoint_or_missing_items_are_empty() {
		let a = map(&[(1, 5)]);
		let b = map(&[(2, 5)]);
		assert!(co_rated(Some(&a), Some(&b)).is_empty());
		assert!(co_rated(Some(&a), None).is_empty());
		assert!(co_rated(None, None).is_empty());
	}

	#[test]
	fn each_call_returns_a_fresh_set() {
		let a = map(&[(1, 5), (2, 3)]);
		let b = map(&[(1, 4), (2, 2)]);
		let c = map(&[(9, 1)]);
		let first = co_rated(Some(&a), Some(&b));
		let second = co_rated(Some(&a), Some(&c));
		assert_eq!(first.len(), 2);
		assert!(second.is_empty());
	}

	#[test]
	fn iter_pairs_ratings() {
		let a = map(&[(7, 2)]);
		let b = map(&[(7, 5)]);
		let rows: Vec<_> = co_rated(Some(&a), Some(&b)).iter().collect();
		assert_eq!(rows, vec![(7, 2, 5)]);
	}
}
