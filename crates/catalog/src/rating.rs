//! Per-product rating aggregation.
//!
//! Ratings are derived from reviews on read and never stored on the product.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use shopswift_core::ProductId;

/// Average rating and review count for one product.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub review_count: u32,
}

impl RatingSummary {
    /// Summary of a product with no reviews.
    pub const EMPTY: RatingSummary = RatingSummary {
        average_rating: 0.0,
        review_count: 0,
    };

    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let mut acc = Accumulator::default();
        for rating in ratings {
            acc.push(rating);
        }
        acc.summary()
    }
}

impl Default for RatingSummary {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: u64,
    count: u32,
}

impl Accumulator {
    fn push(&mut self, rating: u8) {
        self.sum += u64::from(rating);
        self.count += 1;
    }

    fn summary(self) -> RatingSummary {
        if self.count == 0 {
            return RatingSummary::EMPTY;
        }
        RatingSummary {
            average_rating: self.sum as f64 / f64::from(self.count),
            review_count: self.count,
        }
    }
}

/// Rating summaries for a batch of products, built in a single grouping pass.
#[derive(Debug, Clone, Default)]
pub struct RatingIndex {
    by_product: HashMap<ProductId, RatingSummary>,
}

impl RatingIndex {
    /// Group `(product, rating)` pairs by product.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ProductId, u8)>,
    {
        let mut groups: HashMap<ProductId, Accumulator> = HashMap::new();
        for (product_id, rating) in pairs {
            groups.entry(product_id).or_default().push(rating);
        }
        Self {
            by_product: groups
                .into_iter()
                .map(|(id, acc)| (id, acc.summary()))
                .collect(),
        }
    }

    /// Summary for `product_id`; products without reviews report `(0.0, 0)`.
    pub fn summary(&self, product_id: ProductId) -> RatingSummary {
        self.by_product
            .get(&product_id)
            .copied()
            .unwrap_or(RatingSummary::EMPTY)
    }

    /// Sort key for rating ordering (absent ratings count as 0).
    pub fn average(&self, product_id: ProductId) -> f64 {
        self.summary(product_id).average_rating
    }

    pub fn len(&self) -> usize {
        self.by_product.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_ratings_per_product() {
        let p = ProductId::new();
        let summary = RatingSummary::from_ratings([5, 3, 4]);
        assert_eq!(summary.average_rating, 4.0);
        assert_eq!(summary.review_count, 3);

        let index = RatingIndex::from_pairs([(p, 5), (p, 3), (p, 4)]);
        assert_eq!(index.summary(p), summary);
    }

    #[test]
    fn product_without_reviews_reports_zero() {
        let index = RatingIndex::from_pairs([(ProductId::new(), 2)]);
        assert_eq!(index.summary(ProductId::new()), RatingSummary::EMPTY);
        assert_eq!(RatingSummary::from_ratings([]), RatingSummary::EMPTY);
    }

    #[test]
    fn groups_ratings_of_several_products() {
        let a = ProductId::new();
        let b = ProductId::new();
        let index = RatingIndex::from_pairs([(a, 1), (b, 5), (a, 2), (b, 4)]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.summary(a).average_rating, 1.5);
        assert_eq!(index.summary(b).average_rating, 4.5);
        assert_eq!(index.summary(b).review_count, 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the average stays within the rating range and counts match.
            #[test]
            fn average_is_bounded_by_inputs(ratings in proptest::collection::vec(1u8..=5, 1..50)) {
                let summary = RatingSummary::from_ratings(ratings.iter().copied());
                let min = f64::from(*ratings.iter().min().unwrap());
                let max = f64::from(*ratings.iter().max().unwrap());

                prop_assert_eq!(summary.review_count as usize, ratings.len());
                prop_assert!(summary.average_rating >= min && summary.average_rating <= max);
            }

            /// Property: grouping is independent of input order.
            #[test]
            fn grouping_ignores_order(ratings in proptest::collection::vec((0usize..3, 1u8..=5), 0..40)) {
                let ids = [ProductId::new(), ProductId::new(), ProductId::new()];
                let pairs: Vec<_> = ratings.iter().map(|(i, r)| (ids[*i], *r)).collect();
                let forward = RatingIndex::from_pairs(pairs.iter().copied());
                let backward = RatingIndex::from_pairs(pairs.iter().rev().copied());

                for id in ids {
                    prop_assert_eq!(forward.summary(id).review_count, backward.summary(id).review_count);
                    prop_assert!((forward.average(id) - backward.average(id)).abs() < 1e-9);
                }
            }
        }
    }
}
