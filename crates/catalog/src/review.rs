use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopswift_core::{DomainError, DomainResult, Entity, Patch, ProductId, ReviewId, UserId};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
const MAX_COMMENT_LEN: usize = 1000;

/// A shopper's rating of a product. At most one per (user, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Review {
    type Id = ReviewId;

    fn id(&self) -> ReviewId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReviewUpdate {
    pub rating: Option<u8>,
    pub comment: Patch<String>,
}

impl Review {
    pub fn create(
        user_id: UserId,
        product_id: ProductId,
        request: NewReview,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let review = Self {
            id: ReviewId::new(),
            user_id,
            product_id,
            rating: request.rating,
            comment: request.comment,
            created_at: now,
            updated_at: None,
        };
        review.validate()?;
        Ok(review)
    }

    pub fn apply_update(&mut self, update: ReviewUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(rating) = update.rating {
            next.rating = rating;
        }
        update.comment.apply_to(&mut next.comment);
        next.validate()?;
        next.updated_at = Some(now);
        *self = next;
        Ok(())
    }

    /// Only the author may change a review.
    pub fn ensure_author(&self, user_id: UserId) -> DomainResult<()> {
        if self.user_id != user_id {
            return Err(DomainError::forbidden("review belongs to another user"));
        }
        Ok(())
    }

    fn validate(&self) -> DomainResult<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(DomainError::validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_LEN {
                return Err(DomainError::validation(format!(
                    "comment cannot exceed {MAX_COMMENT_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_in_range() {
        for rating in [0u8, 6] {
            let err = Review::create(
                UserId::new(),
                ProductId::new(),
                NewReview { rating, comment: None },
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn only_the_author_may_edit() {
        let author = UserId::new();
        let review = Review::create(
            author,
            ProductId::new(),
            NewReview { rating: 4, comment: Some("solid".to_string()) },
            Utc::now(),
        )
        .unwrap();

        assert!(review.ensure_author(author).is_ok());
        assert!(matches!(
            review.ensure_author(UserId::new()),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn update_keeps_comment_when_absent() {
        let mut review = Review::create(
            UserId::new(),
            ProductId::new(),
            NewReview { rating: 2, comment: Some("meh".to_string()) },
            Utc::now(),
        )
        .unwrap();

        review
            .apply_update(ReviewUpdate { rating: Some(3), ..Default::default() }, Utc::now())
            .unwrap();

        assert_eq!(review.rating, 3);
        assert_eq!(review.comment.as_deref(), Some("meh"));
    }
}
