use std::sync::Arc;

use tracing::debug;

use super::domain::{NurseProfile, Review};
use super::repository::{NurseRepository, RepositoryError};

/// Result of folding a review into a nurse's rolling rating.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingFold {
    Applied { profile: NurseProfile },
    /// The request was already folded; duplicate deliveries are a no-op.
    Duplicate,
}

/// Folds completed-request reviews into the nurse's rolling average.
pub struct RatingAggregator<N> {
    nurses: Arc<N>,
}

impl<N> RatingAggregator<N>
where
    N: NurseRepository,
{
    pub fn new(nurses: Arc<N>) -> Self {
        Self { nurses }
    }

    /// Recompute the running weighted mean and bump the review count, once
    /// per request identity.
    pub fn fold(&self, review: &Review) -> Result<RatingFold, RepositoryError> {
        let mut nurse = self
            .nurses
            .fetch(&review.nurse_id)?
            .ok_or(RepositoryError::NotFound)?;

        if nurse.rated_requests.contains(&review.request_id) {
            debug!(
                nurse_id = %nurse.nurse_id.0,
                request_id = %review.request_id.0,
                "review already folded, skipping"
            );
            return Ok(RatingFold::Duplicate);
        }

        let total = nurse.total_reviews;
        nurse.average_rating =
            (nurse.average_rating * total as f32 + f32::from(review.rating)) / (total + 1) as f32;
        nurse.total_reviews = total + 1;
        nurse.rated_requests.insert(review.request_id.clone());

        let profile = self.nurses.update(nurse)?;
        Ok(RatingFold::Applied { profile })
    }
}
