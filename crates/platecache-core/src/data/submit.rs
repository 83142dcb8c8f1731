use tracing::{info, warn};

use crate::api::{ApiClient, SubmitOutcome};
use crate::models::{NewReview, Review};

/// How a review submission ended. Failures are reported here and in the
/// log; they are never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewSubmission {
    /// Offline: parked in the offline queue
    Queued,
    /// Server returned the stored review
    Created(Review),
    /// Server accepted the review without a JSON body
    Acknowledged,
    /// Network or server failure; the review was not stored
    Failed,
}

/// Post a review and log the outcome.
pub(crate) async fn send_review(api: &ApiClient, review: &NewReview) -> ReviewSubmission {
    match api.submit_review(review).await {
        Ok(SubmitOutcome::Created(created)) => {
            info!(review_id = created.id, restaurant_id = created.restaurant_id, "Review submitted");
            ReviewSubmission::Created(created)
        }
        Ok(SubmitOutcome::Acknowledged) => {
            info!(restaurant_id = review.restaurant_id, "Review submitted, server sent no JSON body");
            ReviewSubmission::Acknowledged
        }
        Err(e) => {
            warn!(restaurant_id = review.restaurant_id, error = %e, "Review submission failed");
            ReviewSubmission::Failed
        }
    }
}
