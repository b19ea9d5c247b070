use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::domain::{ActorRole, NurseId, RequestId, RequestStatus, ServiceRequest};
use super::repository::{NurseRepository, RepositoryError, RequestRepository};

/// Note recorded when the deadline sweep cancels an unanswered request.
pub const NO_NURSE_AVAILABLE: &str = "no nurse available";

/// Outcome of an assignment attempt that lost a race.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("assignment lost to a concurrent update")]
    Conflict,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Enforces at most one active assignment per nurse and at most one active
/// nurse per request.
///
/// Locking order is fixed: the nurse lock is taken first by compare-and-set,
/// then the request advances by revision compare-and-set. A loser on the
/// second step rolls the lock back, leaving no net side effect.
pub struct AssignmentCoordinator<R, N> {
    requests: Arc<R>,
    nurses: Arc<N>,
}

impl<R, N> AssignmentCoordinator<R, N>
where
    R: RequestRepository,
    N: NurseRepository,
{
    pub fn new(requests: Arc<R>, nurses: Arc<N>) -> Self {
        Self { requests, nurses }
    }

    /// Atomically bind a free nurse to a pending request.
    ///
    /// Exactly one of any set of racing callers succeeds; the others see
    /// `Conflict` and no side effects.
    pub fn try_assign(
        &self,
        request: &ServiceRequest,
        nurse_id: &NurseId,
        now: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<ServiceRequest, AssignmentError> {
        if request.status != RequestStatus::Pending {
            return Err(AssignmentError::Conflict);
        }

        match self
            .nurses
            .compare_and_set_assignment(nurse_id, None, Some(request.request_id.clone()))
        {
            Ok(()) => {}
            Err(RepositoryError::Conflict) => return Err(AssignmentError::Conflict),
            Err(other) => return Err(other.into()),
        }

        let mut next = request.clone();
        next.status = RequestStatus::Accepted;
        next.nurse_id = Some(nurse_id.clone());
        next.push_history(RequestStatus::Accepted, ActorRole::Nurse, now, note);

        match self.requests.update(next) {
            Ok(updated) => {
                info!(
                    request_id = %updated.request_id.0,
                    nurse_id = %nurse_id.0,
                    "request accepted"
                );
                Ok(updated)
            }
            Err(err) => {
                // The request moved first; give the lock back before failing.
                self.release(nurse_id, &request.request_id)?;
                match err {
                    RepositoryError::Conflict => Err(AssignmentError::Conflict),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Clear a nurse's lock for the given request. Idempotent: releasing an
    /// already-free nurse is a no-op, and a lock held for a different
    /// request is left alone.
    pub fn release(&self, nurse_id: &NurseId, request_id: &RequestId) -> Result<(), RepositoryError> {
        match self
            .nurses
            .compare_and_set_assignment(nurse_id, Some(request_id), None)
        {
            Ok(()) | Err(RepositoryError::Conflict) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Record a rejection and re-offer the request to the next ranked
    /// candidate. Rejection permanently removes the nurse from this
    /// request's pool; the request only turns terminal `rejected` once the
    /// pool is exhausted.
    pub fn advance_after_rejection(
        &self,
        request: &ServiceRequest,
        nurse_id: &NurseId,
        now: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<ServiceRequest, AssignmentError> {
        if request.status != RequestStatus::Pending {
            return Err(AssignmentError::Conflict);
        }

        let mut next = request.clone();
        next.declined.insert(nurse_id.clone());
        next.push_history(RequestStatus::Rejected, ActorRole::Nurse, now, note);
        next.nurse_id = next
            .candidate_queue
            .iter()
            .find(|candidate| !next.declined.contains(candidate))
            .cloned();
        if next.nurse_id.is_none() {
            next.status = RequestStatus::Rejected;
        }

        match self.requests.update(next) {
            Ok(updated) => {
                match &updated.nurse_id {
                    Some(offered) => debug!(
                        request_id = %updated.request_id.0,
                        nurse_id = %offered.0,
                        "request re-offered to next candidate"
                    ),
                    None => info!(
                        request_id = %updated.request_id.0,
                        "candidate pool exhausted, request rejected"
                    ),
                }
                Ok(updated)
            }
            Err(RepositoryError::Conflict) => Err(AssignmentError::Conflict),
            Err(other) => Err(other.into()),
        }
    }

    /// Cancel pending requests older than the re-matching deadline. Invoked
    /// by a scheduled sweep, never a blocking wait; a request accepted or
    /// cancelled while the sweep runs loses the revision race and is
    /// skipped.
    pub fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        deadline: Duration,
    ) -> Result<Vec<RequestId>, RepositoryError> {
        let cutoff = now - deadline;
        let mut cancelled = Vec::new();

        for request in self.requests.pending_created_before(cutoff)? {
            let mut next = request.clone();
            next.status = RequestStatus::Cancelled;
            next.push_history(
                RequestStatus::Cancelled,
                ActorRole::System,
                now,
                Some(NO_NURSE_AVAILABLE.to_string()),
            );

            match self.requests.update(next) {
                Ok(updated) => {
                    info!(request_id = %updated.request_id.0, "auto-cancelled unanswered request");
                    cancelled.push(updated.request_id);
                }
                Err(RepositoryError::Conflict) => continue,
                Err(other) => return Err(other),
            }
        }

        Ok(cancelled)
    }
}
