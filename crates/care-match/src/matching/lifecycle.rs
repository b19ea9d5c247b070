use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::assignment::{AssignmentCoordinator, AssignmentError};
use super::domain::{Actor, ActorRole, NurseId, RequestId, RequestStatus, ServiceRequest};
use super::repository::{
    NotificationPublisher, NurseRepository, RepositoryError, RequestEvent, RequestRepository,
};

/// State machine violations and lost races during a transition. The request
/// is left unchanged in every error case.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("{role} is not permitted to perform this transition")]
    UnauthorizedActor { role: ActorRole },
    #[error("transition lost a concurrent update; refresh and retry")]
    Conflict,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The table from the platform's request state machine, as a predicate.
pub fn transition_allowed(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Pending, Accepted)
            | (Pending, Rejected)
            | (Accepted, OnTheWay)
            | (OnTheWay, Arrived)
            | (Arrived, InProgress)
            | (InProgress, Completed)
            | (Pending, Cancelled)
            | (Accepted, Cancelled)
            | (OnTheWay, Cancelled)
    )
}

/// Drives a request through its status transitions, appending exactly one
/// history entry per successful transition and applying the per-transition
/// effects (lock acquisition, release, candidate advancement).
pub struct RequestLifecycle<R, N, P> {
    requests: Arc<R>,
    notifier: Arc<P>,
    coordinator: AssignmentCoordinator<R, N>,
}

impl<R, N, P> RequestLifecycle<R, N, P>
where
    R: RequestRepository,
    N: NurseRepository,
    P: NotificationPublisher,
{
    pub fn new(requests: Arc<R>, nurses: Arc<N>, notifier: Arc<P>) -> Self {
        let coordinator = AssignmentCoordinator::new(requests.clone(), nurses);
        Self {
            requests,
            notifier,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &AssignmentCoordinator<R, N> {
        &self.coordinator
    }

    /// Apply one transition on behalf of an actor.
    pub fn transition(
        &self,
        request_id: &RequestId,
        target: RequestStatus,
        actor: &Actor,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, TransitionError> {
        let request = self
            .requests
            .fetch(request_id)?
            .ok_or(RepositoryError::NotFound)?;
        let from = request.status;

        if !transition_allowed(from, target) {
            return Err(TransitionError::InvalidTransition { from, to: target });
        }
        authorize(&request, target, actor)?;

        let updated = match target {
            RequestStatus::Accepted => {
                let nurse_id = NurseId(actor.id.clone());
                self.coordinator
                    .try_assign(&request, &nurse_id, now, note.clone())
                    .map_err(from_assignment)?
            }
            RequestStatus::Rejected => {
                let nurse_id = NurseId(actor.id.clone());
                self.coordinator
                    .advance_after_rejection(&request, &nurse_id, now, note.clone())
                    .map_err(from_assignment)?
            }
            RequestStatus::OnTheWay | RequestStatus::Arrived | RequestStatus::InProgress => {
                let mut next = request.clone();
                next.status = target;
                next.push_history(target, actor.role, now, note.clone());
                self.update_or_conflict(next)?
            }
            RequestStatus::Completed => {
                let mut next = request.clone();
                next.status = RequestStatus::Completed;
                next.push_history(RequestStatus::Completed, actor.role, now, note.clone());
                let updated = self.update_or_conflict(next)?;
                self.release_if_assigned(&updated)?;
                updated
            }
            RequestStatus::Cancelled => {
                let mut next = request.clone();
                next.status = RequestStatus::Cancelled;
                next.push_history(RequestStatus::Cancelled, actor.role, now, note.clone());
                let updated = self.update_or_conflict(next)?;
                if from.is_in_flight() {
                    self.release_if_assigned(&updated)?;
                }
                updated
            }
            RequestStatus::Pending => {
                return Err(TransitionError::InvalidTransition { from, to: target })
            }
        };

        publish_transition(self.notifier.as_ref(), &updated, actor.role, note.as_deref());
        Ok(updated)
    }

    fn update_or_conflict(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceRequest, TransitionError> {
        match self.requests.update(request) {
            Ok(updated) => Ok(updated),
            Err(RepositoryError::Conflict) => Err(TransitionError::Conflict),
            Err(other) => Err(other.into()),
        }
    }

    fn release_if_assigned(&self, request: &ServiceRequest) -> Result<(), TransitionError> {
        if let Some(nurse_id) = &request.nurse_id {
            self.coordinator.release(nurse_id, &request.request_id)?;
        }
        Ok(())
    }
}

fn from_assignment(err: AssignmentError) -> TransitionError {
    match err {
        AssignmentError::Conflict => TransitionError::Conflict,
        AssignmentError::Repository(inner) => inner.into(),
    }
}

/// Explicit actor-capability check per transition.
fn authorize(
    request: &ServiceRequest,
    target: RequestStatus,
    actor: &Actor,
) -> Result<(), TransitionError> {
    let unauthorized = TransitionError::UnauthorizedActor { role: actor.role };

    match target {
        // Any pooled nurse that has not declined may accept or reject.
        RequestStatus::Accepted | RequestStatus::Rejected => {
            if actor.role != ActorRole::Nurse {
                return Err(unauthorized);
            }
            let nurse_id = NurseId(actor.id.clone());
            if !request.is_candidate(&nurse_id) {
                return Err(unauthorized);
            }
            Ok(())
        }
        RequestStatus::OnTheWay
        | RequestStatus::Arrived
        | RequestStatus::InProgress
        | RequestStatus::Completed => {
            let is_assigned_nurse = actor.role == ActorRole::Nurse
                && request
                    .nurse_id
                    .as_ref()
                    .is_some_and(|nurse| nurse.0 == actor.id);
            if is_assigned_nurse {
                Ok(())
            } else {
                Err(unauthorized)
            }
        }
        RequestStatus::Cancelled => match actor.role {
            ActorRole::Patient if request.patient_id.0 == actor.id => Ok(()),
            ActorRole::Nurse
                if request
                    .nurse_id
                    .as_ref()
                    .is_some_and(|nurse| nurse.0 == actor.id) =>
            {
                Ok(())
            }
            ActorRole::System => Ok(()),
            _ => Err(unauthorized),
        },
        RequestStatus::Pending => Err(unauthorized),
    }
}

/// Emit a transition event. Delivery is fire-and-forget: failures are logged
/// and swallowed so a dead notifier cannot fail the transition itself.
pub(crate) fn publish_transition<P: NotificationPublisher + ?Sized>(
    notifier: &P,
    request: &ServiceRequest,
    actor: ActorRole,
    note: Option<&str>,
) {
    let mut details = BTreeMap::new();
    if let Some(nurse_id) = &request.nurse_id {
        details.insert("nurse_id".to_string(), nurse_id.0.clone());
    }
    if let Some(note) = note {
        details.insert("note".to_string(), note.to_string());
    }

    let event = RequestEvent {
        request_id: request.request_id.clone(),
        status: request.status,
        actor,
        details,
    };

    if let Err(err) = notifier.publish(event) {
        warn!(
            request_id = %request.request_id.0,
            error = %err,
            "dropping transition notification"
        );
    }
}
