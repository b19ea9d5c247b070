use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorRole, NurseId, NurseProfile, RequestId, RequestStatus, Review, ReviewId, ServiceRequest,
};

/// Error enumeration for storage failures.
///
/// `Conflict` signals a lost optimistic-concurrency race; callers refresh and
/// retry, the engine never retries internally. `Unavailable` propagates
/// unchanged to the caller.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record conflicts with a concurrent update")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for service requests.
///
/// Requests carry a `revision` counter: `update` must persist the record and
/// bump the revision only when the stored revision still matches, failing
/// with `Conflict` otherwise. That compare-and-set is the engine's only
/// write primitive for requests, so lost races surface instead of silently
/// overwriting state.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, request: ServiceRequest) -> Result<ServiceRequest, RepositoryError>;
    fn fetch(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError>;
    fn update(&self, request: ServiceRequest) -> Result<ServiceRequest, RepositoryError>;
    /// Pending requests created at or before the cutoff, for the deadline
    /// sweep.
    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ServiceRequest>, RepositoryError>;
}

/// Storage seam for nurse records.
///
/// The assignment field is owned by `compare_and_set_assignment`; `update`
/// must leave the stored assignment untouched so a rating fold can never
/// clobber a concurrently taken lock.
pub trait NurseRepository: Send + Sync {
    fn upsert(&self, profile: NurseProfile) -> Result<NurseProfile, RepositoryError>;
    fn fetch(&self, id: &NurseId) -> Result<Option<NurseProfile>, RepositoryError>;
    fn update(&self, profile: NurseProfile) -> Result<NurseProfile, RepositoryError>;
    /// Atomically swap `active_request_id` from `expected` to `next`,
    /// failing with `Conflict` when the stored value differs from
    /// `expected`.
    fn compare_and_set_assignment(
        &self,
        id: &NurseId,
        expected: Option<&RequestId>,
        next: Option<RequestId>,
    ) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<NurseProfile>, RepositoryError>;
}

/// Storage seam for reviews. `insert` is the atomic once-per-request claim:
/// it must fail with `Conflict` when a review for the same request exists.
/// Reviews carry the same revision contract as requests: `update` persists
/// and bumps the revision only when the stored revision still matches, so a
/// racing duplicate response conflicts instead of clobbering the first.
pub trait ReviewRepository: Send + Sync {
    fn insert(&self, review: Review) -> Result<Review, RepositoryError>;
    fn fetch(&self, id: &ReviewId) -> Result<Option<Review>, RepositoryError>;
    fn update(&self, review: Review) -> Result<Review, RepositoryError>;
}

/// Fire-and-forget event emitted on every request transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub actor: ActorRole,
    pub details: BTreeMap<String, String>,
}

/// Outbound notification hook (push gateway, e-mail adapter, ...). Delivery
/// failures never fail the transition that produced the event.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: RequestEvent) -> Result<(), NotifyError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
