//! Matching and lifecycle engine for in-home nursing care requests.
//!
//! A request flows GeoIndex -> ranking -> assignment -> lifecycle: the index
//! produces nearby candidates, the ranker orders them, the coordinator binds
//! exactly one nurse to the request under concurrency pressure, and the
//! lifecycle drives the request through its status machine. Completed
//! requests feed the rating aggregator, which in turn shifts future rankings.

pub mod assignment;
pub mod domain;
pub mod geo;
pub mod lifecycle;
pub mod ranking;
pub mod rating;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentCoordinator, AssignmentError, NO_NURSE_AVAILABLE};
pub use domain::{
    Actor, ActorRole, GeoPoint, HistoryEntry, NurseId, NurseLocation, NurseProfile, PatientId,
    RequestId, RequestStatus, RequestStatusView, Review, ReviewId, ReviewResponse, ServiceAddress,
    ServiceCategory, ServiceId, ServiceOffering, ServiceRequest, TimeSlot, ValidationError,
};
pub use geo::{
    clamp_radius, haversine_km, CandidateFilters, GeoIndex, GeoQuery, NurseCandidate,
    NursePresence, DEFAULT_RADIUS_KM, MAX_RADIUS_KM, MIN_RADIUS_KM,
};
pub use lifecycle::{transition_allowed, RequestLifecycle, TransitionError};
pub use ranking::{rank, RankedCandidates, RankingWeights, ScoreBreakdown, ScoredCandidate};
pub use rating::{RatingAggregator, RatingFold};
pub use repository::{
    NotificationPublisher, NotifyError, NurseRepository, RepositoryError, RequestEvent,
    RequestRepository, ReviewRepository,
};
pub use router::matching_router;
pub use service::{
    MatchingConfig, MatchingService, MatchingServiceError, NewServiceRequest, NurseRegistration,
    ReviewError, ReviewSubmission, SearchQuery,
};
