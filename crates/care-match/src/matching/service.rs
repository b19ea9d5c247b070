use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ActorRole, GeoPoint, NurseId, NurseLocation, NurseProfile, PatientId, RequestId,
    RequestStatus, Review, ReviewId, ReviewResponse, ServiceAddress, ServiceId, ServiceOffering,
    ServiceRequest, TimeSlot, ValidationError,
};
use super::geo::{
    clamp_radius, CandidateFilters, GeoIndex, GeoQuery, NursePresence, DEFAULT_RADIUS_KM,
};
use super::lifecycle::{publish_transition, RequestLifecycle, TransitionError};
use super::ranking::{rank, RankedCandidates, RankingWeights};
use super::rating::{RatingAggregator, RatingFold};
use super::repository::{
    NotificationPublisher, NurseRepository, RepositoryError, RequestRepository, ReviewRepository,
};

/// Tunables for matching and re-matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub weights: RankingWeights,
    pub default_radius_km: f64,
    /// Minutes a request may sit pending before the sweep cancels it.
    pub rematch_deadline_minutes: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            default_radius_km: DEFAULT_RADIUS_KM,
            rematch_deadline_minutes: 10,
        }
    }
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REVIEW_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

fn next_review_id() -> ReviewId {
    let id = REVIEW_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ReviewId(format!("rev-{id:06}"))
}

/// Candidate search parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub location: GeoPoint,
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub filters: CandidateFilters,
}

/// Nurse onboarding payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NurseRegistration {
    pub nurse_id: NurseId,
    pub full_name: String,
    pub location: GeoPoint,
    pub available: bool,
    pub offerings: Vec<ServiceOffering>,
}

/// Patient-facing request creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewServiceRequest {
    pub patient_id: PatientId,
    pub nurse_id: NurseId,
    pub service_id: ServiceId,
    pub location: GeoPoint,
    pub address: ServiceAddress,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Review submission payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub request_id: RequestId,
    pub patient_id: PatientId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub allow_public_use: bool,
}

/// Review-policy violations.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("request already rated")]
    AlreadyRated,
    #[error("request in status {status} is not ratable")]
    NotRatable { status: RequestStatus },
    #[error("only the requesting patient may submit a review")]
    NotOwner,
    #[error("review already has a response")]
    AlreadyResponded,
    #[error("only the reviewed nurse may respond")]
    NotReviewedNurse,
}

/// Error raised by the matching service.
#[derive(Debug, thiserror::Error)]
pub enum MatchingServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Service composing the geo index, ranker, coordinator, lifecycle, and
/// rating aggregator behind the repository seams.
pub struct MatchingService<R, N, V, P> {
    geo: Arc<GeoIndex>,
    requests: Arc<R>,
    nurses: Arc<N>,
    reviews: Arc<V>,
    notifier: Arc<P>,
    lifecycle: RequestLifecycle<R, N, P>,
    aggregator: RatingAggregator<N>,
    config: MatchingConfig,
}

impl<R, N, V, P> MatchingService<R, N, V, P>
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    /// Build the service and rebuild the geo index from the nurse store.
    pub fn new(
        requests: Arc<R>,
        nurses: Arc<N>,
        reviews: Arc<V>,
        notifier: Arc<P>,
        config: MatchingConfig,
    ) -> Result<Self, RepositoryError> {
        let geo = Arc::new(GeoIndex::new());
        for profile in nurses.list()? {
            geo.upsert(NursePresence::from_profile(&profile));
        }

        let lifecycle = RequestLifecycle::new(requests.clone(), nurses.clone(), notifier.clone());
        let aggregator = RatingAggregator::new(nurses.clone());

        Ok(Self {
            geo,
            requests,
            nurses,
            reviews,
            notifier,
            lifecycle,
            aggregator,
            config,
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Ranked candidates around a location.
    pub fn search(&self, query: SearchQuery) -> Result<RankedCandidates, MatchingServiceError> {
        let radius_km = clamp_radius(query.radius_km.unwrap_or(self.config.default_radius_km));
        let category = query.filters.category;
        let geo_query = GeoQuery {
            center: query.location,
            radius_km,
            filters: query.filters,
        };
        let found = self.geo.query(&geo_query)?;
        Ok(rank(&found, radius_km, category, &self.config.weights))
    }

    /// Register or replace a nurse profile and index its presence.
    pub fn register_nurse(
        &self,
        registration: NurseRegistration,
        now: DateTime<Utc>,
    ) -> Result<NurseProfile, MatchingServiceError> {
        registration.location.validate()?;
        if registration.nurse_id.0.trim().is_empty() {
            return Err(ValidationError::MissingField("nurse_id").into());
        }
        if registration.full_name.trim().is_empty() {
            return Err(ValidationError::MissingField("full_name").into());
        }
        if registration.offerings.is_empty() {
            return Err(ValidationError::MissingField("offerings").into());
        }

        let profile = NurseProfile {
            nurse_id: registration.nurse_id,
            full_name: registration.full_name,
            location: NurseLocation {
                point: registration.location,
                updated_at: now,
            },
            available: registration.available,
            offerings: registration.offerings,
            average_rating: 0.0,
            total_reviews: 0,
            active_request_id: None,
            rated_requests: BTreeSet::new(),
            revision: 0,
        };

        let stored = self.nurses.upsert(profile)?;
        self.geo.upsert(NursePresence::from_profile(&stored));
        Ok(stored)
    }

    /// Replace a nurse's location record and availability, keeping the geo
    /// index aligned with the store.
    pub fn update_presence(
        &self,
        nurse_id: &NurseId,
        point: GeoPoint,
        available: bool,
        now: DateTime<Utc>,
    ) -> Result<NurseProfile, MatchingServiceError> {
        point.validate()?;
        let mut profile = self
            .nurses
            .fetch(nurse_id)?
            .ok_or(RepositoryError::NotFound)?;
        profile.location = NurseLocation {
            point,
            updated_at: now,
        };
        profile.available = available;

        let stored = self.nurses.update(profile)?;
        self.geo.upsert(NursePresence::from_profile(&stored));
        Ok(stored)
    }

    /// Create a request in `pending`, capturing the ranked candidate queue
    /// with the patient's chosen nurse at its head.
    pub fn create_request(
        &self,
        new_request: NewServiceRequest,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, MatchingServiceError> {
        new_request.location.validate()?;
        if new_request.patient_id.0.trim().is_empty() {
            return Err(ValidationError::MissingField("patient_id").into());
        }

        let nurse = self
            .nurses
            .fetch(&new_request.nurse_id)?
            .ok_or(RepositoryError::NotFound)?;
        let offering = nurse.offering(&new_request.service_id).ok_or_else(|| {
            ValidationError::UnknownService {
                nurse: nurse.nurse_id.0.clone(),
                service: new_request.service_id.0.clone(),
            }
        })?;
        let category = offering.category;

        let ranked = self.search(SearchQuery {
            location: new_request.location,
            radius_km: None,
            filters: CandidateFilters {
                category: Some(category),
                available_now: true,
                ..CandidateFilters::default()
            },
        })?;
        let mut candidate_queue = ranked.nurse_ids();
        candidate_queue.retain(|candidate| candidate != &new_request.nurse_id);
        candidate_queue.insert(0, new_request.nurse_id.clone());

        let mut request = ServiceRequest {
            request_id: next_request_id(),
            patient_id: new_request.patient_id,
            nurse_id: Some(new_request.nurse_id),
            service_id: new_request.service_id,
            category,
            date: new_request.date,
            time_slot: new_request.time_slot,
            location: new_request.location,
            address: new_request.address,
            notes: new_request.notes.clone(),
            status: RequestStatus::Pending,
            history: Vec::new(),
            candidate_queue,
            declined: BTreeSet::new(),
            rating: None,
            review_id: None,
            created_at: now,
            revision: 0,
        };
        request.push_history(RequestStatus::Pending, ActorRole::Patient, now, new_request.notes);

        let stored = self.requests.insert(request)?;
        publish_transition(self.notifier.as_ref(), &stored, ActorRole::Patient, None);
        Ok(stored)
    }

    /// Apply a lifecycle transition on behalf of an actor.
    pub fn transition(
        &self,
        request_id: &RequestId,
        target: RequestStatus,
        actor: &Actor,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ServiceRequest, MatchingServiceError> {
        Ok(self
            .lifecycle
            .transition(request_id, target, actor, note, now)?)
    }

    /// Cancel requests that sat pending past the re-matching deadline.
    pub fn sweep_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestId>, MatchingServiceError> {
        let deadline = Duration::minutes(self.config.rematch_deadline_minutes);
        Ok(self.lifecycle.coordinator().sweep_expired(now, deadline)?)
    }

    pub fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<ServiceRequest, MatchingServiceError> {
        Ok(self
            .requests
            .fetch(request_id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    /// Accept a review for a completed request, once, from its owner, and
    /// fold it into the nurse's rating.
    pub fn submit_review(
        &self,
        submission: ReviewSubmission,
        now: DateTime<Utc>,
    ) -> Result<Review, MatchingServiceError> {
        if !(1..=5).contains(&submission.rating) {
            return Err(ValidationError::RatingOutOfRange(submission.rating).into());
        }

        let request = self
            .requests
            .fetch(&submission.request_id)?
            .ok_or(RepositoryError::NotFound)?;
        if request.patient_id != submission.patient_id {
            return Err(ReviewError::NotOwner.into());
        }
        if request.status != RequestStatus::Completed {
            return Err(ReviewError::NotRatable {
                status: request.status,
            }
            .into());
        }
        if request.rating.is_some() {
            return Err(ReviewError::AlreadyRated.into());
        }
        let nurse_id = request
            .nurse_id
            .clone()
            .ok_or(RepositoryError::NotFound)?;

        let review = Review {
            review_id: next_review_id(),
            request_id: request.request_id.clone(),
            nurse_id,
            patient_id: submission.patient_id,
            rating: submission.rating,
            comment: submission.comment,
            allow_public_use: submission.allow_public_use,
            response: None,
            created_at: now,
            revision: 0,
        };

        // Insert is the once-per-request claim; a concurrent duplicate loses
        // here and surfaces as AlreadyRated.
        let stored_review = match self.reviews.insert(review) {
            Ok(review) => review,
            Err(RepositoryError::Conflict) => return Err(ReviewError::AlreadyRated.into()),
            Err(other) => return Err(other.into()),
        };

        let mut next = request;
        next.rating = Some(stored_review.rating);
        next.review_id = Some(stored_review.review_id.clone());
        self.requests.update(next)?;

        if let RatingFold::Applied { profile } = self.aggregator.fold(&stored_review)? {
            self.geo.upsert(NursePresence::from_profile(&profile));
        }

        Ok(stored_review)
    }

    /// Attach the nurse's one-time reply to a review. Never touches rating
    /// math.
    pub fn respond_to_review(
        &self,
        review_id: &ReviewId,
        nurse_id: &NurseId,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Review, MatchingServiceError> {
        if content.trim().is_empty() {
            return Err(ValidationError::MissingField("content").into());
        }

        let mut review = self
            .reviews
            .fetch(review_id)?
            .ok_or(RepositoryError::NotFound)?;
        if &review.nurse_id != nurse_id {
            return Err(ReviewError::NotReviewedNurse.into());
        }
        if review.response.is_some() {
            return Err(ReviewError::AlreadyResponded.into());
        }

        review.response = Some(ReviewResponse {
            content,
            responded_at: now,
        });
        Ok(self.reviews.update(review)?)
    }
}
