use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for nurses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NurseId(pub String);

/// Identifier wrapper for patients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientId(pub String);

/// Identifier wrapper for service requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for a nurse's published service offering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// Identifier wrapper for reviews.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(pub String);

/// Closed set of service categories the platform matches on. Unknown wire
/// values are rejected during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Injection,
    WoundCare,
    IvTherapy,
    VitalsCheck,
    ElderCare,
    Physiotherapy,
}

impl ServiceCategory {
    pub const fn label(self) -> &'static str {
        match self {
            ServiceCategory::Injection => "injection",
            ServiceCategory::WoundCare => "wound_care",
            ServiceCategory::IvTherapy => "iv_therapy",
            ServiceCategory::VitalsCheck => "vitals_check",
            ServiceCategory::ElderCare => "elder_care",
            ServiceCategory::Physiotherapy => "physiotherapy",
        }
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Boundary validation for caller-supplied coordinates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

/// Versioned location record. Updates replace the whole record, never patch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurseLocation {
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

/// A service a nurse offers at a published price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub service_id: ServiceId,
    pub category: ServiceCategory,
    pub price: u32,
}

/// Nurse record as held behind the repository seam.
///
/// `active_request_id` is owned by the assignment coordinator while `Some`
/// and is only ever changed through the dedicated compare-and-set primitive.
/// `rated_requests` records which requests have already been folded into the
/// rolling rating so duplicate review deliveries stay no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurseProfile {
    pub nurse_id: NurseId,
    pub full_name: String,
    pub location: NurseLocation,
    pub available: bool,
    pub offerings: Vec<ServiceOffering>,
    pub average_rating: f32,
    pub total_reviews: u32,
    pub active_request_id: Option<RequestId>,
    pub rated_requests: BTreeSet<RequestId>,
    pub revision: u64,
}

impl NurseProfile {
    pub fn offering(&self, service_id: &ServiceId) -> Option<&ServiceOffering> {
        self.offerings
            .iter()
            .find(|offering| &offering.service_id == service_id)
    }

    pub fn offering_for(&self, category: ServiceCategory) -> Option<&ServiceOffering> {
        self.offerings
            .iter()
            .find(|offering| offering.category == category)
    }
}

/// Requested visit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
    Asap,
}

impl TimeSlot {
    pub const fn label(self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Afternoon => "afternoon",
            TimeSlot::Evening => "evening",
            TimeSlot::Asap => "asap",
        }
    }
}

/// Status a service request moves through. The set is closed; anything else
/// on the wire is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    OnTheWay,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::OnTheWay => "on_the_way",
            RequestStatus::Arrived => "arrived",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Statuses during which the request holds the nurse lock.
    pub const fn is_in_flight(self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted
                | RequestStatus::OnTheWay
                | RequestStatus::Arrived
                | RequestStatus::InProgress
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Role attached to every state-changing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Nurse,
    System,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Patient => "patient",
            ActorRole::Nurse => "nurse",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated identity performing an operation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    pub id: String,
}

impl Actor {
    pub fn patient(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Patient,
            id: id.into(),
        }
    }

    pub fn nurse(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Nurse,
            id: id.into(),
        }
    }

    pub fn system() -> Self {
        Self {
            role: ActorRole::System,
            id: "system".to_string(),
        }
    }
}

/// Append-only audit entry recorded on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: RequestStatus,
    pub actor: ActorRole,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Street-level address attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub street: String,
    pub district: String,
    pub city: String,
}

/// A patient's request for an in-home visit.
///
/// `nurse_id` points at the currently offered or assigned nurse.
/// `candidate_queue` is the ranked pool captured at creation; `declined`
/// nurses are permanently out of that pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub request_id: RequestId,
    pub patient_id: PatientId,
    pub nurse_id: Option<NurseId>,
    pub service_id: ServiceId,
    pub category: ServiceCategory,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub location: GeoPoint,
    pub address: ServiceAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: RequestStatus,
    pub history: Vec<HistoryEntry>,
    pub candidate_queue: Vec<NurseId>,
    pub declined: BTreeSet<NurseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<ReviewId>,
    pub created_at: DateTime<Utc>,
    pub revision: u64,
}

impl ServiceRequest {
    pub fn push_history(
        &mut self,
        status: RequestStatus,
        actor: ActorRole,
        at: DateTime<Utc>,
        note: Option<String>,
    ) {
        self.history.push(HistoryEntry {
            status,
            actor,
            at,
            note,
        });
    }

    /// Whether a nurse is still in this request's candidate pool.
    pub fn is_candidate(&self, nurse_id: &NurseId) -> bool {
        !self.declined.contains(nurse_id) && self.candidate_queue.contains(nurse_id)
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            request_id: self.request_id.clone(),
            status: self.status.label(),
            nurse_id: self.nurse_id.clone(),
            rating: self.rating,
            history_len: self.history.len(),
        }
    }
}

/// Sanitized request summary for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nurse_id: Option<NurseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub history_len: usize,
}

/// Patient feedback on a completed request. Rating fields are immutable once
/// created; only the nurse response may be added afterwards, guarded by the
/// same revision counter the other records carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: ReviewId,
    pub request_id: RequestId,
    pub nurse_id: NurseId,
    pub patient_id: PatientId,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub allow_public_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ReviewResponse>,
    pub created_at: DateTime<Utc>,
    pub revision: u64,
}

/// A nurse's one-time reply to a review. Never feeds rating math.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub content: String,
    pub responded_at: DateTime<Utc>,
}

/// Malformed input rejected before any state change.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("rating {0} outside 1-5")]
    RatingOutOfRange(u8),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("nurse {nurse} does not offer service {service}")]
    UnknownService { nurse: String, service: String },
}
