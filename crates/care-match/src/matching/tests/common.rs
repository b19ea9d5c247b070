use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::matching::domain::{
    GeoPoint, NurseId, NurseProfile, PatientId, RequestId, Review, ReviewId, ServiceAddress,
    ServiceCategory, ServiceId, ServiceOffering, ServiceRequest,
};
use crate::matching::repository::{
    NotificationPublisher, NotifyError, NurseRepository, RepositoryError, RequestEvent,
    RequestRepository, ReviewRepository,
};
use crate::matching::service::{
    MatchingConfig, MatchingService, NewServiceRequest, NurseRegistration, ReviewSubmission,
};
use crate::matching::TimeSlot;

pub(super) type MemoryService =
    MatchingService<MemoryRequests, MemoryNurses, MemoryReviews, MemoryNotifier>;

/// Plaza Mayor de Lima, the query point used throughout the scenarios.
pub(super) fn lima_center() -> GeoPoint {
    GeoPoint::new(-12.0464, -77.0428)
}

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn visit_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 2).expect("valid date")
}

pub(super) fn offering(category: ServiceCategory, price: u32) -> ServiceOffering {
    let service_id = ServiceId(format!("svc-{}", category.label()));
    ServiceOffering {
        service_id,
        category,
        price,
    }
}

pub(super) fn registration(
    id: &str,
    name: &str,
    latitude: f64,
    longitude: f64,
    offerings: Vec<ServiceOffering>,
) -> NurseRegistration {
    NurseRegistration {
        nurse_id: NurseId(id.to_string()),
        full_name: name.to_string(),
        location: GeoPoint::new(latitude, longitude),
        available: true,
        offerings,
    }
}

pub(super) fn new_request(patient: &str, nurse: &str, category: ServiceCategory) -> NewServiceRequest {
    NewServiceRequest {
        patient_id: PatientId(patient.to_string()),
        nurse_id: NurseId(nurse.to_string()),
        service_id: ServiceId(format!("svc-{}", category.label())),
        location: lima_center(),
        address: ServiceAddress {
            street: "Jr. de la Union 300".to_string(),
            district: "Cercado de Lima".to_string(),
            city: "Lima".to_string(),
        },
        date: visit_date(),
        time_slot: TimeSlot::Morning,
        notes: Some("ring the doorbell twice".to_string()),
    }
}

pub(super) fn review_submission(request_id: &RequestId, patient: &str, rating: u8) -> ReviewSubmission {
    ReviewSubmission {
        request_id: request_id.clone(),
        patient_id: PatientId(patient.to_string()),
        rating,
        comment: Some("professional and punctual".to_string()),
        allow_public_use: true,
    }
}

pub(super) fn build_service() -> (
    Arc<MemoryService>,
    Arc<MemoryRequests>,
    Arc<MemoryNurses>,
    Arc<MemoryNotifier>,
) {
    let requests = Arc::new(MemoryRequests::default());
    let nurses = Arc::new(MemoryNurses::default());
    let reviews = Arc::new(MemoryReviews::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = MatchingService::new(
        requests.clone(),
        nurses.clone(),
        reviews.clone(),
        notifier.clone(),
        MatchingConfig::default(),
    )
    .expect("service builds over empty stores");
    (Arc::new(service), requests, nurses, notifier)
}

/// Service pre-seeded with three injection nurses within 5 km of the Lima
/// center, ordered ana < bea < carla by id.
pub(super) fn seeded_service() -> (
    Arc<MemoryService>,
    Arc<MemoryRequests>,
    Arc<MemoryNurses>,
    Arc<MemoryNotifier>,
) {
    let (service, requests, nurses, notifier) = build_service();
    let now = fixed_now();

    service
        .register_nurse(
            registration(
                "nurse-ana",
                "Ana Quispe",
                -12.05,
                -77.04,
                vec![offering(ServiceCategory::Injection, 60)],
            ),
            now,
        )
        .expect("seed nurse-ana");
    service
        .register_nurse(
            registration(
                "nurse-bea",
                "Beatriz Flores",
                -12.06,
                -77.05,
                vec![
                    offering(ServiceCategory::Injection, 50),
                    offering(ServiceCategory::WoundCare, 80),
                ],
            ),
            now,
        )
        .expect("seed nurse-bea");
    service
        .register_nurse(
            registration(
                "nurse-carla",
                "Carla Mendoza",
                -12.03,
                -77.03,
                vec![offering(ServiceCategory::Injection, 70)],
            ),
            now,
        )
        .expect("seed nurse-carla");

    (service, requests, nurses, notifier)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRequests {
    records: Arc<Mutex<HashMap<RequestId, ServiceRequest>>>,
}

impl RequestRepository for MemoryRequests {
    fn insert(&self, mut request: ServiceRequest) -> Result<ServiceRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("request store mutex poisoned");
        if guard.contains_key(&request.request_id) {
            return Err(RepositoryError::Conflict);
        }
        request.revision = 1;
        guard.insert(request.request_id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<ServiceRequest>, RepositoryError> {
        let guard = self.records.lock().expect("request store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, mut request: ServiceRequest) -> Result<ServiceRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("request store mutex poisoned");
        let stored = guard
            .get_mut(&request.request_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != request.revision {
            return Err(RepositoryError::Conflict);
        }
        request.revision += 1;
        *stored = request.clone();
        Ok(request)
    }

    fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let guard = self.records.lock().expect("request store mutex poisoned");
        Ok(guard
            .values()
            .filter(|request| {
                request.status == crate::matching::RequestStatus::Pending
                    && request.created_at <= cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNurses {
    records: Arc<Mutex<HashMap<NurseId, NurseProfile>>>,
}

impl NurseRepository for MemoryNurses {
    fn upsert(&self, mut profile: NurseProfile) -> Result<NurseProfile, RepositoryError> {
        let mut guard = self.records.lock().expect("nurse store mutex poisoned");
        if let Some(existing) = guard.get(&profile.nurse_id) {
            profile.revision = existing.revision + 1;
            profile.active_request_id = existing.active_request_id.clone();
        } else {
            profile.revision = 1;
        }
        guard.insert(profile.nurse_id.clone(), profile.clone());
        Ok(profile)
    }

    fn fetch(&self, id: &NurseId) -> Result<Option<NurseProfile>, RepositoryError> {
        let guard = self.records.lock().expect("nurse store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, mut profile: NurseProfile) -> Result<NurseProfile, RepositoryError> {
        let mut guard = self.records.lock().expect("nurse store mutex poisoned");
        let stored = guard
            .get_mut(&profile.nurse_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != profile.revision {
            return Err(RepositoryError::Conflict);
        }
        profile.revision += 1;
        profile.active_request_id = stored.active_request_id.clone();
        *stored = profile.clone();
        Ok(profile)
    }

    fn compare_and_set_assignment(
        &self,
        id: &NurseId,
        expected: Option<&RequestId>,
        next: Option<RequestId>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("nurse store mutex poisoned");
        let stored = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if stored.active_request_id.as_ref() != expected {
            return Err(RepositoryError::Conflict);
        }
        stored.active_request_id = next;
        Ok(())
    }

    fn list(&self) -> Result<Vec<NurseProfile>, RepositoryError> {
        let guard = self.records.lock().expect("nurse store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryReviews {
    records: Arc<Mutex<HashMap<ReviewId, Review>>>,
    by_request: Arc<Mutex<HashMap<RequestId, ReviewId>>>,
}

impl ReviewRepository for MemoryReviews {
    fn insert(&self, mut review: Review) -> Result<Review, RepositoryError> {
        let mut by_request = self.by_request.lock().expect("review index mutex poisoned");
        if by_request.contains_key(&review.request_id) {
            return Err(RepositoryError::Conflict);
        }
        by_request.insert(review.request_id.clone(), review.review_id.clone());
        review.revision = 1;
        self.records
            .lock()
            .expect("review store mutex poisoned")
            .insert(review.review_id.clone(), review.clone());
        Ok(review)
    }

    fn fetch(&self, id: &ReviewId) -> Result<Option<Review>, RepositoryError> {
        let guard = self.records.lock().expect("review store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, mut review: Review) -> Result<Review, RepositoryError> {
        let mut guard = self.records.lock().expect("review store mutex poisoned");
        let stored = guard
            .get_mut(&review.review_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != review.revision {
            return Err(RepositoryError::Conflict);
        }
        review.revision += 1;
        *stored = review.clone();
        Ok(review)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<RequestEvent>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<RequestEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, event: RequestEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Notifier whose transport is always down, for fire-and-forget coverage.
pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _event: RequestEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("gateway offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
