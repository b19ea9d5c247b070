use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use care_match::matching::{
    NotificationPublisher, NotifyError, NurseId, NurseProfile, NurseRepository, RepositoryError,
    RequestEvent, RequestId, RequestRepository, RequestStatus, Review, ReviewId, ReviewRepository,
    ServiceRequest,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestRepository {
    records: Arc<Mutex<HashMap<RequestId, ServiceRequest>>>,
}

impl RequestRepository for InMemoryRequestRepository {
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
                request.status == RequestStatus::Pending && request.created_at <= cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNurseRepository {
    records: Arc<Mutex<HashMap<NurseId, NurseProfile>>>,
}

impl NurseRepository for InMemoryNurseRepository {
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
pub(crate) struct InMemoryReviewRepository {
    records: Arc<Mutex<HashMap<ReviewId, Review>>>,
    by_request: Arc<Mutex<HashMap<RequestId, ReviewId>>>,
}

impl ReviewRepository for InMemoryReviewRepository {
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

/// Logs transition events; a real deployment plugs a push gateway in here.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationPublisher;

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, event: RequestEvent) -> Result<(), NotifyError> {
        info!(
            request_id = %event.request_id.0,
            status = event.status.label(),
            actor = event.actor.label(),
            "request event"
        );
        Ok(())
    }
}
