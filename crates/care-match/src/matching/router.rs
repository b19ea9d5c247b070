use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Actor, ActorRole, GeoPoint, NurseId, PatientId, RequestId, RequestStatus, ReviewId,
};
use super::lifecycle::TransitionError;
use super::repository::{
    NotificationPublisher, NurseRepository, RepositoryError, RequestRepository, ReviewRepository,
};
use super::service::{
    MatchingService, MatchingServiceError, NewServiceRequest, NurseRegistration, ReviewError,
    ReviewSubmission, SearchQuery,
};

/// Router builder exposing the matching surface over HTTP.
pub fn matching_router<R, N, V, P>(service: Arc<MatchingService<R, N, V, P>>) -> Router
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/nurses", post(register_nurse_handler::<R, N, V, P>))
        .route(
            "/api/v1/nurses/:nurse_id/presence",
            put(update_presence_handler::<R, N, V, P>),
        )
        .route("/api/v1/nurses/search", post(search_handler::<R, N, V, P>))
        .route("/api/v1/requests", post(create_request_handler::<R, N, V, P>))
        .route(
            "/api/v1/requests/:request_id",
            get(get_request_handler::<R, N, V, P>),
        )
        .route(
            "/api/v1/requests/:request_id/transitions",
            post(transition_handler::<R, N, V, P>),
        )
        .route(
            "/api/v1/requests/:request_id/review",
            post(review_handler::<R, N, V, P>),
        )
        .route(
            "/api/v1/reviews/:review_id/response",
            post(review_response_handler::<R, N, V, P>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PresenceBody {
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) available: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    pub(crate) target: RequestStatus,
    pub(crate) actor_role: ActorRole,
    pub(crate) actor_id: String,
    #[serde(default)]
    pub(crate) note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    pub(crate) patient_id: String,
    pub(crate) rating: u8,
    #[serde(default)]
    pub(crate) comment: Option<String>,
    #[serde(default)]
    pub(crate) allow_public_use: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewResponseBody {
    pub(crate) nurse_id: String,
    pub(crate) content: String,
}

pub(crate) async fn search_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    axum::Json(query): axum::Json<SearchQuery>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.search(query) {
        Ok(ranked) => (StatusCode::OK, axum::Json(ranked.as_slice().to_vec())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn register_nurse_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    axum::Json(registration): axum::Json<NurseRegistration>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.register_nurse(registration, Utc::now()) {
        Ok(profile) => (StatusCode::CREATED, axum::Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_presence_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    Path(nurse_id): Path<String>,
    axum::Json(body): axum::Json<PresenceBody>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    let point = GeoPoint::new(body.latitude, body.longitude);
    match service.update_presence(&NurseId(nurse_id), point, body.available, Utc::now()) {
        Ok(profile) => (StatusCode::OK, axum::Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_request_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    axum::Json(new_request): axum::Json<NewServiceRequest>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.create_request(new_request, Utc::now()) {
        Ok(request) => (StatusCode::CREATED, axum::Json(request)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_request_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.get_request(&RequestId(request_id)) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transition_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<TransitionBody>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    let actor = Actor {
        role: body.actor_role,
        id: body.actor_id,
    };
    match service.transition(
        &RequestId(request_id),
        body.target,
        &actor,
        body.note,
        Utc::now(),
    ) {
        Ok(request) => (StatusCode::OK, axum::Json(request.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    let submission = ReviewSubmission {
        request_id: RequestId(request_id),
        patient_id: PatientId(body.patient_id),
        rating: body.rating,
        comment: body.comment,
        allow_public_use: body.allow_public_use,
    };
    match service.submit_review(submission, Utc::now()) {
        Ok(review) => (StatusCode::CREATED, axum::Json(review)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_response_handler<R, N, V, P>(
    State(service): State<Arc<MatchingService<R, N, V, P>>>,
    Path(review_id): Path<String>,
    axum::Json(body): axum::Json<ReviewResponseBody>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NurseRepository + 'static,
    V: ReviewRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.respond_to_review(
        &ReviewId(review_id),
        &NurseId(body.nurse_id),
        body.content,
        Utc::now(),
    ) {
        Ok(review) => (StatusCode::OK, axum::Json(review)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: MatchingServiceError) -> Response {
    let status = match &err {
        MatchingServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MatchingServiceError::Transition(TransitionError::UnauthorizedActor { .. }) => {
            StatusCode::FORBIDDEN
        }
        MatchingServiceError::Transition(TransitionError::Repository(inner)) => {
            repository_status(inner)
        }
        MatchingServiceError::Transition(_) => StatusCode::CONFLICT,
        MatchingServiceError::Review(ReviewError::NotOwner | ReviewError::NotReviewedNurse) => {
            StatusCode::FORBIDDEN
        }
        MatchingServiceError::Review(_) => StatusCode::CONFLICT,
        MatchingServiceError::Repository(inner) => repository_status(inner),
    };

    let body = json!({ "error": err.to_string() });
    (status, axum::Json(body)).into_response()
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
