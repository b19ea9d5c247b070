use super::common::*;
use crate::matching::domain::{Actor, RequestStatus, ServiceCategory};
use crate::matching::router::matching_router;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn search_route_returns_ranked_candidates() {
    let (service, _, _, _) = seeded_service();
    let router = matching_router(service);

    let payload = json!({
        "location": { "latitude": -12.0464, "longitude": -77.0428 },
        "radius_km": 10.0,
        "filters": { "category": "injection", "available_now": true }
    });
    let response = router
        .oneshot(json_request("POST", "/api/v1/nurses/search", payload))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let candidates = body.as_array().expect("array of candidates");
    assert_eq!(candidates.len(), 3);
    // Scores are descending.
    let scores: Vec<f64> = candidates
        .iter()
        .map(|candidate| candidate["score"].as_f64().expect("score"))
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn search_route_rejects_bad_coordinates() {
    let (service, _, _, _) = seeded_service();
    let router = matching_router(service);

    let payload = json!({
        "location": { "latitude": 91.0, "longitude": -77.0428 }
    });
    let response = router
        .oneshot(json_request("POST", "/api/v1/nurses/search", payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_and_fetch_request_roundtrip() {
    let (service, _, _, _) = seeded_service();
    let router = matching_router(service);

    let payload = json!({
        "patient_id": "patient-1",
        "nurse_id": "nurse-ana",
        "service_id": "svc-injection",
        "location": { "latitude": -12.0464, "longitude": -77.0428 },
        "address": {
            "street": "Jr. de la Union 300",
            "district": "Cercado de Lima",
            "city": "Lima"
        },
        "date": "2025-07-02",
        "time_slot": "morning"
    });
    let response = router
        .clone()
        .oneshot(json_request("POST", "/api/v1/requests", payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    let request_id = body["request_id"].as_str().expect("request id").to_string();
    assert_eq!(body["status"], json!("pending"));

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/api/v1/requests/{request_id}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["request_id"], json!(request_id));
}

#[tokio::test]
async fn transition_route_drives_the_state_machine() {
    let (service, _, _, _) = seeded_service();
    let now = fixed_now();
    let request = service
        .create_request(new_request("patient-1", "nurse-ana", ServiceCategory::Injection), now)
        .expect("request created");
    let router = matching_router(service);

    let payload = json!({
        "target": "accepted",
        "actor_role": "nurse",
        "actor_id": "nurse-ana"
    });
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/requests/{}/transitions", request.request_id.0),
            payload,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("accepted"));

    // An out-of-table transition comes back as a conflict.
    let payload = json!({
        "target": "completed",
        "actor_role": "nurse",
        "actor_id": "nurse-ana"
    });
    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/requests/{}/transitions", request.request_id.0),
            payload,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("invalid transition"));
}

#[tokio::test]
async fn transition_route_rejects_unknown_statuses() {
    let (service, _, _, _) = seeded_service();
    let now = fixed_now();
    let request = service
        .create_request(new_request("patient-1", "nurse-ana", ServiceCategory::Injection), now)
        .expect("request created");
    let router = matching_router(service);

    let payload = json!({
        "target": "teleported",
        "actor_role": "nurse",
        "actor_id": "nurse-ana"
    });
    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/requests/{}/transitions", request.request_id.0),
            payload,
        ))
        .await
        .expect("route executes");
    // The closed status enum rejects the payload during deserialization.
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_request_returns_not_found() {
    let (service, _, _, _) = seeded_service();
    let router = matching_router(service);

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/requests/req-missing")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn review_route_accepts_once_then_conflicts() {
    let (service, _, _, _) = seeded_service();
    let now = fixed_now();
    let request = service
        .create_request(new_request("patient-1", "nurse-ana", ServiceCategory::Injection), now)
        .expect("request created");
    let actor = Actor::nurse("nurse-ana");
    for target in [
        RequestStatus::Accepted,
        RequestStatus::OnTheWay,
        RequestStatus::Arrived,
        RequestStatus::InProgress,
        RequestStatus::Completed,
    ] {
        service
            .transition(&request.request_id, target, &actor, None, now)
            .expect("advance to completion");
    }
    let router = matching_router(service);

    let payload = json!({
        "patient_id": "patient-1",
        "rating": 5,
        "comment": "excellent care"
    });
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/requests/{}/review", request.request_id.0),
            payload.clone(),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    let review_id = body["review_id"].as_str().expect("review id").to_string();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/requests/{}/review", request.request_id.0),
            payload,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/reviews/{review_id}/response"),
            json!({ "nurse_id": "nurse-ana", "content": "thank you" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["response"]["content"], json!("thank you"));
}

#[tokio::test]
async fn presence_route_updates_the_index() {
    let (service, _, _, _) = seeded_service();
    let router = matching_router(service);

    // Ana drives out of town; a tight search no longer finds her.
    let response = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/nurses/nurse-ana/presence",
            json!({ "latitude": -12.5, "longitude": -76.8, "available": true }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/nurses/search",
            json!({
                "location": { "latitude": -12.0464, "longitude": -77.0428 },
                "radius_km": 5.0
            }),
        ))
        .await
        .expect("route executes");
    let body = read_json_body(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .expect("candidates")
        .iter()
        .map(|candidate| candidate["nurse_id"].as_str().expect("id"))
        .collect();
    assert!(!ids.contains(&"nurse-ana"));
    assert!(ids.contains(&"nurse-bea"));
}
