use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use clap::Args;

use crate::infra::{
    InMemoryNurseRepository, InMemoryRequestRepository, InMemoryReviewRepository,
    LoggingNotificationPublisher,
};
use care_match::error::AppError;
use care_match::matching::{
    Actor, CandidateFilters, GeoPoint, MatchingConfig, MatchingService, MatchingServiceError,
    NewServiceRequest, NurseId, NurseRegistration, PatientId, RequestStatus, ReviewSubmission,
    SearchQuery, ServiceAddress, ServiceCategory, ServiceId, ServiceOffering, TimeSlot,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Visit date for the demo request (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long)]
    pub(crate) visit_date: Option<NaiveDate>,
    /// Skip the rejection/re-offer portion of the demo.
    #[arg(long)]
    pub(crate) skip_rematch: bool,
}

type DemoService = MatchingService<
    InMemoryRequestRepository,
    InMemoryNurseRepository,
    InMemoryReviewRepository,
    LoggingNotificationPublisher,
>;

fn offering(category: ServiceCategory, price: u32) -> ServiceOffering {
    ServiceOffering {
        service_id: ServiceId(format!("svc-{}", category.label())),
        category,
        price,
    }
}

fn seed_nurses(service: &DemoService) -> Result<(), MatchingServiceError> {
    let now = Utc::now();
    let roster = [
        ("nurse-ana", "Ana Quispe", -12.05, -77.04, 60),
        ("nurse-bea", "Beatriz Flores", -12.06, -77.05, 50),
        ("nurse-carla", "Carla Mendoza", -12.03, -77.03, 70),
    ];
    for (id, name, latitude, longitude, price) in roster {
        service.register_nurse(
            NurseRegistration {
                nurse_id: NurseId(id.to_string()),
                full_name: name.to_string(),
                location: GeoPoint::new(latitude, longitude),
                available: true,
                offerings: vec![
                    offering(ServiceCategory::Injection, price),
                    offering(ServiceCategory::VitalsCheck, price / 2),
                ],
            },
            now,
        )?;
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        visit_date,
        skip_rematch,
    } = args;
    let visit_date =
        visit_date.unwrap_or_else(|| (Utc::now() + Duration::days(1)).date_naive());

    let requests = Arc::new(InMemoryRequestRepository::default());
    let nurses = Arc::new(InMemoryNurseRepository::default());
    let reviews = Arc::new(InMemoryReviewRepository::default());
    let notifier = Arc::new(LoggingNotificationPublisher);
    let service = MatchingService::new(
        requests,
        nurses,
        reviews,
        notifier,
        MatchingConfig::default(),
    )
    .map_err(MatchingServiceError::from)?;

    println!("Nurse matching demo");
    seed_nurses(&service)?;

    let center = GeoPoint::new(-12.0464, -77.0428);
    let ranked = service.search(SearchQuery {
        location: center,
        radius_km: Some(10.0),
        filters: CandidateFilters {
            category: Some(ServiceCategory::Injection),
            available_now: true,
            ..CandidateFilters::default()
        },
    })?;

    println!("\nInjection nurses within 10 km of the Lima center:");
    for candidate in ranked.as_slice() {
        println!(
            "  {:<12} {:>5.2} km  score {:.3}  (S/ {} per visit)",
            candidate.nurse_id.0,
            candidate.distance_km,
            candidate.score,
            candidate.price.unwrap_or_default()
        );
    }

    let top = ranked
        .as_slice()
        .first()
        .expect("seeded roster yields candidates")
        .nurse_id
        .clone();
    let now = Utc::now();
    let request = service.create_request(
        NewServiceRequest {
            patient_id: PatientId("patient-demo".to_string()),
            nurse_id: top.clone(),
            service_id: ServiceId("svc-injection".to_string()),
            location: center,
            address: ServiceAddress {
                street: "Jr. de la Union 300".to_string(),
                district: "Cercado de Lima".to_string(),
                city: "Lima".to_string(),
            },
            date: visit_date,
            time_slot: TimeSlot::Morning,
            notes: Some("insulin injection, morning preferred".to_string()),
        },
        now,
    )?;
    println!(
        "\nCreated {} for {} ({} candidates queued)",
        request.request_id.0,
        visit_date,
        request.candidate_queue.len()
    );

    let mut current = request;
    if !skip_rematch {
        current = service.transition(
            &current.request_id,
            RequestStatus::Rejected,
            &Actor::nurse(top.0.clone()),
            Some("fully booked this morning".to_string()),
            Utc::now(),
        )?;
        let offered = current
            .nurse_id
            .clone()
            .expect("another candidate remains");
        println!("{} declined; re-offered to {}", top.0, offered.0);
    }

    let acceptor = current
        .nurse_id
        .clone()
        .expect("a candidate is on offer");
    for target in [
        RequestStatus::Accepted,
        RequestStatus::OnTheWay,
        RequestStatus::Arrived,
        RequestStatus::InProgress,
        RequestStatus::Completed,
    ] {
        current = service.transition(
            &current.request_id,
            target,
            &Actor::nurse(acceptor.0.clone()),
            None,
            Utc::now(),
        )?;
        println!("  -> {}", current.status.label());
    }

    let review = service.submit_review(
        ReviewSubmission {
            request_id: current.request_id.clone(),
            patient_id: current.patient_id.clone(),
            rating: 5,
            comment: Some("arrived on time, very professional".to_string()),
            allow_public_use: true,
        },
        Utc::now(),
    )?;
    println!(
        "\nReview {} recorded: {} stars for {}",
        review.review_id.0, review.rating, review.nurse_id.0
    );

    let audit: Vec<String> = current
        .history
        .iter()
        .map(|entry| format!("{} by {}", entry.status.label(), entry.actor.label()))
        .collect();
    println!("Audit trail: {}", audit.join(" -> "));

    Ok(())
}
