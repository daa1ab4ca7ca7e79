mod common;

use std::time::Duration;

use axum::{Json, Router, routing};
use medicart_orderservice::{
    api::ApiUrls,
    app_error::AppError,
    domain::{
        prescriptions::VerificationOutcome,
        roles::{Actor, Role},
    },
    services::{carts, prescriptions},
};
use reqwest::Client;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Serves a fixed OCR result and returns collaborator URLs pointing at it.
async fn ocr_stub(text: &'static str) -> ApiUrls {
    let app = Router::new().route(
        "/ocr-service/extract",
        routing::post(move |Json(_): Json<Value>| async move { Json(json!({ "text": text })) }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ApiUrls::with_base(&format!("http://{addr}"), Duration::from_secs(2))
}

#[tokio::test]
async fn matching_scan_verifies_automatically() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();
    let urls = ocr_stub("Dr. Who\nRx: AMOXICILLIN   500mg\n1 tab twice daily").await;

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let rx = common::seed_medicine(conn, pharmacy.id, "Amoxicillin 500mg", "12.00", true, Some(5)).await;
    carts::add_medicines(conn, patient.id, vec![(rx.id, 1)])
        .await
        .unwrap();

    let (prescription, outcome) =
        prescriptions::upload(conn, &Client::new(), &urls, patient.id, "rx/1.png".into())
            .await
            .unwrap();

    assert_eq!(outcome, VerificationOutcome::Verified);
    assert!(prescription.verified);
    assert!(!prescription.used);
    assert!(prescription.notes.contains("AMOXICILLIN"));
}

#[tokio::test]
async fn partial_match_is_left_for_review() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();
    let urls = ocr_stub("Rx: insulin glargine").await;

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let insulin = common::seed_medicine(conn, pharmacy.id, "Insulin Glargine", "30.00", true, Some(5)).await;
    let warfarin = common::seed_medicine(conn, pharmacy.id, "Warfarin", "8.00", true, Some(5)).await;
    carts::add_medicines(conn, patient.id, vec![(insulin.id, 1), (warfarin.id, 1)])
        .await
        .unwrap();

    let (prescription, outcome) =
        prescriptions::upload(conn, &Client::new(), &urls, patient.id, "rx/2.png".into())
            .await
            .unwrap();

    assert_eq!(
        outcome,
        VerificationOutcome::Unmatched {
            missing: vec!["Warfarin".into()]
        }
    );
    assert!(!prescription.verified);

    let pharmacist = Actor::new(pharmacy.id, Role::Pharmacist);
    let verified = prescriptions::verify_manually(conn, pharmacist, prescription.id)
        .await
        .unwrap();
    assert!(verified.verified);
    assert_eq!(verified.verified_by, Some(pharmacy.id));
}

#[tokio::test]
async fn upload_before_prescription_items_is_verified() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();
    let urls = ocr_stub("Rx: amoxicillin 500mg").await;

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let otc = common::seed_medicine(conn, pharmacy.id, "Paracetamol", "3.00", false, Some(5)).await;
    carts::add_medicines(conn, patient.id, vec![(otc.id, 1)])
        .await
        .unwrap();

    let (prescription, outcome) =
        prescriptions::upload(conn, &Client::new(), &urls, patient.id, "rx/4.png".into())
            .await
            .unwrap();

    assert_eq!(outcome, VerificationOutcome::Verified);
    assert!(prescription.verified);
}

#[tokio::test]
async fn ocr_outage_does_not_fail_upload() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();
    let patient = common::seed_patient(conn).await;

    let (prescription, outcome) =
        prescriptions::upload(conn, &client, &urls, patient.id, "rx/3.png".into())
            .await
            .unwrap();

    assert!(matches!(outcome, VerificationOutcome::OcrFailed { .. }));
    assert!(!prescription.verified);
}

#[tokio::test]
async fn patients_only_see_their_own_prescriptions() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();
    let owner = common::seed_patient(conn).await;
    let other = common::seed_patient(conn).await;
    let prescription = common::seed_verified_prescription(conn, owner.id).await;

    let mine = prescriptions::list(conn, Actor::new(owner.id, Role::Patient))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);

    let err = prescriptions::get(conn, Actor::new(other.id, Role::Patient), prescription.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ForbiddenResource(_)));

    let err = prescriptions::verify_manually(conn, Actor::new(owner.id, Role::Patient), prescription.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ForbiddenResource(_)));
}
