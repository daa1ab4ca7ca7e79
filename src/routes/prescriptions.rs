use anyhow::{Context, Result};
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::roles::Actor,
    middleware,
    models::PrescriptionEntity,
    services::prescriptions,
};

/// Prescription listing for every role, and the manual verification override.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    let verification = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(verify_prescription))
        .route_layer(axum::middleware::from_fn(middleware::staff_authorization));

    utoipa_axum::router::OpenApiRouter::new().nest(
        "/prescriptions",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_prescriptions))
            .routes(utoipa_axum::routes!(get_prescription))
            .route_layer(axum::middleware::from_fn(middleware::authenticate))
            .merge(verification),
    )
}

/// Patients see their own prescriptions, pharmacists those behind their orders.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Prescriptions"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "List prescriptions", body = StdResponse<Vec<PrescriptionEntity>, String>)
    )
)]
async fn get_prescriptions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let prescriptions = prescriptions::list(conn, actor).await?;

    Ok(StdResponse {
        data: Some(prescriptions),
        message: Some("Get prescriptions successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Prescriptions"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Prescription ID to fetch")
    ),
    responses(
        (status = 200, description = "Get prescription successfully", body = StdResponse<PrescriptionEntity, String>)
    )
)]
async fn get_prescription(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let prescription = prescriptions::get(conn, actor, id).await?;

    Ok(StdResponse {
        data: Some(prescription),
        message: Some("Get prescription successfully"),
    })
}

/// Mark a prescription verified regardless of automatic matching.
#[utoipa::path(
    post,
    path = "/{id}/verify",
    tags = ["Prescriptions"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Prescription ID to verify")
    ),
    responses(
        (status = 200, description = "Verified prescription successfully", body = StdResponse<PrescriptionEntity, String>)
    )
)]
async fn verify_prescription(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let prescription = prescriptions::verify_manually(conn, actor, id).await?;

    Ok(StdResponse {
        data: Some(prescription),
        message: Some("Verified prescription successfully"),
    })
}
