use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{prescriptions::VerificationOutcome, roles::Actor},
    middleware,
    models::PrescriptionEntity,
    services::prescriptions,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/patients/prescriptions",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(upload_prescription))
            .route_layer(axum::middleware::from_fn(
                middleware::patients_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema)]
struct UploadPrescriptionReq {
    /// Reference to the stored prescription image
    uploaded_file: String,
}

#[derive(Serialize, ToSchema)]
struct UploadPrescriptionRes {
    prescription: PrescriptionEntity,
    verification: VerificationOutcome,
}

/// Upload a prescription. It is checked automatically against the prescription-only
/// medicines in the cart; anything short of a full match is left for a pharmacist.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Prescriptions"],
    security(("userId" = [], "userRole" = [])),
    request_body = UploadPrescriptionReq,
    responses(
        (status = 200, description = "Uploaded prescription successfully", body = StdResponse<UploadPrescriptionRes, String>)
    )
)]
async fn upload_prescription(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<UploadPrescriptionReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (prescription, verification) = prescriptions::upload(
        conn,
        &state.http_client,
        &state.api_urls,
        actor.id,
        body.uploaded_file,
    )
    .await?;

    let message = if verification.is_verified() {
        "Prescription verified"
    } else {
        "Prescription uploaded and awaiting review"
    };

    Ok(StdResponse {
        data: Some(UploadPrescriptionRes {
            prescription,
            verification,
        }),
        message: Some(message),
    })
}
