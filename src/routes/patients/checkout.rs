use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{orders::PaymentMethod, roles::Actor},
    middleware,
    models::PendingCheckoutEntity,
    services::checkout,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/patients/checkout",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(stage_checkout))
            .route_layer(axum::middleware::from_fn(
                middleware::patients_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema)]
struct StageCheckoutReq {
    delivery_address: String,
    #[serde(default)]
    payment_method: PaymentMethod,
}

/// Validate the cart and stage a checkout. The returned token is confirmed through
/// the payments endpoint.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Checkout"],
    security(("userId" = [], "userRole" = [])),
    request_body = StageCheckoutReq,
    responses(
        (status = 200, description = "Staged checkout successfully", body = StdResponse<PendingCheckoutEntity, String>),
        (status = 400, description = "Cart failed validation"),
        (status = 409, description = "A verified, unused prescription is required")
    )
)]
async fn stage_checkout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<StageCheckoutReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pending = checkout::stage_checkout(
        conn,
        actor.id,
        &body.delivery_address,
        body.payment_method,
        state.checkout.pending_ttl,
    )
    .await?;

    Ok(StdResponse {
        data: Some(pending),
        message: Some("Staged checkout successfully"),
    })
}
