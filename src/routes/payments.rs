use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::roles::Actor,
    middleware,
    services::checkout::{self, CheckoutReceipt},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(confirm_checkout))
            .route_layer(axum::middleware::from_fn(
                middleware::patients_authorization,
            )),
    )
}

/// Confirm payment for a staged checkout and place the order.
///
/// Payment is simulated: confirming marks the order paid. Stock, order items and the
/// bound prescription are committed together or not at all.
#[utoipa::path(
    post,
    path = "/checkouts/{token}/confirm",
    tags = ["Payments"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("token" = Uuid, Path, description = "Token returned when the checkout was staged")
    ),
    responses(
        (status = 200, description = "Order placed successfully", body = StdResponse<CheckoutReceipt, String>),
        (status = 409, description = "Checkout expired, stock ran out or the prescription is no longer valid")
    )
)]
async fn confirm_checkout(
    Path(token): Path<Uuid>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let receipt =
        checkout::confirm_checkout(conn, &state.http_client, &state.api_urls, actor.id, token)
            .await?;

    Ok(StdResponse {
        data: Some(receipt),
        message: Some("Order placed successfully"),
    })
}
