use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::roles::Actor,
    middleware,
    models::{DeliveryEntity, OrderEntity},
    services::deliveries::{self, OnTimeReport},
};

/// Delivery routes. Role checks beyond authentication happen per operation, since
/// pharmacists, couriers and admins each see a different slice.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/deliveries",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_deliveries, assign_delivery))
            .routes(utoipa_axum::routes!(get_unassigned_orders))
            .routes(utoipa_axum::routes!(get_on_time_rate))
            .routes(utoipa_axum::routes!(pick_up_delivery))
            .routes(utoipa_axum::routes!(verify_delivery))
            .routes(utoipa_axum::routes!(mark_delivered))
            .route_layer(axum::middleware::from_fn(middleware::authenticate)),
    )
}

#[utoipa::path(
    get,
    path = "/",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "List deliveries", body = StdResponse<Vec<DeliveryEntity>, String>)
    )
)]
async fn get_deliveries(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deliveries = deliveries::list(conn, actor).await?;

    Ok(StdResponse {
        data: Some(deliveries),
        message: Some("Get deliveries successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AssignDeliveryReq {
    order_id: i32,
    courier_id: i32,
    /// Defaults to now plus the configured delivery window
    expected_delivery_time: Option<DateTime<Utc>>,
}

/// Assign a courier from the pharmacy's roster to an order, or reassign one that has
/// not been picked up yet.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    request_body = AssignDeliveryReq,
    responses(
        (status = 200, description = "Assigned delivery successfully", body = StdResponse<DeliveryEntity, String>),
        (status = 403, description = "Not the order's pharmacy, or courier not on its roster")
    )
)]
async fn assign_delivery(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AssignDeliveryReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let delivery = deliveries::assign(
        conn,
        actor,
        body.order_id,
        body.courier_id,
        body.expected_delivery_time,
        state.delivery.expected_delivery,
    )
    .await?;

    Ok(StdResponse {
        data: Some(delivery),
        message: Some("Assigned delivery successfully"),
    })
}

/// Orders that do not have a delivery yet.
#[utoipa::path(
    get,
    path = "/unassigned-orders",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "List unassigned orders", body = StdResponse<Vec<OrderEntity>, String>)
    )
)]
async fn get_unassigned_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = deliveries::unassigned_orders(conn, actor).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get unassigned orders successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/on-time-rate",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "Get on-time rate successfully", body = StdResponse<OnTimeReport, String>)
    )
)]
async fn get_on_time_rate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let report = deliveries::on_time_rate(conn, actor).await?;

    Ok(StdResponse {
        data: Some(report),
        message: Some("Get on-time rate successfully"),
    })
}

/// Pick up an assigned delivery. A verification code is sent to the patient.
#[utoipa::path(
    post,
    path = "/{id}/pick-up",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Delivery ID to pick up")
    ),
    responses(
        (status = 200, description = "Picked up delivery successfully", body = StdResponse<DeliveryEntity, String>)
    )
)]
async fn pick_up_delivery(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let delivery = deliveries::pick_up(
        conn,
        &state.http_client,
        &state.api_urls,
        actor,
        id,
        state.delivery.code_ttl,
    )
    .await?;

    Ok(StdResponse {
        data: Some(delivery),
        message: Some("Picked up delivery successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct VerifyDeliveryReq {
    code: String,
}

/// Complete a picked-up delivery with the code the patient received.
#[utoipa::path(
    post,
    path = "/{id}/verify",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Delivery ID to complete")
    ),
    request_body = VerifyDeliveryReq,
    responses(
        (status = 200, description = "Delivery completed successfully", body = StdResponse<DeliveryEntity, String>),
        (status = 400, description = "Incorrect verification code")
    )
)]
async fn verify_delivery(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<VerifyDeliveryReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let delivery = deliveries::verify_code(conn, id, body.code.trim()).await?;

    Ok(StdResponse {
        data: Some(delivery),
        message: Some("Delivery completed successfully"),
    })
}

/// Courier marks their own delivery as delivered without a code.
#[utoipa::path(
    post,
    path = "/{id}/mark-delivered",
    tags = ["Deliveries"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Delivery ID to complete")
    ),
    responses(
        (status = 200, description = "Delivery completed successfully", body = StdResponse<DeliveryEntity, String>)
    )
)]
async fn mark_delivered(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let delivery = deliveries::mark_delivered(conn, actor, id).await?;

    Ok(StdResponse {
        data: Some(delivery),
        message: Some("Delivery completed successfully"),
    })
}
