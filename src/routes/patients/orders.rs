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
    services::orders::{self, OrderDetails, OrderTracking},
};

/// Defines patient-facing order routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/patients/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(track_order))
            .route_layer(axum::middleware::from_fn(
                middleware::patients_authorization,
            )),
    )
}

/// Fetch all orders belonging to the authenticated patient, newest first.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<OrderDetails>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = orders::list_for_patient(conn, actor.id)
        .await
        .context("Failed to get my orders")?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get my orders successfully"),
    })
}

/// Fetch a specific order belonging to the authenticated patient.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderDetails, String>),
        (status = 403, description = "Order belongs to another patient"),
        (status = 404, description = "Order does not exist")
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = orders::get_for_actor(conn, actor, id).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Get order successfully"),
    })
}

/// Track an order by its order number.
#[utoipa::path(
    get,
    path = "/track/{order_number}",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("order_number" = String, Path, description = "Order number, e.g. ORD-1A2B3C4D (case-insensitive)")
    ),
    responses(
        (status = 200, description = "Get tracking successfully", body = StdResponse<OrderTracking, String>),
        (status = 404, description = "Order not found or not assigned to a courier yet")
    )
)]
async fn track_order(
    Path(order_number): Path<String>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let tracking = orders::track(conn, actor.id, &order_number).await?;

    Ok(StdResponse {
        data: Some(tracking),
        message: Some("Get tracking successfully"),
    })
}
