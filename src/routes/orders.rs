use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::{orders::OrderStatus, roles::Actor},
    middleware,
    models::OrderEntity,
    services::orders::{self, OrderDetails, OrderFilter},
};

/// Staff order management. Pharmacists see their own pharmacy's orders, admins see all.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(update_order_status))
            .route_layer(axum::middleware::from_fn(middleware::staff_authorization)),
    )
}

/// Search orders.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    params(OrderFilter),
    responses(
        (status = 200, description = "List orders", body = StdResponse<Vec<OrderDetails>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = orders::list_for_staff(conn, actor, filter).await?;

    Ok(StdResponse {
        data: Some(orders),
        message: Some("Get orders successfully"),
    })
}

/// Fetch a specific order with its items.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<OrderDetails, String>)
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

#[derive(Deserialize, ToSchema)]
struct UpdateOrderStatusReq {
    status: OrderStatus,
}

#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Orders"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to update")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Updated order status successfully", body = StdResponse<OrderEntity, String>)
    )
)]
async fn update_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order = orders::update_status(conn, actor, id, body.status).await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Updated order status successfully"),
    })
}
