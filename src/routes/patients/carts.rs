use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    domain::roles::Actor,
    middleware,
    services::carts::{self, CartView},
};

/// Defines patient-facing cart routes.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/patients/cart",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(add_items))
            .routes(utoipa_axum::routes!(update_item, remove_item))
            .route_layer(axum::middleware::from_fn(
                middleware::patients_authorization,
            )),
    )
}

/// Fetch the authenticated patient's cart, creating it on first access.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Cart"],
    security(("userId" = [], "userRole" = [])),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<CartView, String>)
    )
)]
async fn get_cart(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::cart_view(conn, actor.id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct CartItemReq {
    medicine_id: i32,
    quantity: i32,
}

#[derive(Deserialize, ToSchema)]
struct AddItemsReq {
    items: Vec<CartItemReq>,
}

/// Add medicines to the cart. Adding a medicine already in the cart increases its quantity.
#[utoipa::path(
    post,
    path = "/items",
    tags = ["Cart"],
    security(("userId" = [], "userRole" = [])),
    request_body = AddItemsReq,
    responses(
        (status = 200, description = "Added items successfully", body = StdResponse<CartView, String>)
    )
)]
async fn add_items(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AddItemsReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let items = body
        .items
        .into_iter()
        .map(|item| (item.medicine_id, item.quantity))
        .collect();
    let cart = carts::add_medicines(conn, actor.id, items).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Added items successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpdateItemReq {
    quantity: i32,
}

/// Set the quantity of a medicine in the cart.
#[utoipa::path(
    patch,
    path = "/items/{medicine_id}",
    tags = ["Cart"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("medicine_id" = i32, Path, description = "Medicine ID of the cart line")
    ),
    request_body = UpdateItemReq,
    responses(
        (status = 200, description = "Updated item successfully", body = StdResponse<CartView, String>)
    )
)]
async fn update_item(
    Path(medicine_id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<UpdateItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::set_quantity(conn, actor.id, medicine_id, body.quantity).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Updated item successfully"),
    })
}

/// Remove a medicine from the cart.
#[utoipa::path(
    delete,
    path = "/items/{medicine_id}",
    tags = ["Cart"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("medicine_id" = i32, Path, description = "Medicine ID of the cart line")
    ),
    responses(
        (status = 200, description = "Removed item successfully", body = StdResponse<CartView, String>)
    )
)]
async fn remove_item(
    Path(medicine_id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::remove_line(conn, actor.id, medicine_id).await?;

    Ok(StdResponse {
        data: Some(cart),
        message: Some("Removed item successfully"),
    })
}
