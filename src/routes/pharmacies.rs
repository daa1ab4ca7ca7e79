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
    models::{PharmacyCourierEntity, UserEntity},
    services::roster,
};

/// Pharmacy approval (admins) and courier rosters (the owning pharmacist or an admin).
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    let approval = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(set_pharmacy_approval))
        .route_layer(axum::middleware::from_fn(middleware::admin_authorization));

    let roster = OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_couriers, add_courier))
        .routes(utoipa_axum::routes!(remove_courier))
        .route_layer(axum::middleware::from_fn(middleware::staff_authorization));

    utoipa_axum::router::OpenApiRouter::new().nest("/pharmacies", approval.merge(roster))
}

#[derive(Deserialize, ToSchema)]
struct PharmacyApprovalReq {
    approved: bool,
}

#[utoipa::path(
    patch,
    path = "/{id}/approval",
    tags = ["Pharmacies"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Pharmacist user ID")
    ),
    request_body = PharmacyApprovalReq,
    responses(
        (status = 200, description = "Updated approval successfully", body = StdResponse<UserEntity, String>)
    )
)]
async fn set_pharmacy_approval(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<PharmacyApprovalReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let pharmacy = roster::set_pharmacy_approval(conn, id, body.approved).await?;

    Ok(StdResponse {
        data: Some(pharmacy),
        message: Some("Updated approval successfully"),
    })
}

#[utoipa::path(
    get,
    path = "/{id}/couriers",
    tags = ["Pharmacies"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Pharmacist user ID")
    ),
    responses(
        (status = 200, description = "List couriers", body = StdResponse<Vec<UserEntity>, String>)
    )
)]
async fn get_couriers(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let couriers = roster::list_couriers(conn, actor, id).await?;

    Ok(StdResponse {
        data: Some(couriers),
        message: Some("Get couriers successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddCourierReq {
    courier_id: i32,
}

#[utoipa::path(
    post,
    path = "/{id}/couriers",
    tags = ["Pharmacies"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Pharmacist user ID")
    ),
    request_body = AddCourierReq,
    responses(
        (status = 200, description = "Added courier successfully", body = StdResponse<PharmacyCourierEntity, String>)
    )
)]
async fn add_courier(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AddCourierReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let entry = roster::add_courier(conn, actor, id, body.courier_id).await?;

    Ok(StdResponse {
        data: Some(entry),
        message: Some("Added courier successfully"),
    })
}

#[utoipa::path(
    delete,
    path = "/{id}/couriers/{courier_id}",
    tags = ["Pharmacies"],
    security(("userId" = [], "userRole" = [])),
    params(
        ("id" = i32, Path, description = "Pharmacist user ID"),
        ("courier_id" = i32, Path, description = "Courier user ID")
    ),
    responses(
        (status = 200, description = "Removed courier successfully")
    )
)]
async fn remove_courier(
    Path((id, courier_id)): Path<(i32, i32)>,
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    roster::remove_courier(conn, actor, id, courier_id).await?;

    Ok(StdResponse::<(), &str> {
        data: None,
        message: Some("Removed courier successfully"),
    })
}
