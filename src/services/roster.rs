//! Pharmacy approval and the explicit pharmacy/courier roster.

use diesel::{
    ExpressionMethods, JoinOnDsl, OptionalExtension, QueryDsl, QueryResult, SelectableHelper,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    app_error::AppError,
    domain::roles::{Actor, Role},
    models::{PharmacyCourierEntity, UserEntity},
    schema::{pharmacy_couriers, users},
};

async fn get_user_with_role(
    conn: &mut AsyncPgConnection,
    id: i32,
    role: Role,
) -> Result<UserEntity, AppError> {
    let user: Option<UserEntity> = users::table
        .find(id)
        .filter(users::role.eq(role.as_str()))
        .select(UserEntity::as_select())
        .first(conn)
        .await
        .optional()?;

    user.ok_or_else(|| AppError::NotFoundResource(format!("{role} #{id}")))
}

fn ensure_manages(actor: Actor, pharmacy_id: i32) -> Result<(), AppError> {
    if actor.manages_pharmacy(Some(pharmacy_id)) {
        Ok(())
    } else {
        Err(AppError::ForbiddenResource(
            "You can only manage your own pharmacy's couriers".into(),
        ))
    }
}

/// Admin-only.
pub async fn set_pharmacy_approval(
    conn: &mut AsyncPgConnection,
    pharmacy_id: i32,
    approved: bool,
) -> Result<UserEntity, AppError> {
    get_user_with_role(conn, pharmacy_id, Role::Pharmacist).await?;

    let pharmacy = diesel::update(users::table.find(pharmacy_id))
        .set(users::approved.eq(approved))
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(
        "Pharmacy #{} {}",
        pharmacy_id,
        if approved { "approved" } else { "unapproved" }
    );

    Ok(pharmacy)
}

pub async fn add_courier(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    pharmacy_id: i32,
    courier_id: i32,
) -> Result<PharmacyCourierEntity, AppError> {
    ensure_manages(actor, pharmacy_id)?;
    get_user_with_role(conn, pharmacy_id, Role::Pharmacist).await?;
    get_user_with_role(conn, courier_id, Role::Delivery).await?;

    diesel::insert_into(pharmacy_couriers::table)
        .values((
            pharmacy_couriers::pharmacy_id.eq(pharmacy_id),
            pharmacy_couriers::courier_id.eq(courier_id),
        ))
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    let entry = pharmacy_couriers::table
        .find((pharmacy_id, courier_id))
        .select(PharmacyCourierEntity::as_select())
        .first(conn)
        .await?;

    Ok(entry)
}

pub async fn remove_courier(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    pharmacy_id: i32,
    courier_id: i32,
) -> Result<(), AppError> {
    ensure_manages(actor, pharmacy_id)?;

    let deleted = diesel::delete(pharmacy_couriers::table.find((pharmacy_id, courier_id)))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(AppError::NotFoundResource(format!(
            "Courier #{courier_id} in pharmacy #{pharmacy_id}"
        )));
    }

    Ok(())
}

pub async fn list_couriers(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    pharmacy_id: i32,
) -> Result<Vec<UserEntity>, AppError> {
    ensure_manages(actor, pharmacy_id)?;

    let couriers = pharmacy_couriers::table
        .inner_join(users::table.on(users::id.eq(pharmacy_couriers::courier_id)))
        .filter(pharmacy_couriers::pharmacy_id.eq(pharmacy_id))
        .order(users::username.asc())
        .select(UserEntity::as_select())
        .load(conn)
        .await?;

    Ok(couriers)
}

pub async fn is_on_roster(
    conn: &mut AsyncPgConnection,
    pharmacy_id: i32,
    courier_id: i32,
) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(
        pharmacy_couriers::table.find((pharmacy_id, courier_id)),
    ))
    .get_result(conn)
    .await
}
