//! Delivery assignment and the pick-up / verification state machine, persisted.
//!
//! Every transition locks the delivery row, checks the move against
//! [`rules::apply`] and writes the new state in one transaction. The patient
//! notification after pick-up is sent once the transaction has committed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::{
    ExpressionMethods, JoinOnDsl, OptionalExtension, QueryDsl, QueryResult, SelectableHelper,
    pg::Pg,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use reqwest::Client;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    api::{ApiUrls, notifications},
    app_error::AppError,
    domain::{
        deliveries::{
            self as rules, CodeRejection, DeliveryStatus, InvalidTransition, IssuedCode,
            Transition,
        },
        orders::OrderStatus,
        roles::{Actor, Role},
    },
    models::{CreateDeliveryEntity, DeliveryEntity, OrderEntity, UpdateDeliveryAssignment},
    schema::{deliveries, orders, users},
    services::{orders as order_service, roster},
};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Order #{0} not found")]
    OrderNotFound(i32),

    #[error("Delivery #{0} not found")]
    NotFound(i32),

    #[error("{0}")]
    Forbidden(String),

    #[error("Courier #{courier_id} is not on the roster of pharmacy #{pharmacy_id}")]
    IneligibleCourier { courier_id: i32, pharmacy_id: i32 },

    #[error("Order {0} was cancelled")]
    OrderCancelled(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Code(#[from] CodeRejection),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::OrderNotFound(id) => AppError::NotFoundResource(format!("Order #{id}")),
            DeliveryError::NotFound(id) => AppError::NotFoundResource(format!("Delivery #{id}")),
            DeliveryError::Forbidden(_) | DeliveryError::IneligibleCourier { .. } => {
                AppError::ForbiddenResource(err.to_string())
            }
            DeliveryError::Code(CodeRejection::Incorrect) => AppError::BadRequest(err.to_string()),
            DeliveryError::OrderCancelled(_)
            | DeliveryError::InvalidTransition(_)
            | DeliveryError::Code(_) => AppError::Conflict(err.to_string()),
            DeliveryError::Database(err) => err.into(),
            DeliveryError::Other(err) => AppError::Other(err),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct OnTimeReport {
    /// Delivered deliveries that carry an expected time.
    pub measured: usize,
    pub on_time: usize,
    pub rate: Option<f64>,
}

fn current_status(delivery: &DeliveryEntity) -> Result<DeliveryStatus, DeliveryError> {
    delivery
        .status
        .parse()
        .map_err(|err: String| DeliveryError::Other(anyhow::Error::msg(err)))
}

async fn lock_delivery(
    conn: &mut AsyncPgConnection,
    delivery_id: i32,
) -> Result<DeliveryEntity, DeliveryError> {
    deliveries::table
        .find(delivery_id)
        .select(DeliveryEntity::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or(DeliveryError::NotFound(delivery_id))
}

fn ensure_assigned_courier(actor: Actor, delivery: &DeliveryEntity) -> Result<(), DeliveryError> {
    match actor.role {
        Role::Delivery if delivery.courier_id == Some(actor.id) => Ok(()),
        Role::Delivery | Role::Patient | Role::Pharmacist | Role::Admin => Err(
            DeliveryError::Forbidden("Only the assigned courier can update this delivery".into()),
        ),
    }
}

/// Creates the delivery for an order or re-points it at another courier while it is
/// still `assigned`. The courier must be on the roster of the order's pharmacy.
pub async fn assign(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    order_id: i32,
    courier_id: i32,
    expected_delivery_time: Option<DateTime<Utc>>,
    default_expected: Duration,
) -> Result<DeliveryEntity, DeliveryError> {
    let default_expected =
        chrono::Duration::from_std(default_expected).map_err(anyhow::Error::from)?;

    let assigned = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = orders::table
                    .find(order_id)
                    .select(OrderEntity::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(DeliveryError::OrderNotFound(order_id))?;

                if !actor.manages_pharmacy(order.pharmacy_id) {
                    return Err(DeliveryError::Forbidden(
                        "You can only assign couriers to your own pharmacy's orders".into(),
                    ));
                }
                let pharmacy_id = order.pharmacy_id.ok_or_else(|| {
                    DeliveryError::Forbidden("This order has no fulfilling pharmacy".into())
                })?;
                if order.status == OrderStatus::Cancelled.as_str() {
                    return Err(DeliveryError::OrderCancelled(order.order_number));
                }
                if !roster::is_on_roster(conn, pharmacy_id, courier_id).await? {
                    return Err(DeliveryError::IneligibleCourier {
                        courier_id,
                        pharmacy_id,
                    });
                }

                let existing: Option<DeliveryEntity> = deliveries::table
                    .filter(deliveries::order_id.eq(order_id))
                    .select(DeliveryEntity::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let current = existing.as_ref().map(current_status).transpose()?;
                let status = rules::apply(current, Transition::Assign)?;

                let now = Utc::now();
                let expected_delivery_time =
                    Some(expected_delivery_time.unwrap_or(now + default_expected));

                let assigned = match existing {
                    Some(existing) => {
                        diesel::update(deliveries::table.find(existing.id))
                            .set(UpdateDeliveryAssignment {
                                courier_id: Some(courier_id),
                                status: status.as_str().into(),
                                expected_delivery_time,
                                updated_at: now,
                            })
                            .returning(DeliveryEntity::as_returning())
                            .get_result(conn)
                            .await?
                    }
                    None => {
                        diesel::insert_into(deliveries::table)
                            .values(CreateDeliveryEntity {
                                order_id,
                                courier_id: Some(courier_id),
                                status: status.as_str().into(),
                                expected_delivery_time,
                            })
                            .returning(DeliveryEntity::as_returning())
                            .get_result(conn)
                            .await?
                    }
                };

                Ok::<DeliveryEntity, DeliveryError>(assigned)
            })
        })
        .await?;

    tracing::info!(
        "Delivery #{} for order #{} assigned to courier #{} by {} #{}",
        assigned.id,
        order_id,
        courier_id,
        actor.role,
        actor.id
    );

    Ok(assigned)
}

/// Patient email and order number for an order.
async fn patient_contact(
    conn: &mut AsyncPgConnection,
    order_id: i32,
) -> QueryResult<Option<(String, String)>> {
    orders::table
        .inner_join(users::table.on(users::id.eq(orders::patient_id)))
        .filter(orders::id.eq(order_id))
        .select((users::email, orders::order_number))
        .first(conn)
        .await
        .optional()
}

/// `assigned -> picked` by the assigned courier. Issues a fresh single-use code and
/// sends it to the patient after commit; a failed notification does not undo the pick-up.
pub async fn pick_up(
    conn: &mut AsyncPgConnection,
    client: &Client,
    urls: &ApiUrls,
    actor: Actor,
    delivery_id: i32,
    code_ttl: Duration,
) -> Result<DeliveryEntity, DeliveryError> {
    let code_ttl = chrono::Duration::from_std(code_ttl).map_err(anyhow::Error::from)?;
    let code = rules::generate_verification_code(&mut rand::thread_rng());

    let picked = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let current = lock_delivery(conn, delivery_id).await?;
                ensure_assigned_courier(actor, &current)?;
                let status = rules::apply(Some(current_status(&current)?), Transition::PickUp)?;

                let now = Utc::now();
                let picked: DeliveryEntity = diesel::update(deliveries::table.find(delivery_id))
                    .set((
                        deliveries::status.eq(status.as_str()),
                        deliveries::picked_at.eq(Some(now)),
                        deliveries::verification_code.eq(Some(code)),
                        deliveries::code_expires_at.eq(Some(now + code_ttl)),
                        deliveries::code_consumed_at.eq(None::<DateTime<Utc>>),
                        deliveries::updated_at.eq(now),
                    ))
                    .returning(DeliveryEntity::as_returning())
                    .get_result(conn)
                    .await?;

                order_service::set_status(conn, picked.order_id, OrderStatus::OutForDelivery)
                    .await?;

                Ok::<DeliveryEntity, DeliveryError>(picked)
            })
        })
        .await?;

    tracing::info!("Delivery #{} picked up by courier #{}", picked.id, actor.id);

    match (patient_contact(conn, picked.order_id).await, picked.verification_code.as_deref()) {
        (Ok(Some((email, order_number))), Some(code)) => {
            let body = format!(
                "Your order {order_number} is on its way. Give this code to the courier on delivery: {code}"
            );
            if !notifications::send(client, urls, &email, "Your delivery code", &body).await {
                tracing::warn!("Delivery code for delivery #{} was not sent", picked.id);
            }
        }
        (Ok(_), _) => tracing::warn!("No recipient for delivery #{}", picked.id),
        (Err(err), _) => tracing::warn!(
            "Failed to look up recipient for delivery #{}: {}",
            picked.id,
            err
        ),
    }

    Ok(picked)
}

/// Code-gated completion, `picked -> delivered`. The candidate is compared exactly;
/// callers only trim surrounding whitespace. A code is accepted at most once.
pub async fn verify_code(
    conn: &mut AsyncPgConnection,
    delivery_id: i32,
    candidate: &str,
) -> Result<DeliveryEntity, DeliveryError> {
    if !rules::is_valid_code_format(candidate) {
        return Err(CodeRejection::Incorrect.into());
    }
    let candidate = candidate.to_string();

    let delivered = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let current = lock_delivery(conn, delivery_id).await?;
                let status = rules::apply(Some(current_status(&current)?), Transition::VerifyCode)?;

                let now = Utc::now();
                IssuedCode {
                    code: current.verification_code.as_deref(),
                    expires_at: current.code_expires_at,
                    consumed_at: current.code_consumed_at,
                }
                .check(&candidate, now)?;

                let delivered = complete(conn, delivery_id, status, now).await?;
                Ok::<DeliveryEntity, DeliveryError>(delivered)
            })
        })
        .await?;

    tracing::info!("Delivery #{} completed with verification code", delivered.id);
    Ok(delivered)
}

/// Courier self-service completion from `assigned` or `picked`. Any outstanding code
/// is invalidated.
pub async fn mark_delivered(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    delivery_id: i32,
) -> Result<DeliveryEntity, DeliveryError> {
    let delivered = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let current = lock_delivery(conn, delivery_id).await?;
                ensure_assigned_courier(actor, &current)?;
                let status =
                    rules::apply(Some(current_status(&current)?), Transition::MarkDelivered)?;

                let delivered = complete(conn, delivery_id, status, Utc::now()).await?;
                Ok::<DeliveryEntity, DeliveryError>(delivered)
            })
        })
        .await?;

    tracing::info!(
        "Delivery #{} marked delivered by courier #{}",
        delivered.id,
        actor.id
    );
    Ok(delivered)
}

async fn complete(
    conn: &mut AsyncPgConnection,
    delivery_id: i32,
    status: DeliveryStatus,
    now: DateTime<Utc>,
) -> QueryResult<DeliveryEntity> {
    let delivered: DeliveryEntity = diesel::update(deliveries::table.find(delivery_id))
        .set((
            deliveries::status.eq(status.as_str()),
            deliveries::delivered_at.eq(Some(now)),
            deliveries::code_consumed_at.eq(Some(now)),
            deliveries::updated_at.eq(now),
        ))
        .returning(DeliveryEntity::as_returning())
        .get_result(conn)
        .await?;

    order_service::set_status(conn, delivered.order_id, OrderStatus::Delivered).await?;
    Ok(delivered)
}

pub async fn list(
    conn: &mut AsyncPgConnection,
    actor: Actor,
) -> Result<Vec<DeliveryEntity>, AppError> {
    let mut query = deliveries::table
        .inner_join(orders::table)
        .select(DeliveryEntity::as_select())
        .into_boxed::<Pg>();

    match actor.role {
        Role::Pharmacist => query = query.filter(orders::pharmacy_id.eq(actor.id)),
        Role::Delivery => query = query.filter(deliveries::courier_id.eq(actor.id)),
        Role::Admin => {}
        Role::Patient => {
            return Err(AppError::ForbiddenResource(
                "Patients cannot list deliveries".into(),
            ));
        }
    }

    Ok(query
        .order(deliveries::created_at.desc())
        .load(conn)
        .await?)
}

/// Orders with no delivery row yet, oldest first. Cancelled orders are left out.
pub async fn unassigned_orders(
    conn: &mut AsyncPgConnection,
    actor: Actor,
) -> Result<Vec<OrderEntity>, AppError> {
    let mut query = orders::table
        .left_join(deliveries::table)
        .filter(deliveries::id.is_null())
        .filter(orders::status.ne(OrderStatus::Cancelled.as_str()))
        .select(OrderEntity::as_select())
        .into_boxed::<Pg>();

    match actor.role {
        Role::Pharmacist => query = query.filter(orders::pharmacy_id.eq(actor.id)),
        Role::Admin => {}
        Role::Patient | Role::Delivery => {
            return Err(AppError::ForbiddenResource(
                "Only pharmacists and administrators can assign deliveries".into(),
            ));
        }
    }

    Ok(query.order(orders::created_at.asc()).load(conn).await?)
}

/// On-time rate over delivered deliveries in the actor's scope.
pub async fn on_time_rate(
    conn: &mut AsyncPgConnection,
    actor: Actor,
) -> Result<OnTimeReport, AppError> {
    let mut query = deliveries::table
        .inner_join(orders::table)
        .filter(deliveries::status.eq(DeliveryStatus::Delivered.as_str()))
        .filter(deliveries::expected_delivery_time.is_not_null())
        .select((deliveries::delivered_at, deliveries::expected_delivery_time))
        .into_boxed::<Pg>();

    match actor.role {
        Role::Pharmacist => query = query.filter(orders::pharmacy_id.eq(actor.id)),
        Role::Delivery => query = query.filter(deliveries::courier_id.eq(actor.id)),
        Role::Admin => {}
        Role::Patient => {
            return Err(AppError::ForbiddenResource(
                "Patients cannot view delivery statistics".into(),
            ));
        }
    }

    let rows: Vec<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = query.load(conn).await?;
    let on_time = rows
        .iter()
        .filter(|&&(delivered_at, expected)| {
            rules::is_on_time(delivered_at, expected).unwrap_or(false)
        })
        .count();

    Ok(OnTimeReport {
        measured: rows.len(),
        on_time,
        rate: rules::on_time_rate(rows),
    })
}
