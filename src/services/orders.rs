use std::collections::HashMap;

use chrono::{Days, NaiveDate, NaiveTime};
use diesel::{
    ExpressionMethods, OptionalExtension, PgTextExpressionMethods, QueryDsl, QueryResult,
    SelectableHelper, pg::Pg,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    app_error::AppError,
    domain::{
        orders::{self as order_rules, OrderStatus, PaymentStatus},
        roles::{Actor, Role},
    },
    models::{DeliveryEntity, OrderEntity, OrderItemEntity},
    schema::{deliveries, order_items, orders},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetails {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderTracking {
    pub order: OrderEntity,
    pub delivery: DeliveryEntity,
}

/// Staff order search. Every field is optional; `pharmacy_id` is honored for admins only.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    /// Case-insensitive substring of the order number
    pub order_number: Option<String>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub patient_id: Option<i32>,
    pub pharmacy_id: Option<i32>,
    pub from_date: Option<NaiveDate>,
    /// Inclusive
    pub to_date: Option<NaiveDate>,
}

async fn with_items(
    conn: &mut AsyncPgConnection,
    orders: Vec<OrderEntity>,
) -> QueryResult<Vec<OrderDetails>> {
    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .order(order_items::id.asc())
        .select(OrderItemEntity::as_select())
        .load(conn)
        .await?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| OrderDetails {
            order_items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

/// Newest first.
pub async fn list_for_patient(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
) -> QueryResult<Vec<OrderDetails>> {
    let orders: Vec<OrderEntity> = orders::table
        .filter(orders::patient_id.eq(patient_id))
        .order((orders::created_at.desc(), orders::id.desc()))
        .select(OrderEntity::as_select())
        .load(conn)
        .await?;

    with_items(conn, orders).await
}

async fn courier_of(conn: &mut AsyncPgConnection, order_id: i32) -> QueryResult<Option<i32>> {
    Ok(deliveries::table
        .filter(deliveries::order_id.eq(order_id))
        .select(deliveries::courier_id)
        .first::<Option<i32>>(conn)
        .await
        .optional()?
        .flatten())
}

/// Missing orders are 404; orders the actor may not see are 403.
pub async fn get_for_actor(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    id: i32,
) -> Result<OrderDetails, AppError> {
    let order: OrderEntity = orders::table
        .find(id)
        .select(OrderEntity::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFoundResource(format!("Order #{id}")))?;

    let allowed = match actor.role {
        Role::Patient => order.patient_id == actor.id,
        Role::Pharmacist | Role::Admin => actor.manages_pharmacy(order.pharmacy_id),
        Role::Delivery => courier_of(conn, order.id).await? == Some(actor.id),
    };
    if !allowed {
        return Err(AppError::ForbiddenResource(
            "You cannot view this order".into(),
        ));
    }

    let mut details = with_items(conn, vec![order]).await?;
    details.pop().ok_or(AppError::NotFound)
}

pub async fn list_for_staff(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    filter: OrderFilter,
) -> Result<Vec<OrderDetails>, AppError> {
    let mut query = orders::table
        .select(OrderEntity::as_select())
        .into_boxed::<Pg>();

    match actor.role {
        Role::Pharmacist => query = query.filter(orders::pharmacy_id.eq(actor.id)),
        Role::Admin => {
            if let Some(pharmacy_id) = filter.pharmacy_id {
                query = query.filter(orders::pharmacy_id.eq(pharmacy_id));
            }
        }
        Role::Patient | Role::Delivery => {
            return Err(AppError::ForbiddenResource(
                "Only pharmacists and administrators can search orders".into(),
            ));
        }
    }

    if let Some(number) = filter.order_number.as_deref().map(str::trim) {
        if !number.is_empty() {
            query = query.filter(orders::order_number.ilike(format!("%{number}%")));
        }
    }
    if let Some(status) = filter.status {
        query = query.filter(orders::status.eq(status.as_str()));
    }
    if let Some(payment_status) = filter.payment_status {
        query = query.filter(orders::payment_status.eq(payment_status.as_str()));
    }
    if let Some(patient_id) = filter.patient_id {
        query = query.filter(orders::patient_id.eq(patient_id));
    }
    if let Some(from) = filter.from_date {
        query = query.filter(orders::created_at.ge(from.and_time(NaiveTime::MIN).and_utc()));
    }
    if let Some(to) = filter.to_date.and_then(|to| to.checked_add_days(Days::new(1))) {
        query = query.filter(orders::created_at.lt(to.and_time(NaiveTime::MIN).and_utc()));
    }

    let orders: Vec<OrderEntity> = query
        .order((orders::created_at.desc(), orders::id.desc()))
        .load(conn)
        .await?;

    Ok(with_items(conn, orders).await?)
}

/// Pharmacist for their own orders, or an admin. Delivered and cancelled orders are final.
pub async fn update_status(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    id: i32,
    status: OrderStatus,
) -> Result<OrderEntity, AppError> {
    let order: OrderEntity = orders::table
        .find(id)
        .select(OrderEntity::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFoundResource(format!("Order #{id}")))?;

    if !actor.manages_pharmacy(order.pharmacy_id) {
        return Err(AppError::ForbiddenResource(
            "You can only update your own pharmacy's orders".into(),
        ));
    }

    let current: OrderStatus = order.status.parse().map_err(anyhow::Error::msg)?;
    if matches!(current, OrderStatus::Delivered | OrderStatus::Cancelled) && current != status {
        return Err(AppError::Conflict(format!(
            "Order {} is already {}",
            order.order_number,
            current.as_str()
        )));
    }

    let updated = set_status(conn, id, status).await?;
    tracing::info!(
        "Order {} moved from {} to {} by {} #{}",
        updated.order_number,
        current.as_str(),
        status.as_str(),
        actor.role,
        actor.id
    );

    Ok(updated)
}

pub(crate) async fn set_status(
    conn: &mut AsyncPgConnection,
    id: i32,
    status: OrderStatus,
) -> QueryResult<OrderEntity> {
    diesel::update(orders::table.find(id))
        .set((
            orders::status.eq(status.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
}

/// Patient tracking by order number. Input is trimmed and upper-cased.
pub async fn track(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    order_number: &str,
) -> Result<OrderTracking, AppError> {
    let order_number = order_rules::normalize_order_number(order_number);
    if !order_rules::is_valid_order_number(&order_number) {
        return Err(AppError::BadRequest(format!(
            "{order_number} is not a valid order number"
        )));
    }

    let order: OrderEntity = orders::table
        .filter(orders::order_number.eq(&order_number))
        .filter(orders::patient_id.eq(patient_id))
        .select(OrderEntity::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFoundResource(format!("Order {order_number}")))?;

    let delivery: DeliveryEntity = deliveries::table
        .filter(deliveries::order_id.eq(order.id))
        .select(DeliveryEntity::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| {
            AppError::NotFoundResource(format!(
                "Delivery for order {order_number} (not assigned yet)"
            ))
        })?;

    Ok(OrderTracking { order, delivery })
}
