//! Checkout / order transaction engine.
//!
//! Checkout is two-phase. [`stage_checkout`] validates the cart, runs the
//! prescription gate and persists a single-use [`PendingCheckoutEntity`] token.
//! [`confirm_checkout`] (payment confirmed) consumes the token and, in one
//! transaction, re-validates the prescription, creates the order, locks and
//! decrements stock, writes order items and consumes the prescription. Any failure
//! rolls all of it back and leaves the token usable.

use std::time::Duration;

use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use reqwest::Client;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{ApiUrls, geocoding},
    app_error::AppError,
    domain::{
        checkout::{self, CheckoutLine, CheckoutRejection, PricedLine},
        orders::{self as order_rules, OrderStatus, PaymentMethod, PaymentStatus},
        prescriptions::GateDecision,
        roles::Role,
    },
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreatePendingCheckoutEntity, OrderEntity,
        OrderItemEntity, PendingCheckoutEntity, UserEntity,
    },
    schema::{order_items, orders, pending_checkouts, users},
    services::{carts, catalog, prescriptions},
};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Rejected(#[from] CheckoutRejection),

    #[error("This checkout has expired or was already completed")]
    Expired,

    #[error("Medicine {0} no longer exists")]
    MedicineNotFound(i32),

    #[error("Could not allocate a unique order number")]
    OrderNumberExhausted,

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Rejected(rejection) if rejection.is_validation() => {
                AppError::BadRequest(rejection.to_string())
            }
            CheckoutError::Rejected(rejection) => AppError::Conflict(rejection.to_string()),
            CheckoutError::Expired | CheckoutError::OrderNumberExhausted => {
                AppError::Conflict(err.to_string())
            }
            CheckoutError::MedicineNotFound(id) => {
                AppError::NotFoundResource(format!("Medicine {id}"))
            }
            CheckoutError::Database(err) => err.into(),
            CheckoutError::Other(err) => AppError::Other(err),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutReceipt {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

async fn priced_lines(
    conn: &mut AsyncPgConnection,
    lines: &[CheckoutLine],
) -> Result<Vec<PricedLine>, CheckoutError> {
    let ids: Vec<i32> = lines.iter().map(|line| line.medicine_id).collect();
    let medicines = catalog::get_medicines(conn, &ids).await?;

    lines
        .iter()
        .map(|line| {
            medicines
                .get(&line.medicine_id)
                .map(|medicine| PricedLine::new(medicine, line.quantity))
                .ok_or(CheckoutError::MedicineNotFound(line.medicine_id))
        })
        .collect()
}

async fn ensure_pharmacy_approved(
    conn: &mut AsyncPgConnection,
    pharmacy_id: i32,
) -> Result<(), CheckoutError> {
    let pharmacy: Option<UserEntity> = users::table
        .find(pharmacy_id)
        .select(UserEntity::as_select())
        .first(conn)
        .await
        .optional()?;

    let approved = pharmacy.is_some_and(|user| {
        user.approved && user.role.parse::<Role>().is_ok_and(|role| role == Role::Pharmacist)
    });
    if approved {
        Ok(())
    } else {
        Err(CheckoutRejection::PharmacyNotApproved.into())
    }
}

/// Validates the cart, runs the prescription gate and stages a checkout token.
/// Nothing else is mutated; a rejected cart is left untouched.
pub async fn stage_checkout(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    delivery_address: &str,
    payment_method: PaymentMethod,
    ttl: Duration,
) -> Result<PendingCheckoutEntity, CheckoutError> {
    let delivery_address = delivery_address.trim();
    if delivery_address.is_empty() {
        return Err(CheckoutRejection::MissingAddress.into());
    }

    let cart = carts::get_or_create_cart(conn, patient_id).await?;
    let lines: Vec<CheckoutLine> = carts::cart_lines(conn, cart.id)
        .await?
        .into_iter()
        .map(|(item, _)| CheckoutLine {
            medicine_id: item.medicine_id,
            quantity: item.quantity,
        })
        .collect();
    if lines.is_empty() {
        return Err(CheckoutRejection::EmptyCart.into());
    }

    let priced = priced_lines(conn, &lines).await?;
    let pharmacy_id = checkout::resolve_pharmacy(&priced)?;
    ensure_pharmacy_approved(conn, pharmacy_id).await?;

    let prescription_id = match prescriptions::select_for_checkout(
        conn,
        patient_id,
        checkout::needs_prescription(&priced),
    )
    .await?
    {
        GateDecision::NotRequired => None,
        GateDecision::Bound(id) => Some(id),
        GateDecision::Rejected => return Err(CheckoutRejection::PrescriptionRequired.into()),
    };

    let ttl = chrono::Duration::from_std(ttl).map_err(anyhow::Error::from)?;
    let pending = diesel::insert_into(pending_checkouts::table)
        .values(CreatePendingCheckoutEntity {
            token: Uuid::new_v4(),
            patient_id,
            lines: serde_json::to_value(&lines).map_err(anyhow::Error::from)?,
            delivery_address: delivery_address.to_string(),
            payment_method: payment_method.as_str().to_string(),
            prescription_id,
            expires_at: Utc::now() + ttl,
        })
        .returning(PendingCheckoutEntity::as_returning())
        .get_result(conn)
        .await?;

    tracing::debug!(
        "Staged checkout {} for patient #{} ({} lines)",
        pending.token,
        patient_id,
        lines.len()
    );

    Ok(pending)
}

async fn insert_order(
    conn: &mut AsyncPgConnection,
    mut order: CreateOrderEntity,
) -> Result<OrderEntity, CheckoutError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        order.order_number = order_rules::generate_order_number();
        let created = diesel::insert_into(orders::table)
            .values(&order)
            .on_conflict(orders::order_number)
            .do_nothing()
            .returning(OrderEntity::as_returning())
            .get_result(conn)
            .await
            .optional()?;

        if let Some(created) = created {
            return Ok(created);
        }
        tracing::warn!("Order number {} collided, regenerating", order.order_number);
    }

    Err(CheckoutError::OrderNumberExhausted)
}

/// Steps run inside the checkout transaction, in order. Returning `Err` rolls back.
async fn commit(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    token: Uuid,
    coordinates: Option<geocoding::Coordinates>,
) -> Result<CheckoutReceipt, CheckoutError> {
    // Consuming the token row first also serializes duplicate confirmations.
    let now = Utc::now();
    let pending: PendingCheckoutEntity = diesel::update(
        pending_checkouts::table
            .find(token)
            .filter(pending_checkouts::patient_id.eq(patient_id))
            .filter(pending_checkouts::consumed_at.is_null())
            .filter(pending_checkouts::expires_at.gt(now)),
    )
    .set(pending_checkouts::consumed_at.eq(Some(now)))
    .returning(PendingCheckoutEntity::as_returning())
    .get_result(conn)
    .await
    .optional()?
    .ok_or(CheckoutError::Expired)?;

    let lines: Vec<CheckoutLine> =
        serde_json::from_value(pending.lines).map_err(anyhow::Error::from)?;
    let priced = priced_lines(conn, &lines).await?;
    let pharmacy_id = checkout::resolve_pharmacy(&priced)?;

    match pending.prescription_id {
        Some(id) => {
            if prescriptions::lock_for_checkout(conn, id, patient_id)
                .await?
                .is_none()
            {
                return Err(CheckoutRejection::PrescriptionNoLongerValid.into());
            }
        }
        None if checkout::needs_prescription(&priced) => {
            return Err(CheckoutRejection::PrescriptionRequired.into());
        }
        None => {}
    }

    let order = insert_order(
        conn,
        CreateOrderEntity {
            order_number: String::new(),
            patient_id,
            pharmacy_id: Some(pharmacy_id),
            prescription_id: pending.prescription_id,
            status: OrderStatus::Pending.as_str().into(),
            payment_status: PaymentStatus::Paid.as_str().into(),
            payment_method: pending.payment_method,
            delivery_address: pending.delivery_address,
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
        },
    )
    .await?;

    let medicine_ids: Vec<i32> = priced.iter().map(|line| line.medicine_id).collect();
    let locked = catalog::lock_stocks(conn, pharmacy_id, &medicine_ids).await?;
    let decrements = checkout::plan_decrements(&priced, &locked)?;

    let mut new_items = Vec::with_capacity(priced.len());
    for (line, decrement) in priced.iter().zip(&decrements) {
        if catalog::decrement_stock(conn, decrement.stock_id, decrement.quantity)
            .await?
            .is_none()
        {
            return Err(CheckoutRejection::NotEnoughStock {
                medicine: line.medicine_name.clone(),
                requested: line.quantity,
                available: decrement.remaining + decrement.quantity,
            }
            .into());
        }

        new_items.push(CreateOrderItemEntity {
            order_id: order.id,
            medicine_id: line.medicine_id,
            pharmacy_id: line.pharmacy_id,
            quantity: line.quantity,
            price: line.price.clone(),
        });
    }

    let total_amount =
        order_rules::order_total(priced.iter().map(|line| (line.quantity, &line.price)));
    let order_items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
        .values(&new_items)
        .returning(OrderItemEntity::as_returning())
        .get_results(conn)
        .await?;

    let order: OrderEntity = diesel::update(orders::table.find(order.id))
        .set(orders::total_amount.eq(&total_amount))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await?;

    if let Some(id) = pending.prescription_id {
        if !prescriptions::consume(conn, id).await? {
            return Err(CheckoutRejection::PrescriptionNoLongerValid.into());
        }
    }

    Ok(CheckoutReceipt { order, order_items })
}

/// Confirms payment for a staged checkout and atomically turns it into an order.
///
/// Geocoding happens before the transaction opens so no lock is held while waiting
/// on it. The ordered quantities leave the cart only after the transaction has
/// committed.
pub async fn confirm_checkout(
    conn: &mut AsyncPgConnection,
    client: &Client,
    urls: &ApiUrls,
    patient_id: i32,
    token: Uuid,
) -> Result<CheckoutReceipt, CheckoutError> {
    let pending: PendingCheckoutEntity = pending_checkouts::table
        .find(token)
        .filter(pending_checkouts::patient_id.eq(patient_id))
        .select(PendingCheckoutEntity::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or(CheckoutError::Expired)?;
    if pending.consumed_at.is_some() || pending.expires_at <= Utc::now() {
        return Err(CheckoutError::Expired);
    }

    let coordinates = geocoding::geocode(client, urls, &pending.delivery_address).await;

    let receipt = conn
        .transaction(move |conn| {
            Box::pin(async move { commit(conn, patient_id, token, coordinates).await })
        })
        .await?;

    tracing::info!(
        "Order {} created for patient #{}: {} items, total {}",
        receipt.order.order_number,
        patient_id,
        receipt.order_items.len(),
        receipt.order.total_amount
    );

    let ordered = receipt
        .order_items
        .iter()
        .map(|item| CheckoutLine {
            medicine_id: item.medicine_id,
            quantity: item.quantity,
        })
        .collect();
    if let Err(err) = carts::clear_lines(conn, patient_id, ordered).await {
        tracing::warn!(
            "Order {} committed but clearing the cart failed: {}",
            receipt.order.order_number,
            err
        );
    }

    Ok(receipt)
}
