mod common;

use std::time::Duration;

use bigdecimal::BigDecimal;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use medicart_orderservice::{
    domain::{checkout::CheckoutRejection, orders::PaymentMethod},
    models::{OrderItemEntity, PendingCheckoutEntity, PrescriptionEntity},
    schema::{order_items, pending_checkouts, prescriptions},
    services::{
        carts,
        checkout::{self, CheckoutError},
    },
};

const ADDRESS: &str = "12 Harley Street";
const TTL: Duration = Duration::from_secs(600);

#[tokio::test]
async fn missing_prescription_rejects_whole_cart() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let a = common::seed_medicine(conn, pharmacy.id, "Paracetamol", "4.50", false, Some(5)).await;
    let b = common::seed_medicine(conn, pharmacy.id, "Amoxicillin", "12.00", true, Some(0)).await;

    carts::add_medicines(conn, patient.id, vec![(a.id, 2), (b.id, 1)])
        .await
        .unwrap();

    let err = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Rejected(CheckoutRejection::PrescriptionRequired)
    ));

    assert_eq!(common::stock_of(conn, a.id).await, 5);
    let cart = carts::cart_view(conn, patient.id).await.unwrap();
    assert_eq!(cart.lines.len(), 2);
}

#[tokio::test]
async fn exact_stock_checkout_drains_stock_and_totals_match() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let a = common::seed_medicine(conn, pharmacy.id, "Cetirizine", "3.25", false, Some(3)).await;

    let receipt = common::place_order(conn, patient.id, vec![(a.id, 3)]).await;

    assert_eq!(common::stock_of(conn, a.id).await, 0);
    assert_eq!(receipt.order_items.len(), 1);
    assert_eq!(receipt.order_items[0].quantity, 3);
    assert_eq!(receipt.order.total_amount, "9.75".parse::<BigDecimal>().unwrap());
    assert_eq!(receipt.order.status, "pending");
    assert_eq!(receipt.order.payment_status, "paid");
    assert_eq!(receipt.order.pharmacy_id, Some(pharmacy.id));
    assert!(receipt.order.order_number.starts_with("ORD-"));
    assert_eq!(receipt.order.latitude, None);

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(receipt.order.id))
        .select(OrderItemEntity::as_select())
        .load(conn)
        .await
        .unwrap();
    let sum = items
        .iter()
        .fold(BigDecimal::from(0), |acc, item| {
            acc + &item.price * BigDecimal::from(item.quantity)
        });
    assert_eq!(sum, receipt.order.total_amount);

    let cart = carts::cart_view(conn, patient.id).await.unwrap();
    assert!(cart.lines.is_empty());
}

#[tokio::test]
async fn price_is_snapshotted_at_purchase() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let a = common::seed_medicine(conn, pharmacy.id, "Loratadine", "5.00", false, Some(10)).await;

    let receipt = common::place_order(conn, patient.id, vec![(a.id, 2)]).await;

    diesel::update(medicart_orderservice::schema::medicines::table.find(a.id))
        .set(medicart_orderservice::schema::medicines::price.eq("8.00".parse::<BigDecimal>().unwrap()))
        .execute(conn)
        .await
        .unwrap();

    let item: OrderItemEntity = order_items::table
        .filter(order_items::order_id.eq(receipt.order.id))
        .select(OrderItemEntity::as_select())
        .first(conn)
        .await
        .unwrap();
    assert_eq!(item.price, "5.00".parse::<BigDecimal>().unwrap());
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let mut conn_a = pool.get().await.unwrap();
    let mut conn_b = pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(&mut conn_a).await;
    let first = common::seed_patient(&mut conn_a).await;
    let second = common::seed_patient(&mut conn_a).await;
    let med = common::seed_medicine(&mut conn_a, pharmacy.id, "Ibuprofen", "2.00", false, Some(3)).await;

    let mut tokens = Vec::new();
    for patient in [&first, &second] {
        carts::add_medicines(&mut conn_a, patient.id, vec![(med.id, 2)])
            .await
            .unwrap();
        let pending = checkout::stage_checkout(&mut conn_a, patient.id, ADDRESS, PaymentMethod::Card, TTL)
            .await
            .unwrap();
        tokens.push(pending.token);
    }

    let (a, b) = futures::future::join(
        checkout::confirm_checkout(&mut conn_a, &client, &urls, first.id, tokens[0]),
        checkout::confirm_checkout(&mut conn_b, &client, &urls, second.id, tokens[1]),
    )
    .await;

    let results = [a, b];
    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(CheckoutError::Rejected(CheckoutRejection::NotEnoughStock {
            requested: 2,
            available: 1,
            ..
        }))
    )));
    assert_eq!(common::stock_of(&mut conn_a, med.id).await, 1);
}

#[tokio::test]
async fn used_prescription_is_not_selected_again() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let rx = common::seed_medicine(conn, pharmacy.id, "Metformin", "6.00", true, Some(10)).await;
    let prescription = common::seed_verified_prescription(conn, patient.id).await;

    let receipt = common::place_order(conn, patient.id, vec![(rx.id, 1)]).await;
    assert_eq!(receipt.order.prescription_id, Some(prescription.id));

    let stored: PrescriptionEntity = prescriptions::table
        .find(prescription.id)
        .select(PrescriptionEntity::as_select())
        .first(conn)
        .await
        .unwrap();
    assert!(stored.used);
    assert!(stored.verified);

    carts::add_medicines(conn, patient.id, vec![(rx.id, 1)])
        .await
        .unwrap();
    let err = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Rejected(CheckoutRejection::PrescriptionRequired)
    ));
}

#[tokio::test]
async fn prescription_consumed_between_stage_and_confirm_rolls_back() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let plain = common::seed_medicine(conn, pharmacy.id, "Vitamin C", "1.00", false, Some(4)).await;
    let rx = common::seed_medicine(conn, pharmacy.id, "Warfarin", "9.00", true, Some(4)).await;
    let prescription = common::seed_verified_prescription(conn, patient.id).await;

    carts::add_medicines(conn, patient.id, vec![(plain.id, 2), (rx.id, 1)])
        .await
        .unwrap();
    let pending = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Upi, TTL)
        .await
        .unwrap();
    assert_eq!(pending.prescription_id, Some(prescription.id));

    diesel::update(prescriptions::table.find(prescription.id))
        .set(prescriptions::used.eq(true))
        .execute(conn)
        .await
        .unwrap();

    let err = checkout::confirm_checkout(conn, &client, &urls, patient.id, pending.token)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Rejected(CheckoutRejection::PrescriptionNoLongerValid)
    ));

    assert_eq!(common::stock_of(conn, plain.id).await, 4);
    assert_eq!(common::stock_of(conn, rx.id).await, 4);

    let token: PendingCheckoutEntity = pending_checkouts::table
        .find(pending.token)
        .select(PendingCheckoutEntity::as_select())
        .first(conn)
        .await
        .unwrap();
    assert!(token.consumed_at.is_none());
    assert_eq!(carts::cart_view(conn, patient.id).await.unwrap().lines.len(), 2);
}

#[tokio::test]
async fn missing_stock_row_is_reported_distinctly() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let stocked = common::seed_medicine(conn, pharmacy.id, "Aspirin", "2.00", false, Some(8)).await;
    let unstocked = common::seed_medicine(conn, pharmacy.id, "Melatonin", "7.00", false, None).await;

    carts::add_medicines(conn, patient.id, vec![(stocked.id, 1), (unstocked.id, 1)])
        .await
        .unwrap();
    let pending = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap();
    let err = checkout::confirm_checkout(conn, &client, &urls, patient.id, pending.token)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Rejected(CheckoutRejection::NoStock { ref medicine }) if medicine == "Melatonin"
    ));
    assert_eq!(common::stock_of(conn, stocked.id).await, 8);
}

#[tokio::test]
async fn token_is_single_use_and_expires() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let med = common::seed_medicine(conn, pharmacy.id, "Zinc", "1.50", false, Some(10)).await;

    carts::add_medicines(conn, patient.id, vec![(med.id, 1)])
        .await
        .unwrap();
    let pending = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap();
    checkout::confirm_checkout(conn, &client, &urls, patient.id, pending.token)
        .await
        .unwrap();
    let replay = checkout::confirm_checkout(conn, &client, &urls, patient.id, pending.token).await;
    assert!(matches!(replay, Err(CheckoutError::Expired)));

    carts::add_medicines(conn, patient.id, vec![(med.id, 1)])
        .await
        .unwrap();
    let expired = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, Duration::ZERO)
        .await
        .unwrap();
    let result = checkout::confirm_checkout(conn, &client, &urls, patient.id, expired.token).await;
    assert!(matches!(result, Err(CheckoutError::Expired)));
    assert_eq!(common::stock_of(conn, med.id).await, 9);
}

#[tokio::test]
async fn foreign_token_is_rejected() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let owner = common::seed_patient(conn).await;
    let intruder = common::seed_patient(conn).await;
    let med = common::seed_medicine(conn, pharmacy.id, "Saline", "0.80", false, Some(10)).await;

    carts::add_medicines(conn, owner.id, vec![(med.id, 1)])
        .await
        .unwrap();
    let pending = checkout::stage_checkout(conn, owner.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap();

    let result = checkout::confirm_checkout(conn, &client, &urls, intruder.id, pending.token).await;
    assert!(matches!(result, Err(CheckoutError::Expired)));
}

#[tokio::test]
async fn cart_validation_happens_before_staging() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let patient = common::seed_patient(conn).await;
    let empty = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        empty,
        CheckoutError::Rejected(CheckoutRejection::EmptyCart)
    ));

    let first = common::seed_pharmacy(conn).await;
    let second = common::seed_pharmacy(conn).await;
    let a = common::seed_medicine(conn, first.id, "Omeprazole", "4.00", false, Some(5)).await;
    let b = common::seed_medicine(conn, second.id, "Omeprazole", "3.90", false, Some(5)).await;
    carts::add_medicines(conn, patient.id, vec![(a.id, 1), (b.id, 1)])
        .await
        .unwrap();

    let blank = checkout::stage_checkout(conn, patient.id, "   ", PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        blank,
        CheckoutError::Rejected(CheckoutRejection::MissingAddress)
    ));

    let mixed = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        mixed,
        CheckoutError::Rejected(CheckoutRejection::MultiplePharmacies)
    ));
}

#[tokio::test]
async fn unapproved_pharmacy_cannot_sell() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_user(
        conn,
        medicart_orderservice::domain::roles::Role::Pharmacist,
        false,
    )
    .await;
    let patient = common::seed_patient(conn).await;
    let med = common::seed_medicine(conn, pharmacy.id, "Antacid", "2.20", false, Some(5)).await;

    carts::add_medicines(conn, patient.id, vec![(med.id, 1)])
        .await
        .unwrap();
    let err = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Cod, TTL)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Rejected(CheckoutRejection::PharmacyNotApproved)
    ));
}

#[tokio::test]
async fn lines_added_after_staging_stay_in_cart() {
    let Some(pool) = common::pool().await else {
        return;
    };
    let (client, urls) = common::unreachable_apis();
    let conn = &mut pool.get().await.unwrap();

    let pharmacy = common::seed_pharmacy(conn).await;
    let patient = common::seed_patient(conn).await;
    let a = common::seed_medicine(conn, pharmacy.id, "Loratadine", "5.00", false, Some(10)).await;
    let b = common::seed_medicine(conn, pharmacy.id, "Omeprazole", "7.00", false, Some(10)).await;

    carts::add_medicines(conn, patient.id, vec![(a.id, 1)])
        .await
        .unwrap();
    let pending = checkout::stage_checkout(conn, patient.id, ADDRESS, PaymentMethod::Card, TTL)
        .await
        .unwrap();

    carts::add_medicines(conn, patient.id, vec![(a.id, 2), (b.id, 2)])
        .await
        .unwrap();

    let receipt = checkout::confirm_checkout(conn, &client, &urls, patient.id, pending.token)
        .await
        .unwrap();
    assert_eq!(receipt.order_items.len(), 1);
    assert_eq!(receipt.order_items[0].quantity, 1);

    let cart = carts::cart_view(conn, patient.id).await.unwrap();
    let remaining: Vec<(i32, i32)> = cart
        .lines
        .iter()
        .map(|line| (line.item.medicine_id, line.item.quantity))
        .collect();
    assert_eq!(remaining, vec![(a.id, 2), (b.id, 2)]);
    assert_eq!(cart.total_price, "24.00".parse::<BigDecimal>().unwrap());
}
