#![allow(dead_code)]

use std::time::Duration;

use bigdecimal::BigDecimal;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use medicart_orderservice::{
    api::ApiUrls,
    config::DatabaseConfig,
    db::{self, DbPool},
    domain::{orders::PaymentMethod, roles::Role},
    models::{
        CreateMedicineEntity, CreatePrescriptionEntity, CreateStockEntity, CreateUserEntity,
        MedicineEntity, PrescriptionEntity, UserEntity,
    },
    schema::{medicines, prescriptions, stocks, users},
    services::{carts, checkout},
};
use reqwest::Client;
use tokio::sync::OnceCell;
use uuid::Uuid;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Pool against `DATABASE_URL`, or `None` when the variable is unset so the calling
/// test can return early.
pub async fn pool() -> Option<DbPool> {
    let _ = dotenvy::dotenv();
    let url = std::env::var("DATABASE_URL").ok()?;

    MIGRATED
        .get_or_init(|| async {
            db::run_migrations_blocking(db::MIGRATIONS, &url)
                .await
                .expect("migrations should run");
        })
        .await;

    let pool = db::create_pool(&DatabaseConfig {
        url,
        max_connections: 5,
    })
    .await
    .expect("pool should build");
    Some(pool)
}

/// Collaborators that refuse connections, so every external call fails fast.
pub fn unreachable_apis() -> (Client, ApiUrls) {
    (
        Client::new(),
        ApiUrls::with_base("http://127.0.0.1:9", Duration::from_millis(300)),
    )
}

pub async fn seed_user(conn: &mut AsyncPgConnection, role: Role, approved: bool) -> UserEntity {
    let username = format!("{}-{}", role, Uuid::new_v4().simple());
    diesel::insert_into(users::table)
        .values(CreateUserEntity {
            email: format!("{username}@example.test"),
            username,
            role: role.as_str().into(),
            pharmacy_name: matches!(role, Role::Pharmacist).then(|| "Corner Pharmacy".into()),
            approved,
            address: None,
        })
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .expect("user should insert")
}

pub async fn seed_pharmacy(conn: &mut AsyncPgConnection) -> UserEntity {
    seed_user(conn, Role::Pharmacist, true).await
}

pub async fn seed_patient(conn: &mut AsyncPgConnection) -> UserEntity {
    seed_user(conn, Role::Patient, true).await
}

pub async fn seed_medicine(
    conn: &mut AsyncPgConnection,
    pharmacy_id: i32,
    name: &str,
    price: &str,
    prescription_required: bool,
    stock: Option<i32>,
) -> MedicineEntity {
    let medicine: MedicineEntity = diesel::insert_into(medicines::table)
        .values(CreateMedicineEntity {
            name: name.into(),
            pharmacy_id: Some(pharmacy_id),
            price: price.parse::<BigDecimal>().expect("valid price"),
            prescription_required,
        })
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await
        .expect("medicine should insert");

    if let Some(quantity) = stock {
        diesel::insert_into(stocks::table)
            .values(CreateStockEntity {
                medicine_id: medicine.id,
                pharmacy_id,
                quantity,
            })
            .execute(conn)
            .await
            .expect("stock should insert");
    }

    medicine
}

pub async fn stock_of(conn: &mut AsyncPgConnection, medicine_id: i32) -> i32 {
    stocks::table
        .filter(stocks::medicine_id.eq(medicine_id))
        .select(stocks::quantity)
        .first(conn)
        .await
        .expect("stock row should exist")
}

pub async fn seed_verified_prescription(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
) -> PrescriptionEntity {
    let prescription: PrescriptionEntity = diesel::insert_into(prescriptions::table)
        .values(CreatePrescriptionEntity {
            patient_id,
            uploaded_file: "rx/scan.png".into(),
        })
        .returning(PrescriptionEntity::as_returning())
        .get_result(conn)
        .await
        .expect("prescription should insert");

    diesel::update(prescriptions::table.find(prescription.id))
        .set(prescriptions::verified.eq(true))
        .returning(PrescriptionEntity::as_returning())
        .get_result(conn)
        .await
        .expect("prescription should update")
}

/// Fills the patient's cart, stages and confirms a checkout. Returns the placed order receipt.
pub async fn place_order(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    lines: Vec<(i32, i32)>,
) -> checkout::CheckoutReceipt {
    let (client, urls) = unreachable_apis();
    carts::add_medicines(conn, patient_id, lines)
        .await
        .expect("cart should fill");
    let pending = checkout::stage_checkout(
        conn,
        patient_id,
        "221B Baker Street",
        PaymentMethod::Cod,
        Duration::from_secs(600),
    )
    .await
    .expect("checkout should stage");

    checkout::confirm_checkout(conn, &client, &urls, patient_id, pending.token)
        .await
        .expect("checkout should confirm")
}
