use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// Users

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub pharmacy_name: Option<String>,
    pub approved: bool,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Rows are provisioned by the identity service; exposed for seeding and tests.
#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub username: String,
    pub email: String,
    pub role: String,
    pub pharmacy_name: Option<String>,
    pub approved: bool,
    pub address: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::pharmacy_couriers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PharmacyCourierEntity {
    pub pharmacy_id: i32,
    pub courier_id: i32,
    pub created_at: DateTime<Utc>,
}

// Catalog

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::medicines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MedicineEntity {
    pub id: i32,
    pub name: String,
    pub brand: String,
    pub category_id: Option<i32>,
    pub pharmacy_id: Option<i32>,
    pub description: String,
    pub sku: String,
    #[schema(value_type = String)]
    pub price: BigDecimal,
    pub expiry_date: Option<NaiveDate>,
    pub prescription_required: bool,
    pub is_active: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::medicines)]
pub struct CreateMedicineEntity {
    pub name: String,
    pub pharmacy_id: Option<i32>,
    pub price: BigDecimal,
    pub prescription_required: bool,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::stocks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StockEntity {
    pub id: i32,
    pub medicine_id: i32,
    pub pharmacy_id: i32,
    pub quantity: i32,
    pub low_stock_threshold: i32,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::stocks)]
pub struct CreateStockEntity {
    pub medicine_id: i32,
    pub pharmacy_id: i32,
    pub quantity: i32,
}

// Carts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: i32,
    pub patient_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(belongs_to(CartEntity, foreign_key = cart_id))]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub id: i32,
    pub cart_id: i32,
    pub medicine_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::carts)]
pub struct CreateCartEntity {
    pub patient_id: i32,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: i32,
    pub medicine_id: i32,
    pub quantity: i32,
}

// Prescriptions

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::prescriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PrescriptionEntity {
    pub id: i32,
    pub patient_id: i32,
    pub uploaded_file: String,
    pub uploaded_at: DateTime<Utc>,
    pub notes: String,
    pub verified: bool,
    pub used: bool,
    pub verified_by: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::prescriptions)]
pub struct CreatePrescriptionEntity {
    pub patient_id: i32,
    pub uploaded_file: String,
}

// Orders

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub order_number: String,
    pub patient_id: i32,
    pub pharmacy_id: Option<i32>,
    pub prescription_id: Option<i32>,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub delivery_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[schema(value_type = String)]
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub order_number: String,
    pub patient_id: i32,
    pub pharmacy_id: Option<i32>,
    pub prescription_id: Option<i32>,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub delivery_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Queryable, Serialize, Selectable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub medicine_id: i32,
    pub pharmacy_id: Option<i32>,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: BigDecimal,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub medicine_id: i32,
    pub pharmacy_id: Option<i32>,
    pub quantity: i32,
    pub price: BigDecimal,
}

// Deliveries

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryEntity {
    pub id: i32,
    pub order_id: i32,
    pub courier_id: Option<i32>,
    pub status: String,
    pub picked_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    pub code_expires_at: Option<DateTime<Utc>>,
    pub code_consumed_at: Option<DateTime<Utc>>,
    pub expected_delivery_time: Option<DateTime<Utc>>,
    pub distance: f64,
    pub tracking_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateDeliveryEntity {
    pub order_id: i32,
    pub courier_id: Option<i32>,
    pub status: String,
    pub expected_delivery_time: Option<DateTime<Utc>>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::deliveries)]
pub struct UpdateDeliveryAssignment {
    pub courier_id: Option<i32>,
    pub status: String,
    pub expected_delivery_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// Pending checkouts

#[derive(Queryable, Serialize, Selectable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::pending_checkouts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PendingCheckoutEntity {
    pub token: Uuid,
    pub patient_id: i32,
    #[schema(value_type = Object)]
    pub lines: Value,
    pub delivery_address: String,
    pub payment_method: String,
    pub prescription_id: Option<i32>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::pending_checkouts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePendingCheckoutEntity {
    pub token: Uuid,
    pub patient_id: i32,
    pub lines: Value,
    pub delivery_address: String,
    pub payment_method: String,
    pub prescription_id: Option<i32>,
    pub expires_at: DateTime<Utc>,
}
