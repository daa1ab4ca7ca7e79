use bigdecimal::BigDecimal;
use diesel::{
    ExpressionMethods, OptionalExtension, QueryDsl, QueryResult, SelectableHelper,
    upsert::excluded,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    domain::{checkout::CheckoutLine, orders},
    models::{CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity, MedicineEntity},
    schema::{cart_items, carts, medicines},
    services::catalog,
};

#[derive(Serialize, ToSchema)]
pub struct CartLineView {
    pub item: CartItemEntity,
    pub medicine_name: String,
    pub prescription_required: bool,
    #[schema(value_type = String)]
    pub unit_price: BigDecimal,
    #[schema(value_type = String)]
    pub subtotal: BigDecimal,
}

#[derive(Serialize, ToSchema)]
pub struct CartView {
    pub cart: CartEntity,
    pub lines: Vec<CartLineView>,
    #[schema(value_type = String)]
    pub total_price: BigDecimal,
}

/// A patient has at most one cart; it is created on first access.
pub async fn get_or_create_cart(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
) -> QueryResult<CartEntity> {
    diesel::insert_into(carts::table)
        .values(CreateCartEntity { patient_id })
        .on_conflict(carts::patient_id)
        .do_nothing()
        .execute(conn)
        .await?;

    carts::table
        .filter(carts::patient_id.eq(patient_id))
        .select(CartEntity::as_select())
        .first(conn)
        .await
}

/// Lines in insertion order, joined with their medicine.
pub async fn cart_lines(
    conn: &mut AsyncPgConnection,
    cart_id: i32,
) -> QueryResult<Vec<(CartItemEntity, MedicineEntity)>> {
    cart_items::table
        .inner_join(medicines::table)
        .filter(cart_items::cart_id.eq(cart_id))
        .order(cart_items::id.asc())
        .select((CartItemEntity::as_select(), MedicineEntity::as_select()))
        .load(conn)
        .await
}

pub async fn cart_view(conn: &mut AsyncPgConnection, patient_id: i32) -> QueryResult<CartView> {
    let cart = get_or_create_cart(conn, patient_id).await?;
    let lines: Vec<CartLineView> = cart_lines(conn, cart.id)
        .await?
        .into_iter()
        .map(|(item, medicine)| CartLineView {
            subtotal: orders::line_total(item.quantity, &medicine.price),
            item,
            medicine_name: medicine.name,
            prescription_required: medicine.prescription_required,
            unit_price: medicine.price,
        })
        .collect();
    let total_price = lines
        .iter()
        .fold(BigDecimal::from(0), |acc, line| acc + &line.subtotal);

    Ok(CartView {
        cart,
        lines,
        total_price,
    })
}

async fn ensure_purchasable(
    conn: &mut AsyncPgConnection,
    medicine_id: i32,
) -> Result<(), AppError> {
    match catalog::get_medicine(conn, medicine_id).await? {
        Some(medicine) if medicine.is_active => Ok(()),
        Some(medicine) => Err(AppError::BadRequest(format!(
            "{} is no longer available",
            medicine.name
        ))),
        None => Err(AppError::NotFoundResource(format!("Medicine {medicine_id}"))),
    }
}

/// Adds medicines to the cart. Re-adding a medicine increments its quantity.
pub async fn add_medicines(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    items: Vec<(i32, i32)>,
) -> Result<CartView, AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(
            "Please select at least one medicine".into(),
        ));
    }
    if let Some((medicine_id, _)) = items.iter().find(|(_, quantity)| *quantity < 1) {
        return Err(AppError::BadRequest(format!(
            "Quantity for medicine {medicine_id} must be at least 1"
        )));
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let cart = get_or_create_cart(conn, patient_id).await?;

            for (medicine_id, quantity) in items {
                ensure_purchasable(conn, medicine_id).await?;

                diesel::insert_into(cart_items::table)
                    .values(CreateCartItemEntity {
                        cart_id: cart.id,
                        medicine_id,
                        quantity,
                    })
                    .on_conflict((cart_items::cart_id, cart_items::medicine_id))
                    .do_update()
                    .set((
                        cart_items::quantity
                            .eq(cart_items::quantity + excluded(cart_items::quantity)),
                        cart_items::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;
            }

            touch(conn, cart.id).await?;
            Ok::<(), AppError>(())
        })
    })
    .await?;

    Ok(cart_view(conn, patient_id).await?)
}

pub async fn set_quantity(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    medicine_id: i32,
    quantity: i32,
) -> Result<CartView, AppError> {
    if quantity < 1 {
        return Err(AppError::BadRequest("Quantity must be at least 1".into()));
    }

    let cart = get_or_create_cart(conn, patient_id).await?;
    diesel::update(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::medicine_id.eq(medicine_id)),
    )
    .set((
        cart_items::quantity.eq(quantity),
        cart_items::updated_at.eq(diesel::dsl::now),
    ))
    .returning(CartItemEntity::as_returning())
    .get_result(conn)
    .await
    .optional()?
    .ok_or(AppError::NotFoundResource("Cart item".into()))?;

    touch(conn, cart.id).await?;
    Ok(cart_view(conn, patient_id).await?)
}

pub async fn remove_line(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    medicine_id: i32,
) -> Result<CartView, AppError> {
    let cart = get_or_create_cart(conn, patient_id).await?;
    let deleted = diesel::delete(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::medicine_id.eq(medicine_id)),
    )
    .execute(conn)
    .await?;

    if deleted == 0 {
        return Err(AppError::NotFoundResource("Cart item".into()));
    }

    touch(conn, cart.id).await?;
    Ok(cart_view(conn, patient_id).await?)
}

/// Removes the quantities a checkout ordered. Lines added or grown after the
/// checkout was staged keep whatever was not ordered.
pub async fn clear_lines(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    ordered: Vec<CheckoutLine>,
) -> QueryResult<()> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let Some(cart_id) = carts::table
                .filter(carts::patient_id.eq(patient_id))
                .select(carts::id)
                .first::<i32>(conn)
                .await
                .optional()?
            else {
                return Ok(());
            };

            for line in ordered {
                diesel::delete(
                    cart_items::table
                        .filter(cart_items::cart_id.eq(cart_id))
                        .filter(cart_items::medicine_id.eq(line.medicine_id))
                        .filter(cart_items::quantity.le(line.quantity)),
                )
                .execute(conn)
                .await?;

                diesel::update(
                    cart_items::table
                        .filter(cart_items::cart_id.eq(cart_id))
                        .filter(cart_items::medicine_id.eq(line.medicine_id))
                        .filter(cart_items::quantity.gt(line.quantity)),
                )
                .set((
                    cart_items::quantity.eq(cart_items::quantity - line.quantity),
                    cart_items::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)
                .await?;
            }

            touch(conn, cart_id).await?;
            Ok(())
        })
    })
    .await
}

async fn touch(conn: &mut AsyncPgConnection, cart_id: i32) -> QueryResult<usize> {
    diesel::update(carts::table.find(cart_id))
        .set(carts::updated_at.eq(diesel::dsl::now))
        .execute(conn)
        .await
}
