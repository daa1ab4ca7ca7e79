//! Medicine lookup and the locked stock-decrement primitive.

use std::collections::HashMap;

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    domain::checkout::LockedStock,
    models::{MedicineEntity, StockEntity},
    schema::{medicines, stocks},
};

pub async fn get_medicine(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> QueryResult<Option<MedicineEntity>> {
    medicines::table
        .find(id)
        .select(MedicineEntity::as_select())
        .first(conn)
        .await
        .optional()
}

pub async fn get_medicines(
    conn: &mut AsyncPgConnection,
    ids: &[i32],
) -> QueryResult<HashMap<i32, MedicineEntity>> {
    let medicines: Vec<MedicineEntity> = medicines::table
        .filter(medicines::id.eq_any(ids))
        .select(MedicineEntity::as_select())
        .load(conn)
        .await?;

    Ok(medicines.into_iter().map(|m| (m.id, m)).collect())
}

/// Locks the stock rows of `pharmacy_id` for the given medicines until the enclosing
/// transaction ends. Rows are locked in ascending medicine order so concurrent
/// checkouts over overlapping carts cannot deadlock.
pub async fn lock_stocks(
    conn: &mut AsyncPgConnection,
    pharmacy_id: i32,
    medicine_ids: &[i32],
) -> QueryResult<HashMap<i32, LockedStock>> {
    let rows: Vec<StockEntity> = stocks::table
        .filter(stocks::pharmacy_id.eq(pharmacy_id))
        .filter(stocks::medicine_id.eq_any(medicine_ids))
        .order(stocks::medicine_id.asc())
        .select(StockEntity::as_select())
        .for_update()
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|stock| {
            (
                stock.medicine_id,
                LockedStock {
                    stock_id: stock.id,
                    quantity: stock.quantity,
                },
            )
        })
        .collect())
}

/// Decrements a stock row only if it holds at least `quantity`. Returns `None` when the
/// floor check fails, leaving the row untouched.
pub async fn decrement_stock(
    conn: &mut AsyncPgConnection,
    stock_id: i32,
    quantity: i32,
) -> QueryResult<Option<StockEntity>> {
    diesel::update(
        stocks::table
            .find(stock_id)
            .filter(stocks::quantity.ge(quantity)),
    )
    .set(stocks::quantity.eq(stocks::quantity - quantity))
    .returning(StockEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
}
