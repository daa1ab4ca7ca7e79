use std::collections::HashMap;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::MedicineEntity;

/// A cart line as snapshotted into a pending checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutLine {
    pub medicine_id: i32,
    pub quantity: i32,
}

/// A checkout line joined with the live medicine row at commit time.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub medicine_id: i32,
    pub medicine_name: String,
    pub pharmacy_id: Option<i32>,
    pub price: BigDecimal,
    pub prescription_required: bool,
    pub quantity: i32,
}

impl PricedLine {
    pub fn new(medicine: &MedicineEntity, quantity: i32) -> Self {
        Self {
            medicine_id: medicine.id,
            medicine_name: medicine.name.clone(),
            pharmacy_id: medicine.pharmacy_id,
            price: medicine.price.clone(),
            prescription_required: medicine.prescription_required,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutRejection {
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("A delivery address is required")]
    MissingAddress,
    #[error("{medicine} is not sold by any pharmacy")]
    NoPharmacy { medicine: String },
    #[error("Your cart contains items from more than one pharmacy; check out each pharmacy separately")]
    MultiplePharmacies,
    #[error("The pharmacy for this order is not approved")]
    PharmacyNotApproved,
    #[error("A verified prescription is required to check out prescription-only medicines")]
    PrescriptionRequired,
    #[error("The prescription for this checkout is no longer valid")]
    PrescriptionNoLongerValid,
    #[error("No stock available for {medicine}")]
    NoStock { medicine: String },
    #[error("Not enough stock for {medicine}: requested {requested}, available {available}")]
    NotEnoughStock {
        medicine: String,
        requested: i32,
        available: i32,
    },
}

impl CheckoutRejection {
    /// Validation failures are detected before any mutation; the rest inside the transaction.
    pub fn is_validation(&self) -> bool {
        match self {
            CheckoutRejection::EmptyCart
            | CheckoutRejection::MissingAddress
            | CheckoutRejection::NoPharmacy { .. }
            | CheckoutRejection::MultiplePharmacies
            | CheckoutRejection::PharmacyNotApproved => true,
            CheckoutRejection::PrescriptionRequired
            | CheckoutRejection::PrescriptionNoLongerValid
            | CheckoutRejection::NoStock { .. }
            | CheckoutRejection::NotEnoughStock { .. } => false,
        }
    }
}

pub fn needs_prescription(lines: &[PricedLine]) -> bool {
    lines.iter().any(|line| line.prescription_required)
}

/// The fulfilling pharmacy is the one selling the first line. Lines from any other
/// pharmacy are rejected rather than silently attributed to it.
pub fn resolve_pharmacy(lines: &[PricedLine]) -> Result<i32, CheckoutRejection> {
    let first = lines.first().ok_or(CheckoutRejection::EmptyCart)?;
    let pharmacy_id = first.pharmacy_id.ok_or_else(|| CheckoutRejection::NoPharmacy {
        medicine: first.medicine_name.clone(),
    })?;

    for line in &lines[1..] {
        match line.pharmacy_id {
            Some(id) if id == pharmacy_id => {}
            Some(_) => return Err(CheckoutRejection::MultiplePharmacies),
            None => {
                return Err(CheckoutRejection::NoPharmacy {
                    medicine: line.medicine_name.clone(),
                });
            }
        }
    }

    Ok(pharmacy_id)
}

/// A locked stock row as seen inside the checkout transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedStock {
    pub stock_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDecrement {
    pub stock_id: i32,
    pub medicine_id: i32,
    pub quantity: i32,
    pub remaining: i32,
}

/// Decides every decrement up front so a shortage on any line rejects the whole checkout.
pub fn plan_decrements(
    lines: &[PricedLine],
    locked: &HashMap<i32, LockedStock>,
) -> Result<Vec<StockDecrement>, CheckoutRejection> {
    let mut remaining: HashMap<i32, i32> = HashMap::new();
    let mut decrements = Vec::with_capacity(lines.len());

    for line in lines {
        let stock = locked
            .get(&line.medicine_id)
            .ok_or_else(|| CheckoutRejection::NoStock {
                medicine: line.medicine_name.clone(),
            })?;
        let available = remaining.entry(line.medicine_id).or_insert(stock.quantity);

        if *available < line.quantity {
            return Err(CheckoutRejection::NotEnoughStock {
                medicine: line.medicine_name.clone(),
                requested: line.quantity,
                available: *available,
            });
        }

        *available -= line.quantity;
        decrements.push(StockDecrement {
            stock_id: stock.stock_id,
            medicine_id: line.medicine_id,
            quantity: line.quantity,
            remaining: *available,
        });
    }

    Ok(decrements)
}
