use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const ORDER_NUMBER_PREFIX: &str = "ORD-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("{other} is not a valid order status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("{other} is not a valid payment status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash on delivery
    #[default]
    Cod,
    Card,
    Upi,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
        }
    }
}

/// `ORD-` followed by 8 uppercase hex characters.
pub fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{ORDER_NUMBER_PREFIX}{}", hex[..8].to_ascii_uppercase())
}

pub fn is_valid_order_number(value: &str) -> bool {
    value
        .strip_prefix(ORDER_NUMBER_PREFIX)
        .is_some_and(|suffix| {
            suffix.len() == 8
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
}

/// Tracking input is trimmed and upper-cased before lookup.
pub fn normalize_order_number(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn line_total(quantity: i32, price: &BigDecimal) -> BigDecimal {
    price * BigDecimal::from(quantity)
}

pub fn order_total<'a>(lines: impl IntoIterator<Item = (i32, &'a BigDecimal)>) -> BigDecimal {
    lines
        .into_iter()
        .fold(BigDecimal::from(0), |acc, (quantity, price)| {
            acc + line_total(quantity, price)
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn money(value: &str) -> BigDecimal {
        value.parse().unwrap()
    }

    #[test]
    fn order_numbers_have_expected_shape() {
        for _ in 0..50 {
            let number = generate_order_number();
            assert_eq!(number.len(), 12);
            assert!(is_valid_order_number(&number), "{number}");
        }
    }

    #[test]
    fn order_numbers_are_distinct() {
        let numbers: HashSet<String> = (0..200).map(|_| generate_order_number()).collect();
        assert_eq!(numbers.len(), 200);
    }

    #[test]
    fn rejects_malformed_order_numbers() {
        assert!(!is_valid_order_number("ORD-5a1685e2"));
        assert!(!is_valid_order_number("ORD-5A1685E"));
        assert!(!is_valid_order_number("5A1685E2"));
        assert!(is_valid_order_number("ORD-5A1685E2"));
    }

    #[test]
    fn normalizes_tracking_input() {
        assert_eq!(normalize_order_number("  ord-5a1685e2 "), "ORD-5A1685E2");
    }

    #[test]
    fn totals_are_exact_decimal_sums() {
        let a = money("19.99");
        let b = money("0.10");
        let total = order_total([(3, &a), (7, &b)]);
        assert_eq!(total, money("60.67"));
        assert_eq!(order_total(std::iter::empty()), money("0"));
    }

    #[test]
    fn statuses_parse_from_storage_strings() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert_eq!("paid".parse::<PaymentStatus>(), Ok(PaymentStatus::Paid));
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
