//! Delivery state machine and verification codes.
//!
//! A delivery moves `assigned -> picked -> delivered` and never backwards. An order
//! with no delivery row is implicitly unassigned. Completion goes through either the
//! code-gated path (requires `picked`) or the courier's direct path.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const VERIFICATION_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Assigned,
    Picked,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::Picked => "picked",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(DeliveryStatus::Assigned),
            "picked" => Ok(DeliveryStatus::Picked),
            "delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(format!("{other} is not a valid delivery status")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Create or re-point the delivery at a courier.
    Assign,
    PickUp,
    /// Code-gated completion.
    VerifyCode,
    /// Courier self-service completion.
    MarkDelivered,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Assign => "assign",
            Transition::PickUp => "pick up",
            Transition::VerifyCode => "verify the code for",
            Transition::MarkDelivered => "complete",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {transition} a delivery that is {}", .from.map_or("unassigned", |s| s.as_str()))]
pub struct InvalidTransition {
    pub from: Option<DeliveryStatus>,
    pub transition: Transition,
}

/// Applies `transition` to `current` (`None` = no delivery row yet).
pub fn apply(
    current: Option<DeliveryStatus>,
    transition: Transition,
) -> Result<DeliveryStatus, InvalidTransition> {
    use DeliveryStatus::*;

    let next = match (current, transition) {
        (None | Some(Assigned), Transition::Assign) => Some(Assigned),
        (Some(Assigned), Transition::PickUp) => Some(Picked),
        (Some(Picked), Transition::VerifyCode) => Some(Delivered),
        (Some(Assigned | Picked), Transition::MarkDelivered) => Some(Delivered),
        _ => None,
    };

    next.ok_or(InvalidTransition {
        from: current,
        transition,
    })
}

/// Exactly six ASCII digits.
pub fn generate_verification_code<R: Rng>(rng: &mut R) -> String {
    (0..VERIFICATION_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn is_valid_code_format(code: &str) -> bool {
    code.len() == VERIFICATION_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeRejection {
    #[error("no verification code has been issued for this delivery")]
    NotIssued,
    #[error("verification code has already been used")]
    AlreadyUsed,
    #[error("verification code has expired")]
    Expired,
    #[error("verification code is incorrect")]
    Incorrect,
}

/// Stored code state of a delivery.
#[derive(Debug, Clone, Copy)]
pub struct IssuedCode<'a> {
    pub code: Option<&'a str>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl IssuedCode<'_> {
    /// Exact, case-sensitive comparison; the candidate is not trimmed here.
    pub fn check(&self, candidate: &str, now: DateTime<Utc>) -> Result<(), CodeRejection> {
        let code = self.code.ok_or(CodeRejection::NotIssued)?;
        if self.consumed_at.is_some() {
            return Err(CodeRejection::AlreadyUsed);
        }
        if self.expires_at.is_some_and(|expires_at| now > expires_at) {
            return Err(CodeRejection::Expired);
        }
        if code != candidate {
            return Err(CodeRejection::Incorrect);
        }
        Ok(())
    }
}

/// `None` when the delivery is not finished or has no expected time.
pub fn is_on_time(
    delivered_at: Option<DateTime<Utc>>,
    expected_delivery_time: Option<DateTime<Utc>>,
) -> Option<bool> {
    Some(delivered_at? <= expected_delivery_time?)
}

/// Fraction of measurable deliveries that arrived on time.
pub fn on_time_rate(
    deliveries: impl IntoIterator<Item = (Option<DateTime<Utc>>, Option<DateTime<Utc>>)>,
) -> Option<f64> {
    let (on_time, total) = deliveries
        .into_iter()
        .filter_map(|(delivered_at, expected)| is_on_time(delivered_at, expected))
        .fold((0u32, 0u32), |(on_time, total), hit| {
            (on_time + u32::from(hit), total + 1)
        });

    (total > 0).then(|| f64::from(on_time) / f64::from(total))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn happy_path_is_assigned_picked_delivered() {
        let assigned = apply(None, Transition::Assign).unwrap();
        let picked = apply(Some(assigned), Transition::PickUp).unwrap();
        let delivered = apply(Some(picked), Transition::VerifyCode).unwrap();
        assert_eq!((assigned, picked, delivered), (Assigned, Picked, Delivered));
    }

    #[test]
    fn transitions_never_go_backwards() {
        assert!(apply(Some(Picked), Transition::Assign).is_err());
        assert!(apply(Some(Delivered), Transition::Assign).is_err());
        assert!(apply(Some(Delivered), Transition::PickUp).is_err());
        assert!(apply(Some(Picked), Transition::PickUp).is_err());
        assert!(apply(Some(Delivered), Transition::MarkDelivered).is_err());
        assert!(apply(Some(Delivered), Transition::VerifyCode).is_err());
    }

    #[test]
    fn code_path_cannot_skip_pickup() {
        let err = apply(Some(Assigned), Transition::VerifyCode).unwrap_err();
        assert_eq!(err.from, Some(Assigned));
        assert_eq!(
            err.to_string(),
            "cannot verify the code for a delivery that is assigned"
        );
        assert!(apply(None, Transition::VerifyCode).is_err());
    }

    #[test]
    fn direct_path_may_skip_pickup() {
        assert_eq!(apply(Some(Assigned), Transition::MarkDelivered), Ok(Delivered));
        let err = apply(None, Transition::MarkDelivered).unwrap_err();
        assert_eq!(err.to_string(), "cannot complete a delivery that is unassigned");
    }

    #[test]
    fn reassignment_allowed_before_pickup() {
        assert_eq!(apply(Some(Assigned), Transition::Assign), Ok(Assigned));
    }

    #[test]
    fn codes_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let code = generate_verification_code(&mut rng);
            assert!(is_valid_code_format(&code), "{code}");
        }
        assert!(!is_valid_code_format("12345"));
        assert!(!is_valid_code_format("12345a"));
        assert!(!is_valid_code_format("1234567"));
    }

    #[test]
    fn code_check_is_exact() {
        let now = Utc::now();
        let issued = IssuedCode {
            code: Some("012345"),
            expires_at: Some(now + Duration::hours(1)),
            consumed_at: None,
        };
        assert_eq!(issued.check("012345", now), Ok(()));
        assert_eq!(issued.check("12345", now), Err(CodeRejection::Incorrect));
        assert_eq!(issued.check(" 012345", now), Err(CodeRejection::Incorrect));
        assert_eq!(issued.check("999999", now), Err(CodeRejection::Incorrect));
    }

    #[test]
    fn consumed_expired_and_missing_codes_are_rejected() {
        let now = Utc::now();
        let consumed = IssuedCode {
            code: Some("111111"),
            expires_at: None,
            consumed_at: Some(now),
        };
        assert_eq!(consumed.check("111111", now), Err(CodeRejection::AlreadyUsed));

        let expired = IssuedCode {
            code: Some("111111"),
            expires_at: Some(now - Duration::seconds(1)),
            consumed_at: None,
        };
        assert_eq!(expired.check("111111", now), Err(CodeRejection::Expired));

        let missing = IssuedCode {
            code: None,
            expires_at: None,
            consumed_at: None,
        };
        assert_eq!(missing.check("111111", now), Err(CodeRejection::NotIssued));
    }

    #[test]
    fn on_time_is_inclusive_of_expected_time() {
        let expected = Utc::now();
        assert_eq!(is_on_time(Some(expected), Some(expected)), Some(true));
        assert_eq!(
            is_on_time(Some(expected + Duration::seconds(1)), Some(expected)),
            Some(false)
        );
        assert_eq!(is_on_time(None, Some(expected)), None);
        assert_eq!(is_on_time(Some(expected), None), None);
    }

    #[test]
    fn on_time_rate_ignores_unmeasurable_deliveries() {
        let t = Utc::now();
        let rate = on_time_rate([
            (Some(t), Some(t + Duration::minutes(5))),
            (Some(t + Duration::minutes(10)), Some(t)),
            (None, Some(t)),
            (Some(t), None),
        ]);
        assert_eq!(rate, Some(0.5));
        assert_eq!(on_time_rate([]), None);
    }
}
