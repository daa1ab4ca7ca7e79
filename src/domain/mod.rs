//! Storage-free rules of the checkout and delivery core.

pub mod checkout;
pub mod deliveries;
pub mod orders;
pub mod prescriptions;
pub mod roles;
