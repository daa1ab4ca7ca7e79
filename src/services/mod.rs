//! Database-backed operations. Each takes a connection from the caller so handlers
//! and tests share the same code paths.

pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod deliveries;
pub mod orders;
pub mod prescriptions;
pub mod roster;
