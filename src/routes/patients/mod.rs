pub mod carts;
pub mod checkout;
pub mod orders;
pub mod prescriptions;
