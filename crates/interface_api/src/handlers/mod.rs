//! Request handlers

pub mod bills;
pub mod debt;
pub mod health;
