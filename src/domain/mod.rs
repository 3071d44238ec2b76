//! Domain model: orders, canonical payment records, tariffs and the ports through
//! which the reconciliation workflow reaches its collaborators.

pub mod payment;
pub mod ports;
pub mod purchase;
pub mod state;
pub mod tariff;
