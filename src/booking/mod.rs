//! Availability, slot expansion, conflict-checked booking and the
//! appointment lifecycle.

pub mod appointment;
pub mod error;
pub mod expansion;
pub mod notify;
pub mod pg_store;
pub mod policy;
pub mod schedule;
pub mod service;
pub mod store;

#[cfg(test)]
pub mod memory_store;

pub use error::BookingError;
pub use service::BookingService;
