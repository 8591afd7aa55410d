//! Worker process wiring

pub mod database;
pub mod workers;
