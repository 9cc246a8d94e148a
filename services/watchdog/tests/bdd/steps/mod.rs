//! BDD step definitions for the watchdog service

pub mod alert_steps;
pub mod cycle_steps;
pub mod dashboard_steps;
pub mod fetch_steps;
