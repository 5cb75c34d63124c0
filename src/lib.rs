//! Muster - volunteer organization backend
//!
//! Departments run missions; missions are split into shifts with a fixed
//! number of places; volunteers ask to fill them and managers decide.
//!
//! ## Layers
//!
//! - **routes**: REST JSON API under `/api` with bearer authentication
//! - **services**: business rules, authorization, audit trail, domain events
//! - **notify**: turns domain events into notifications and mail
//! - **db**: typed collections over MongoDB or an in-memory store

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod notify;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ApiError, Result};
