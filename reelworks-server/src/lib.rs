//! # Reelworks Server
//!
//! HTTP surface over the credit ledger and batch job scheduler.
//!
//! The server is built on Axum and exposes:
//!
//! - **Job lifecycle**: create, inspect, prioritize, and cancel batch
//!   jobs per tenant.
//! - **Worker polling**: dequeue endpoints for external worker
//!   processes and per-video status reporting.
//! - **Credits**: balance summaries, transaction history, and admin
//!   grants.
//!
//! State lives behind the `reelworks-core` store ports: PostgreSQL when
//! `DATABASE_URL` is set, an in-process store otherwise.

pub mod db;
pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
