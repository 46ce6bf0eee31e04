//! Fraudwatch - real-time monitoring client for a financial-transaction stream.
//!
//! The backend pushes `new_transaction` and `fraud_alert` events over a
//! persistent WebSocket. This crate keeps bounded, consistent in-memory views
//! of both feeds, reconciles alerts against transactions that may arrive out
//! of order (or not at all), and ships a scenario driver that submits
//! precisely timed synthetic transactions to exercise the backend's
//! fraud-detection rules.

pub mod api;
pub mod buffer;
pub mod models;
pub mod monitor;
pub mod scenario;
