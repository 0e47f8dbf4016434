//! Signal Billing - subscription-gated access for a trading-signals API
//!
//! Users register, pay once through Stripe or Razorpay, and the payment is
//! reconciled into a local entitlement flag from signed provider callbacks.
//! Duplicate and concurrent deliveries are absorbed by an idempotency store,
//! and sensitive endpoints sit behind a fixed-window rate limiter.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod idempotency;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod store;
