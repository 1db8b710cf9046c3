//! Storefront - payment webhook reconciliation and role resolution
//!
//! Verifies signed Stripe webhooks, applies their effect to orders exactly
//! once, and resolves each signed-in user's role, promoting the very first
//! user to admin.

pub mod access;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod reconcile;
pub mod util;
