//! Cirrus Core
//!
//! Reconciliation engine for eventually-consistent cloud control planes:
//! bounded retry, state refresh, wait-for-state polling and per-resource
//! lifecycle orchestration.

pub mod cancel;
pub mod differ;
pub mod error;
pub mod provider;
pub mod reconciler;
pub mod refresh;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod timeouts;
pub mod wait;
