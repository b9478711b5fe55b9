//! Library exports for authlink, shared between the binary and tests.

pub mod config;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod models;
pub mod reconciler;
pub mod routes;
pub mod sources;
pub mod startup;
pub mod state;
pub mod store;
pub mod utils;
