//! # bugroute
//!
//! Routes reported work items to the developer who can best take them on,
//! weighing open workload, resolution speed, and predicted stress.
//!
//! Provides the assignment engine (selection + atomic commit), a stress
//! predictor with an optional HTTP oracle, Postgres and in-memory metrics
//! stores, and OpenTelemetry observability.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;
pub mod stress;
pub mod telemetry;
