//! HTTP API Module
//!
//! Operator-facing REST surface over the cluster state store.

mod http;

pub use http::{AppState, HttpServer};
