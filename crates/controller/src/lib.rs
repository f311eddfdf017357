//! Traffic-steering controller
//!
//! HTTP control endpoint that runs the steering pipeline on demand, plus
//! health, readiness and Prometheus endpoints.

pub mod api;
pub mod config;
