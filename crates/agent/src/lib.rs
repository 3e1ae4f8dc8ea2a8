//! Host sampling agent
//!
//! The binary samples the host on a fixed interval and serves health,
//! readiness and Prometheus metrics over HTTP.

pub mod api;
