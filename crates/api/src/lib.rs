//! HTTP surface of the notification pipeline: health, Prometheus metrics and
//! operator endpoints for the delivery queue.

pub mod routes;
pub mod state;
