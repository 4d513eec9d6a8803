//! HTTP API: request handlers and the payload types they exchange.

pub mod handlers;
pub mod models;
