//! HTTP adapter over the fairness engine.
//!
//! JSON bodies are camelCase. Errors carry `{ requestId, error: { code, message } }`
//! and every response echoes the `x-request-id` header.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{create_app, ApiServer};
