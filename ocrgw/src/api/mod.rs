//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! The gateway exposes a single functional endpoint, `POST /ocr`, documented at `/docs` when the
//! server is running.

pub mod handlers;
pub mod models;
