//! HTTP request handlers.
//!
//! - [`ocr`]: Upload forwarding to the OCR service and spreadsheet inspection
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Result`]; every failure is rendered as an
//! [`ErrorResponse`](crate::api::models::ocr::ErrorResponse) JSON body by the error's
//! `IntoResponse` implementation.

pub mod ocr;
