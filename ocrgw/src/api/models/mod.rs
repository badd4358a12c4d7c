//! Request and response data models.

pub mod ocr;
