//! API request/response models for OCR recognition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Result returned to the caller after a successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OcrResponse {
    /// Filename declared by the uploader
    pub filename: String,
    /// Base64 spreadsheet exactly as the OCR service returned it
    pub excel_base64: String,
    /// The complete `result` object returned by the OCR service
    #[schema(value_type = Object)]
    pub ocr_json: Map<String, Value>,
    /// Whether cell A1 of the first worksheet holds a value
    pub has_excel_data: bool,
}

/// JSON body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Short description of the failed stage
    pub error: String,
    /// Underlying error text or upstream response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Upstream HTTP status, present when the OCR service rejected the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Envelope of a successful OCR service response.
#[derive(Debug, Deserialize)]
pub struct RecognitionEnvelope {
    pub result: Map<String, Value>,
}
