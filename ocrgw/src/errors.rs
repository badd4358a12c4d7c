use crate::api::models::ocr::ErrorResponse;
use crate::spreadsheet::SpreadsheetError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Failure of one stage of the recognition pipeline.
///
/// Each variant is terminal for its request and owns exactly the fields its JSON body carries.
#[derive(ThisError, Debug)]
pub enum Error {
    /// The request carried no file part named `file`
    #[error("No file uploaded")]
    MissingFile,

    /// The multipart body broke while the file was being read
    #[error("Failed to read uploaded file: {detail}")]
    InvalidUpload { detail: String },

    /// The upload exceeded the configured body limit
    #[error("Uploaded file is too large: {detail}")]
    UploadTooLarge { detail: String },

    /// The OCR service could not be reached or the exchange broke off
    #[error("Failed to contact OCR API: {detail}")]
    UpstreamUnreachable { detail: String },

    /// The OCR service answered with something other than 200
    #[error("OCR API returned an error (status {status})")]
    Upstream { status: u16, body: String },

    /// The OCR service answered 200 with an unusable body
    #[error("Failed to parse OCR API response: {detail}")]
    ResponseParse { detail: String },

    /// The embedded spreadsheet could not be decoded or opened
    #[error("Failed to process Excel file: {detail}")]
    SpreadsheetProcessing { detail: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingFile | Error::InvalidUpload { .. } => StatusCode::BAD_REQUEST,
            Error::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UpstreamUnreachable { .. }
            | Error::Upstream { .. }
            | Error::ResponseParse { .. }
            | Error::SpreadsheetProcessing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed message identifying the failed stage.
    pub fn summary(&self) -> &'static str {
        match self {
            Error::MissingFile => "No file uploaded",
            Error::InvalidUpload { .. } => "Failed to read uploaded file",
            Error::UploadTooLarge { .. } => "Uploaded file is too large",
            Error::UpstreamUnreachable { .. } => "Failed to contact OCR API",
            Error::Upstream { .. } => "OCR API returned an error",
            Error::ResponseParse { .. } => "Failed to parse OCR API response",
            Error::SpreadsheetProcessing { .. } => "Failed to process Excel file",
        }
    }

    /// The JSON body sent to the caller.
    ///
    /// The caller is a trusted frontend, so underlying error text is passed through as `detail`.
    pub fn body(&self) -> ErrorResponse {
        let (detail, status) = match self {
            Error::MissingFile => (None, None),
            Error::InvalidUpload { detail }
            | Error::UploadTooLarge { detail }
            | Error::UpstreamUnreachable { detail }
            | Error::ResponseParse { detail }
            | Error::SpreadsheetProcessing { detail } => (Some(detail.clone()), None),
            Error::Upstream { status, body } => (Some(body.clone()), Some(*status)),
        };

        ErrorResponse {
            error: self.summary().to_string(),
            detail,
            status,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::MissingFile | Error::InvalidUpload { .. } | Error::UploadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::UpstreamUnreachable { .. } | Error::Upstream { .. } | Error::ResponseParse { .. } => {
                tracing::warn!("OCR service error: {}", self);
            }
            Error::SpreadsheetProcessing { .. } => {
                tracing::error!("Spreadsheet error: {}", self);
            }
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Render an error with its whole source chain, e.g. `error sending request: connection refused`.
fn chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // hyper and reqwest sometimes repeat the inner message verbatim
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::UpstreamUnreachable { detail: chain(&err) }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ResponseParse { detail: err.to_string() }
    }
}

impl From<SpreadsheetError> for Error {
    fn from(err: SpreadsheetError) -> Self {
        Error::SpreadsheetProcessing { detail: chain(&err) }
    }
}

impl From<MultipartError> for Error {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::UploadTooLarge { detail: err.body_text() }
        } else {
            Error::InvalidUpload { detail: err.body_text() }
        }
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;
