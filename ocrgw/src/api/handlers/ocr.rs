use crate::AppState;
use crate::api::models::ocr::{ErrorResponse, OcrResponse};
use crate::errors::{Error, Result};
use crate::spreadsheet;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use bytes::Bytes;
use tracing::instrument;

/// Multipart field carrying the document.
pub const UPLOAD_FIELD: &str = "file";

/// A document received from the caller.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Bytes,
}

#[utoipa::path(
    post,
    path = "/ocr",
    tag = "ocr",
    summary = "Recognize a document",
    description = "Forward an uploaded document to the OCR service and return its spreadsheet rendition, \
                   the full recognition result, and whether the spreadsheet holds data in A1.",
    request_body(
        content_type = "multipart/form-data",
        description = "Document to recognize in the `file` field"
    ),
    responses(
        (status = 200, description = "Document recognized", body = OcrResponse),
        (status = 400, description = "No file uploaded, or the upload could not be read", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the configured size limit", body = ErrorResponse),
        (status = 500, description = "OCR service unreachable, failed, or returned an unusable result", body = ErrorResponse)
    )
)]
#[instrument(skip_all, fields(filename = tracing::field::Empty, size = tracing::field::Empty))]
pub async fn recognize(State(state): State<AppState>, multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Json<OcrResponse>> {
    let upload = read_upload(multipart).await?;

    let span = tracing::Span::current();
    span.record("filename", upload.filename.as_str());
    span.record("size", upload.content.len());
    tracing::info!("Forwarding upload to OCR service");

    let recognition = state.upstream.recognize(upload.content).await?.into_recognition()?;

    // Workbook parsing is CPU-bound; keep it off the async workers
    let excel_base64 = recognition.excel_base64;
    let (excel_base64, has_excel_data) = tokio::task::spawn_blocking(move || {
        let has_excel_data = spreadsheet::has_excel_data(&excel_base64);
        (excel_base64, has_excel_data)
    })
    .await
    .map_err(|e| Error::SpreadsheetProcessing { detail: e.to_string() })?;
    let has_excel_data = has_excel_data?;

    tracing::info!(has_excel_data, "Recognition complete");

    Ok(Json(OcrResponse {
        filename: upload.filename,
        excel_base64,
        ocr_json: recognition.result,
        has_excel_data,
    }))
}

/// Pull the first file part named [`UPLOAD_FIELD`] out of the request.
///
/// A body that is not multipart contains no file. A part without a filename is an ordinary form
/// field, not an upload.
async fn read_upload(multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<UploadedFile> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(%rejection, "Request is not a multipart upload");
            return Err(Error::MissingFile);
        }
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let content = field.bytes().await?;
        return Ok(UploadedFile { filename, content });
    }

    Err(Error::MissingFile)
}
