//! OpenAPI documentation for the gateway's HTTP surface.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "OCR Gateway API",
        description = "Forwards document uploads to an OCR table-recognition service and reports whether \
                       the returned spreadsheet carries data."
    ),
    paths(api::handlers::ocr::recognize),
    components(schemas(api::models::ocr::OcrResponse, api::models::ocr::ErrorResponse)),
    tags(
        (name = "ocr", description = "Document recognition")
    )
)]
pub struct ApiDoc;
