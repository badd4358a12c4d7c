//! Inspection of the spreadsheet embedded in OCR results.
//!
//! The OCR service returns its table rendition as a base64-encoded XLSX workbook. The gateway
//! only needs to know whether that workbook carries anything: it reads the cached value of cell
//! A1 on the active worksheet (formulas are never evaluated) and classifies it with
//! [`holds_data`].
//!
//! The active worksheet is the `activeTab` of the first `<workbookView>` in `xl/workbook.xml`,
//! or the first worksheet when the workbook does not name one.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use calamine::{Data, Reader, Xlsx, XlsxError};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Failure to turn the `excel` payload into a readable worksheet.
#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("invalid base64 payload")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to open workbook")]
    Workbook(#[from] XlsxError),

    #[error("failed to read xl/workbook.xml")]
    Archive(#[from] ZipError),

    #[error("malformed xl/workbook.xml")]
    WorkbookXml(#[from] quick_xml::Error),

    #[error("invalid activeTab value {0:?}")]
    InvalidActiveTab(String),

    #[error("active sheet index {index} out of range for {sheets} worksheet(s)")]
    ActiveSheetOutOfRange { index: usize, sheets: usize },

    #[error("workbook contains no worksheets")]
    NoWorksheet,
}

/// Decode the base64 text of a workbook.
///
/// Line breaks and other ASCII whitespace some encoders insert are skipped; padding must still
/// be canonical.
pub fn decode(encoded: &str) -> Result<Vec<u8>, SpreadsheetError> {
    let compact: Vec<u8> = encoded.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

/// Index of the sheet the workbook opens on, from the first `<workbookView activeTab="N">`.
///
/// 0 when there is no view or the view carries no `activeTab`.
pub fn active_sheet_index(workbook_bytes: &[u8]) -> Result<usize, SpreadsheetError> {
    let mut archive = ZipArchive::new(Cursor::new(workbook_bytes))?;
    let mut xml = Vec::new();
    archive
        .by_name(WORKBOOK_PART)?
        .read_to_end(&mut xml)
        .map_err(ZipError::from)?;

    let mut reader = XmlReader::from_reader(xml.as_slice());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                let active_tab = e
                    .attributes()
                    .filter_map(std::result::Result::ok)
                    .find(|attr| attr.key.as_ref() == b"activeTab");

                return match active_tab {
                    Some(attr) => {
                        let raw = String::from_utf8_lossy(&attr.value).into_owned();
                        raw.trim().parse().map_err(|_| SpreadsheetError::InvalidActiveTab(raw))
                    }
                    None => Ok(0),
                };
            }
            // Views precede <sheets>, so reaching them means there is no view
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => return Ok(0),
            Event::Eof => return Ok(0),
            _ => {}
        }
        buf.clear();
    }
}

/// Read the cached value of A1 on the active worksheet. `None` when the cell was never written.
///
/// An `activeTab` past the last worksheet is an error.
pub fn first_cell(workbook_bytes: Vec<u8>) -> Result<Option<Data>, SpreadsheetError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(workbook_bytes.as_slice()))?;

    let sheets = workbook.sheet_names().len();
    if sheets == 0 {
        return Err(SpreadsheetError::NoWorksheet);
    }

    let index = active_sheet_index(&workbook_bytes)?;
    let range = workbook
        .worksheet_range_at(index)
        .ok_or(SpreadsheetError::ActiveSheetOutOfRange { index, sheets })??;

    Ok(range.get_value((0, 0)).cloned())
}

/// Whether a cell counts as data.
///
/// Only an absent cell, an empty cell and the empty string are empty. Numeric zero, `false`,
/// the string `"0"`, dates and error values are all data.
pub fn holds_data(cell: Option<&Data>) -> bool {
    match cell {
        None | Some(Data::Empty) => false,
        Some(Data::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

/// Decode a base64 workbook and report whether its A1 cell holds data.
pub fn has_excel_data(encoded: &str) -> Result<bool, SpreadsheetError> {
    let bytes = decode(encoded)?;
    let cell = first_cell(bytes)?;
    tracing::debug!(a1 = ?cell, "Inspected active worksheet");
    Ok(holds_data(cell.as_ref()))
}
