//! Test utilities: in-memory workbooks and a gateway wired to a mock OCR service.

use crate::{AppState, build_router, config::Config};
use axum_test::TestServer;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::io::{Cursor, Write};
use std::time::Duration;
use url::Url;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

/// Build an XLSX archive with one worksheet per entry, each entry being the `<sheetData>` body.
pub fn xlsx_workbook(sheets: &[&str]) -> Vec<u8> {
    build_workbook(sheets, "")
}

/// Like [`xlsx_workbook`], with a `<workbookView>` carrying `activeTab` when given.
pub fn xlsx_workbook_with_active_tab(sheets: &[&str], active_tab: Option<&str>) -> Vec<u8> {
    let view = match active_tab {
        Some(tab) => format!(r#"<bookViews><workbookView activeTab="{tab}"/></bookViews>"#),
        None => r#"<bookViews><workbookView/></bookViews>"#.to_string(),
    };
    build_workbook(sheets, &view)
}

fn build_workbook(sheets: &[&str], book_views: &str) -> Vec<u8> {
    let mut sheet_list = String::new();
    let mut relationships = String::new();
    for index in 1..=sheets.len() {
        sheet_list.push_str(&format!(r#"<sheet name="Sheet{index}" sheetId="{index}" r:id="rId{index}"/>"#));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{index}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{index}.xml"/>"#
        ));
    }

    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{book_views}<sheets>{sheet_list}</sheets></workbook>"#
    );
    let workbook_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{relationships}</Relationships>"#
    );

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut add = |name: &str, content: &str| {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    };

    add("[Content_Types].xml", CONTENT_TYPES);
    add("_rels/.rels", ROOT_RELS);
    add("xl/workbook.xml", &workbook);
    add("xl/_rels/workbook.xml.rels", &workbook_rels);
    for (index, sheet_data) in sheets.iter().enumerate() {
        let sheet = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_data}</sheetData></worksheet>"#
        );
        add(&format!("xl/worksheets/sheet{}.xml", index + 1), &sheet);
    }

    writer.finish().unwrap().into_inner()
}

/// Base64 text of a single-sheet workbook.
pub fn encoded_workbook(sheet_data: &str) -> String {
    STANDARD.encode(xlsx_workbook(&[sheet_data]))
}

/// Sheet data with a string in A1.
pub fn inline_string_a1(text: &str) -> String {
    format!(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>{text}</t></is></c></row>"#)
}

/// Sheet data with a number in A1.
pub fn numeric_a1(value: &str) -> String {
    format!(r#"<row r="1"><c r="A1"><v>{value}</v></c></row>"#)
}

/// Default configuration pointed at a mock OCR service.
pub fn create_test_config(upstream_url: &str) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.upstream.url = Url::parse(upstream_url).expect("valid mock server URL");
    config.upstream.timeout = Duration::from_secs(5);
    config
}

pub fn create_test_server(config: Config) -> TestServer {
    let state = AppState::new(config).expect("Failed to create application state");
    let router = build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// A URL on which nothing is listening.
pub async fn unreachable_upstream_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/recognize")
}
