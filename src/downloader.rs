use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::models::ContactMessage;

const HEADERS: [&str; 6] = ["Date", "Name", "Email", "Subject", "Message", "Read"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

fn row(message: &ContactMessage) -> [String; 6] {
    [
        message
            .meta
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
        message.name.clone(),
        message.email.clone(),
        message.subject.clone().unwrap_or_default(),
        message.message.clone(),
        if message.read { "yes" } else { "no" }.to_string(),
    ]
}

/// Quote a CSV field when it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert contact messages to CSV
///
/// # Arguments
/// * `messages` - Messages in the order they should appear
///
/// # Returns
/// * `String` - CSV text with a header row and CRLF line endings
pub fn to_csv(messages: &[ContactMessage]) -> String {
    let mut csv_content = HEADERS.join(",");
    csv_content.push_str("\r\n");

    for message in messages {
        let fields: Vec<String> = row(message).iter().map(|f| csv_field(f)).collect();
        csv_content.push_str(&fields.join(","));
        csv_content.push_str("\r\n");
    }

    csv_content
}

/// Convert contact messages to an XLSX workbook
///
/// # Arguments
/// * `messages` - Messages in the order they should appear
///
/// # Returns
/// * `AppResult<Vec<u8>>` - XLSX file content
pub fn to_xlsx(messages: &[ContactMessage]) -> AppResult<Vec<u8>> {
    to_xlsx_inner(messages).map_err(|e| AppError::Internal(format!("XLSX export failed: {e}")))
}

fn to_xlsx_inner(messages: &[ContactMessage]) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Messages")?;

    let bold = Format::new().set_bold();
    for (c, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, *title, &bold)?;
    }

    for (r, message) in messages.iter().enumerate() {
        let r = (r + 1) as u32;
        let [date, name, email, subject, body, _] = row(message);
        worksheet.write_string(r, 0, &date)?;
        worksheet.write_string(r, 1, &name)?;
        worksheet.write_string(r, 2, &email)?;
        worksheet.write_string(r, 3, &subject)?;
        worksheet.write_string(r, 4, &body)?;
        worksheet.write_boolean(r, 5, message.read)?;
    }

    worksheet.set_column_width(0, 20)?;
    worksheet.set_column_width(2, 28)?;
    worksheet.set_column_width(4, 60)?;

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer()
}

pub async fn handle_export_messages(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let messages = state.store.messages.list().await;
    let stamp = Utc::now().format("%Y%m%d");

    let response = match query.format {
        ExportFormat::Csv => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"messages-{stamp}.csv\""),
                ),
            ],
            to_csv(&messages),
        )
            .into_response(),
        ExportFormat::Xlsx => (
            [
                (
                    header::CONTENT_TYPE,
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                        .to_string(),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"messages-{stamp}.xlsx\""),
                ),
            ],
            to_xlsx(&messages)?,
        )
            .into_response(),
    };
    Ok(response)
}
