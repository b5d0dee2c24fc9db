//! Streaming CSV export of a filtered, sorted list query.
//!
//! Rows are pulled from a `RowStream` and written through a `csv` writer;
//! every `CSV_FLUSH_ROWS` rows the buffered bytes go out as one body chunk,
//! so at most one batch is held in memory.

use anyhow::{Result, anyhow};
use async_stream::try_stream;
use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use tokio_stream::StreamExt;
use tracing::error;

use super::source::RowStream;
use super::types::Row;

/// Rows per emitted body chunk.
pub const CSV_FLUSH_ROWS: usize = 1000;

/// Field delimiter.
pub const CSV_DELIMITER: u8 = b';';

/// Column reserved for row actions in list templates; never exported.
const ACTION_COLUMN: &str = "action";

fn new_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .from_writer(Vec::new())
}

/// Swap in a fresh writer and return everything written so far.
fn take_chunk(writer: &mut csv::Writer<Vec<u8>>) -> Result<Bytes> {
    let full = std::mem::replace(writer, new_writer());
    let data = full
        .into_inner()
        .map_err(|e| anyhow!("failed to flush csv chunk: {}", e.error()))?;
    Ok(Bytes::from(data))
}

/// Header fields taken from the first row.
fn header_fields(row: &Row) -> Vec<String> {
    row.keys()
        .filter(|k| k.as_str() != ACTION_COLUMN)
        .cloned()
        .collect()
}

/// Text form of one cell.
fn format_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Encode a row stream as CSV body chunks.
///
/// The first chunk starts with the header. An empty source produces no
/// chunks at all.
pub fn csv_chunks(mut rows: RowStream) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
    try_stream! {
        let mut writer = new_writer();
        let mut fields: Option<Vec<String>> = None;
        let mut pending = 0usize;

        while let Some(row) = rows.next().await {
            let row = row?;

            if fields.is_none() {
                let header = header_fields(&row);
                writer.write_record(&header)?;
                fields = Some(header);
            }
            let columns = fields.as_deref().unwrap_or_default();

            writer.write_record(columns.iter().map(|c| format_value(row.get(c))))?;
            pending += 1;

            if pending == CSV_FLUSH_ROWS {
                yield take_chunk(&mut writer)?;
                pending = 0;
            }
        }

        if pending > 0 {
            yield take_chunk(&mut writer)?;
        }
    }
}

/// `text/csv` response streaming the given rows.
///
/// A source error mid-stream is logged and aborts the body.
pub fn csv_response(rows: RowStream) -> Response {
    let chunks = csv_chunks(rows).map(|chunk| {
        chunk.inspect_err(|e| error!(error = %e, "csv export aborted"))
    });

    (
        [(header::CONTENT_TYPE, "text/csv")],
        Body::from_stream(chunks),
    )
        .into_response()
}
