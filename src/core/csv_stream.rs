use crate::core::{ColumnSchema, FlatRow, RecordFlattener, Result, SourceRecord};
use crate::utils::error::ExportError;
use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;

/// 每個 chunk 使用獨立的 writer，寫完即交給 response body
fn chunk_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Bytes> {
    let buffer = writer.into_inner().map_err(|e| {
        ExportError::IoError(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })?;
    Ok(Bytes::from(buffer))
}

pub fn encode_header(schema: &ColumnSchema) -> Result<Bytes> {
    let mut writer = chunk_writer();
    writer.write_record(schema.columns())?;
    finish(writer)
}

pub fn encode_rows(rows: &[FlatRow<'_>]) -> Result<Bytes> {
    let mut writer = chunk_writer();
    for row in rows {
        writer.write_record(row.values())?;
    }
    finish(writer)
}

/// Flattens one page and encodes it; returns the chunk and its row count.
pub fn encode_page<F>(flattener: &F, records: &[SourceRecord]) -> Result<(Bytes, usize)>
where
    F: RecordFlattener + ?Sized,
{
    let mut rows = Vec::new();
    for record in records {
        rows.extend(flattener.flatten(record)?);
    }
    let chunk = encode_rows(&rows)?;
    Ok((chunk, rows.len()))
}

/// Header chunk first, then one chunk per page as pages arrive.
///
/// Nothing beyond the current page is buffered. The header is produced even
/// when `pages` is empty.
pub fn csv_stream<F, P>(flattener: Arc<F>, pages: P) -> impl Stream<Item = Result<Bytes>> + Send
where
    F: RecordFlattener + ?Sized + 'static,
    P: Stream<Item = Result<Vec<SourceRecord>>> + Send + 'static,
{
    let header = encode_header(flattener.schema());
    let entity = flattener.entity();
    let mut rows_written = 0usize;

    let body = pages.and_then(move |records| {
        let chunk = encode_page(flattener.as_ref(), &records).map(|(chunk, rows)| {
            rows_written += rows;
            tracing::debug!(
                "📝 {}: encoded {} rows from {} records ({} total)",
                entity,
                rows,
                records.len(),
                rows_written
            );
            chunk
        });
        future::ready(chunk)
    });

    stream::once(future::ready(header)).chain(body)
}
