//! Unmapped dumps of Chargify records, useful for checking a migration by hand.

use super::fields::scalar_text;
use crate::core::csv_stream::{encode_header, encode_rows};
use crate::core::export::{prefetch_pages, CsvExport};
use crate::core::{ColumnSchema, Entity, FlatRow, PageSource, Result, SourceRecord};
use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;

/// 巢狀物件展開成 `parent[child]` 欄位，陣列以 JSON 字串輸出
pub fn flatten_record(record: &SourceRecord) -> Vec<(String, String)> {
    let mut output = Vec::new();
    flatten_into(None, &record.data, &mut output);
    output
}

fn flatten_into(prefix: Option<&str>, data: &Map<String, Value>, output: &mut Vec<(String, String)>) {
    for (key, value) in data {
        let column = match prefix {
            Some(prefix) => format!("{}[{}]", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(Some(&column), nested, output),
            Value::Array(_) => output.push((column, value.to_string())),
            scalar => output.push((column, scalar_text(scalar))),
        }
    }
}

/// Header from the first record; later records are aligned to it.
fn encode_raw_page(schema: &mut Option<ColumnSchema>, records: &[SourceRecord]) -> Result<Bytes> {
    let mut chunk = Vec::new();

    if schema.is_none() {
        if let Some(first) = records.first() {
            let header = ColumnSchema::new(flatten_record(first).into_iter().map(|(column, _)| column));
            chunk.extend_from_slice(&encode_header(&header)?);
            *schema = Some(header);
        }
    }
    let Some(schema) = schema.as_ref() else {
        return Ok(Bytes::new());
    };

    let rows: Vec<FlatRow<'_>> = records
        .iter()
        .map(|record| {
            let mut row = FlatRow::new(schema);
            for (column, value) in flatten_record(record) {
                if schema.position(&column).is_some() {
                    row.set(&column, value);
                }
            }
            row
        })
        .collect();
    chunk.extend_from_slice(&encode_rows(&rows)?);

    Ok(Bytes::from(chunk))
}

/// Streams every record of `entity` as-is. An empty account gives an empty body.
pub async fn export_raw_csv<S>(source: Arc<S>, entity: Entity) -> Result<CsvExport>
where
    S: PageSource + ?Sized + 'static,
{
    tracing::info!("🚀 Starting raw {} dump", entity);

    let pages = prefetch_pages(source, entity).await?;
    let mut schema: Option<ColumnSchema> = None;
    let body = pages.and_then(move |records| future::ready(encode_raw_page(&mut schema, &records)));

    Ok(CsvExport {
        filename: format!("chargify_{}.csv", entity.name()),
        body: body.boxed(),
    })
}
