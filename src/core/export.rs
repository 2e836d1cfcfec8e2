use crate::core::csv_stream::csv_stream;
use crate::core::fetcher::paginate;
use crate::core::{Entity, PageSource, RecordFlattener, Result, SourceRecord};
use crate::utils::error::ExportError;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;

pub type CsvBody = BoxStream<'static, Result<Bytes>>;

/// A CSV export whose body is produced lazily, page by page.
pub struct CsvExport {
    pub filename: String,
    pub body: CsvBody,
}

impl CsvExport {
    /// 收集整個 body（測試與小型匯出用）
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat())
    }
}

/// Starts paginating and waits for the first page.
///
/// A failure on the first page surfaces here, before any response byte is
/// committed. Later failures are yielded by the returned stream.
pub async fn prefetch_pages<S>(
    source: Arc<S>,
    entity: Entity,
) -> Result<impl Stream<Item = Result<Vec<SourceRecord>>> + Send + 'static>
where
    S: PageSource + ?Sized + 'static,
{
    let mut pages = paginate(source, entity).boxed();
    let first = pages.try_next().await?;
    Ok(stream::iter(first.map(Ok::<_, ExportError>)).chain(pages))
}

/// Fetch → flatten → CSV pipeline for one entity.
pub async fn export_csv<S, F>(source: Arc<S>, flattener: Arc<F>) -> Result<CsvExport>
where
    S: PageSource + ?Sized + 'static,
    F: RecordFlattener + ?Sized + 'static,
{
    let entity = flattener.entity();
    tracing::info!("🚀 Starting {} export", entity);

    let pages = prefetch_pages(source, entity).await?;

    Ok(CsvExport {
        filename: entity.filename(),
        body: csv_stream(flattener, pages).boxed(),
    })
}
