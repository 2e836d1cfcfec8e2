use crate::domain::model::{ColumnSchema, Entity, FlatRow, Page, PageCursor, SourceRecord};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 分頁資料來源（Chargify API 或測試替身）
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, entity: Entity, cursor: PageCursor) -> Result<Page>;
}

/// Maps one source record to zero or more rows of a fixed schema.
///
/// Schemas live in statics, so rows outlive the flattener that produced them.
pub trait RecordFlattener: Send + Sync {
    fn entity(&self) -> Entity;

    fn schema(&self) -> &ColumnSchema;

    fn flatten(&self, record: &SourceRecord) -> Result<Vec<FlatRow<'static>>>;
}
