pub mod csv_stream;
pub mod export;
pub mod fetcher;

pub use crate::domain::model::{ColumnSchema, Entity, FlatRow, Page, PageCursor, SourceRecord};
pub use crate::domain::ports::{PageSource, RecordFlattener};
pub use crate::utils::error::Result;
