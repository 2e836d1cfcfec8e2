pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use app::pipelines::{flattener_for, MappingContext};
pub use config::{AppConfig, CliArgs};
pub use core::export::{export_csv, CsvExport};
pub use core::fetcher::ChargifyClient;
pub use server::{router, AppState};
pub use utils::error::{ExportError, Result};
