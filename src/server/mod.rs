//! HTTP surface: one GET route per export.

mod error;
pub mod routes;

use crate::app::pipelines::{MappingContext, STRIPE_GATEWAY};
use crate::config::AppConfig;
use crate::core::fetcher::ChargifyClient;
use crate::core::PageSource;
use std::sync::Arc;

pub use routes::router;

/// 每個 request 共用的唯讀狀態
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn PageSource>,
    pub context: Arc<MappingContext>,
}

impl AppState {
    pub fn new(source: Arc<dyn PageSource>, context: Arc<MappingContext>) -> Self {
        Self { source, context }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = ChargifyClient::new(config.base_url(), config.chargify_api_key.clone())
            .with_per_page(config.per_page);

        // Stripe 金鑰只用來判斷卡片是否存放在 Stripe
        let gateway = (!config.stripe_api_key.is_empty()).then(|| STRIPE_GATEWAY.to_string());
        let context = MappingContext::new(config.mapping.clone(), gateway);

        Self::new(Arc::new(client), Arc::new(context))
    }
}
