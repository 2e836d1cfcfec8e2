//! Chargify → Chargebee record flatteners, one per exported entity.

pub mod customers;
pub mod fields;
pub mod invoices;
pub mod raw;
pub mod subscriptions;

use crate::config::mapping::MappingConfig;
use crate::core::{Entity, RecordFlattener};
use std::sync::Arc;

pub use customers::CustomerFlattener;
pub use invoices::InvoiceFlattener;
pub use raw::export_raw_csv;
pub use subscriptions::SubscriptionFlattener;

/// Chargebee gateway id used when a Stripe key is configured
pub const STRIPE_GATEWAY: &str = "stripe";

/// 所有 flattener 共用的唯讀設定
#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    mapping: MappingConfig,
    payment_gateway: Option<String>,
}

impl MappingContext {
    pub fn new(mapping: MappingConfig, payment_gateway: Option<String>) -> Self {
        Self {
            mapping,
            payment_gateway,
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.mapping.default_currency
    }

    pub fn tax_name(&self) -> &str {
        &self.mapping.tax_name
    }

    /// Chargebee plan id for a Chargify product handle; unmapped handles pass through.
    pub fn plan_id<'a>(&'a self, handle: &'a str) -> &'a str {
        self.mapping
            .plans
            .get(handle)
            .map(String::as_str)
            .unwrap_or(handle)
    }

    pub fn is_taxable(&self, country: &str) -> bool {
        let country = country.trim();
        !country.is_empty()
            && self
                .mapping
                .taxable_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
    }

    pub fn payment_gateway(&self) -> Option<&str> {
        self.payment_gateway.as_deref()
    }
}

/// 依實體挑選對應的 flattener
pub fn flattener_for(entity: Entity, context: Arc<MappingContext>) -> Arc<dyn RecordFlattener> {
    match entity {
        Entity::Customers => Arc::new(CustomerFlattener::new(context)),
        Entity::Subscriptions => Arc::new(SubscriptionFlattener::new(context)),
        Entity::Invoices => Arc::new(InvoiceFlattener::new(context)),
    }
}
