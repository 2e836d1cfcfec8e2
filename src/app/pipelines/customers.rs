use super::fields::Fields;
use super::MappingContext;
use crate::core::{ColumnSchema, Entity, FlatRow, RecordFlattener, Result, SourceRecord};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Chargebee 客戶匯入欄位
static SCHEMA: Lazy<ColumnSchema> = Lazy::new(|| {
    ColumnSchema::new([
        "customer[id]",
        "customer[first_name]",
        "customer[last_name]",
        "customer[phone]",
        "customer[company]",
        "customer[email]",
        "payment_method[type]",
        "payment_method[gateway_account_id]",
        "payment_method[reference_id]",
        "customer[auto_collection]",
        "customer[taxability]",
        "customer[vat_number]",
        "customer[preferred_currency_code]",
        "customer[net_term_days]",
        "customer[allow_direct_debit]",
        "customer[locale]",
        "customer[meta_data]",
        "customer[consolidated_invoicing]",
        "customer[invoice_notes]",
        "billing_address[first_name]",
        "billing_address[last_name]",
        "billing_address[email]",
        "billing_address[company]",
        "billing_address[phone]",
        "billing_address[line1]",
        "billing_address[line2]",
        "billing_address[line3]",
        "billing_address[city]",
        "billing_address[state_code]",
        "billing_address[state]",
        "billing_address[zip]",
        "billing_address[country]",
        "billing_address[validation_status]",
        "customer[registered_for_gst]",
        "customer[entity_code]",
        "customer[exempt_number]",
    ])
});

/// One row per Chargify customer.
pub struct CustomerFlattener {
    context: Arc<MappingContext>,
}

impl CustomerFlattener {
    pub fn new(context: Arc<MappingContext>) -> Self {
        Self { context }
    }

    /// `<vault_token>` or `<vault_token>/<customer_vault_token>` of a stored card.
    fn payment_reference(customer: &Fields<'_>) -> Option<String> {
        let profile = customer
            .object("payment_profile")
            .or_else(|| customer.object("credit_card"))?;
        let vault_token = profile.str("vault_token")?;

        Some(match profile.str("customer_vault_token") {
            Some(customer_token) => format!("{}/{}", vault_token, customer_token),
            None => vault_token.to_string(),
        })
    }
}

impl RecordFlattener for CustomerFlattener {
    fn entity(&self) -> Entity {
        Entity::Customers
    }

    fn schema(&self) -> &ColumnSchema {
        &SCHEMA
    }

    fn flatten(&self, record: &SourceRecord) -> Result<Vec<FlatRow<'static>>> {
        let customer = Fields::of(Entity::Customers, record);
        let mut row = FlatRow::new(&SCHEMA);

        row.set("customer[id]", customer.required(&["reference", "id"], "customer[id]")?)
            .set("customer[first_name]", customer.text("first_name"))
            .set("customer[last_name]", customer.text("last_name"))
            .set("customer[phone]", customer.text("phone"))
            .set("customer[company]", customer.text("organization"))
            .set("customer[email]", customer.text("email"));

        // 只有設定了 gateway 才輸出付款方式
        let payment = self
            .context
            .payment_gateway()
            .and_then(|gateway| Self::payment_reference(&customer).map(|reference| (gateway, reference)));
        match payment {
            Some((gateway, reference)) => {
                row.set("payment_method[type]", "card")
                    .set("payment_method[gateway_account_id]", gateway)
                    .set("payment_method[reference_id]", reference)
                    .set("customer[auto_collection]", "on");
            }
            None => {
                row.set("customer[auto_collection]", "off");
            }
        }

        let country = customer.text("country");
        if self.context.is_taxable(&country) {
            row.set("customer[taxability]", "taxable")
                .set("customer[vat_number]", customer.text("vat_number"));
        } else {
            row.set("customer[taxability]", "exempt");
        }

        row.set("customer[preferred_currency_code]", self.context.default_currency())
            .set("customer[locale]", customer.text("locale"))
            .set("billing_address[first_name]", customer.text("first_name"))
            .set("billing_address[last_name]", customer.text("last_name"))
            .set("billing_address[email]", customer.text("email"))
            .set("billing_address[company]", customer.text("organization"))
            .set("billing_address[phone]", customer.text("phone"))
            .set("billing_address[line1]", customer.text("address"))
            .set("billing_address[line2]", customer.text("address_2"))
            .set("billing_address[city]", customer.text("city"))
            .set("billing_address[state_code]", customer.text("state"))
            .set("billing_address[state]", customer.text("state_name"))
            .set("billing_address[zip]", customer.text("zip"))
            .set("billing_address[country]", country)
            .set(
                "billing_address[validation_status]",
                if customer.flag("verified") { "valid" } else { "not_validated" },
            );

        Ok(vec![row])
    }
}
