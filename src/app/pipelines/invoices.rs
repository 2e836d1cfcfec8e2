use super::fields::{format_cents, Fields, DATE_FORMAT};
use super::MappingContext;
use crate::core::{ColumnSchema, Entity, FlatRow, RecordFlattener, Result, SourceRecord};
use chrono::Months;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;

static SCHEMA: Lazy<ColumnSchema> = Lazy::new(|| {
    ColumnSchema::new([
        "invoice[id]",
        "invoice[currency_code]",
        "invoice[customer_id]",
        "invoice[subscription_id]",
        "invoice[status]",
        "invoice[date]",
        "invoice[po_number]",
        "invoice[price_type]",
        "tax_override_reason",
        "invoice[vat_number]",
        "invoice[total]",
        "round_off",
        "invoice[due_date]",
        "invoice[net_term_days]",
        "use_for_proration",
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
        "shipping_address[first_name]",
        "shipping_address[last_name]",
        "shipping_address[email]",
        "shipping_address[company]",
        "shipping_address[phone]",
        "shipping_address[line1]",
        "shipping_address[line2]",
        "shipping_address[line3]",
        "shipping_address[city]",
        "shipping_address[state_code]",
        "shipping_address[state]",
        "shipping_address[zip]",
        "shipping_address[country]",
        "shipping_address[validation_status]",
        "line_items[id][0]",
        "line_items[entity_type][0]",
        "line_items[entity_id][0]",
        "line_items[date_from][0]",
        "line_items[date_to][0]",
        "line_items[description][0]",
        "line_items[unit_amount][0]",
        "line_items[quantity][0]",
        "line_items[amount][0]",
        "line_items[item_level_discount1_entity_id][0]",
        "line_items[item_level_discount1_amount][0]",
        "line_items[item_level_discount2_entity_id][0]",
        "line_items[item_level_discount2_amount][0]",
        "line_items[tax1_name][0]",
        "line_items[tax1_amount][0]",
        "line_items[tax2_name][0]",
        "line_items[tax2_amount][0]",
        "line_items[tax3_name][0]",
        "line_items[tax3_amount][0]",
        "line_items[tax4_name][0]",
        "line_items[tax4_amount][0]",
        "line_item_tiers[line_item_id][0]",
        "line_item_tiers[starting_unit][0]",
        "line_item_tiers[ending_unit][0]",
        "line_item_tiers[quantity_used][0]",
        "line_item_tiers[unit_amount][0]",
        "discounts[entity_type][0]",
        "discounts[entity_id][0]",
        "discounts[description][0]",
        "discounts[amount][0]",
        "taxes[name][0]",
        "taxes[rate][0]",
        "taxes[amount][0]",
        "taxes[description][0]",
        "taxes[juris_type][0]",
        "taxes[juris_name][0]",
        "taxes[juris_code][0]",
        "payments[amount][0]",
        "payments[payment_method][0]",
        "payments[date][0]",
        "payments[reference_number][0]",
        "notes[entity_type][0]",
        "notes[entity_id][0]",
        "notes[note][0]",
    ])
});

/// Chargebee 發票狀態；`None` 代表不匯出
fn invoice_status(status: &str) -> Option<&'static str> {
    match status {
        "paid" => Some("paid"),
        "open" => Some("payment_due"),
        "pending" | "draft" => Some("pending"),
        _ => None,
    }
}

/// Chargebee `line_items[entity_type]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineItemKind {
    Plan,
    Addon,
    Adhoc,
}

impl LineItemKind {
    /// An explicit `kind` wins; otherwise the referenced catalog object decides.
    fn of(item: &Fields<'_>) -> Option<Self> {
        match item.str("kind") {
            Some("component" | "addon") => Some(Self::Addon),
            Some("product" | "plan" | "baseline") => Some(Self::Plan),
            Some("adhoc" | "charge" | "one_time") => Some(Self::Adhoc),
            Some(_) => None,
            None if item.has("component_id") || item.has("component_handle") => Some(Self::Addon),
            None if item.has("product_id") || item.has("product_handle") => Some(Self::Plan),
            None => Some(Self::Adhoc),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Addon => "addon",
            Self::Adhoc => "adhoc",
        }
    }
}

/// One row per invoice line item, invoice columns repeated on each.
pub struct InvoiceFlattener {
    context: Arc<MappingContext>,
}

impl InvoiceFlattener {
    pub fn new(context: Arc<MappingContext>) -> Self {
        Self { context }
    }

    fn total(invoice: &Fields<'_>) -> Result<Option<i64>> {
        if let Some(total) = invoice.money("total_amount", "total_in_cents", "invoice[total]")? {
            return Ok(Some(total));
        }
        let Some(subtotal) = invoice.money("subtotal_amount", "subtotal_in_cents", "invoice[total]")? else {
            return Ok(None);
        };
        let discount = invoice
            .money("discount_amount", "discount_in_cents", "invoice[total]")?
            .unwrap_or(0);
        let tax = invoice
            .money("tax_amount", "tax_in_cents", "invoice[total]")?
            .unwrap_or(0);
        subtotal
            .checked_sub(discount)
            .and_then(|total| total.checked_add(tax))
            .map(Some)
            .ok_or_else(|| invoice.mapping_error("invoice[total]", "total overflows"))
    }

    /// Invoice-level columns shared by every line item row.
    fn document_row(&self, invoice: &Fields<'_>, status: &str) -> Result<FlatRow<'static>> {
        let mut row = FlatRow::new(&SCHEMA);

        let subscription_id = invoice.text("subscription_id");
        let customer = invoice.object("customer");
        let customer_text = |key: &str| customer.map(|c| c.text(key)).unwrap_or_default();

        // Chargebee 以訂閱推導客戶，兩者只能擇一
        if subscription_id.is_empty() {
            let customer_id = customer
                .map(|c| c.first_text(&["reference", "chargify_id", "id"]))
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| invoice.text("customer_id"));
            row.set("invoice[customer_id]", customer_id);
        }

        let currency = match invoice.str("currency") {
            Some(currency) => currency.to_string(),
            None => self.context.default_currency().to_string(),
        };

        row.set("invoice[id]", invoice.required(&["uid", "id"], "invoice[id]")?)
            .set("invoice[currency_code]", currency)
            .set("invoice[subscription_id]", subscription_id)
            .set("invoice[status]", status)
            .set("invoice[date]", invoice.date("issue_date", "invoice[date]")?)
            .set("invoice[po_number]", invoice.first_text(&["number", "sequence_number"]))
            .set("invoice[price_type]", "tax_exclusive")
            .set(
                "invoice[total]",
                Self::total(invoice)?.map(format_cents).unwrap_or_default(),
            )
            .set("invoice[due_date]", invoice.date("due_date", "invoice[due_date]")?)
            .set("use_for_proration", "TRUE")
            .set("billing_address[first_name]", customer_text("first_name"))
            .set("billing_address[last_name]", customer_text("last_name"))
            .set("billing_address[email]", customer_text("email"))
            .set("billing_address[company]", customer_text("organization"))
            .set("billing_address[phone]", customer_text("phone"));

        if let Some(address) = invoice.object("billing_address") {
            row.set("billing_address[line1]", address.text("street"))
                .set("billing_address[line2]", address.text("line2"))
                .set("billing_address[city]", address.text("city"))
                .set("billing_address[state]", address.text("state"))
                .set("billing_address[zip]", address.text("zip"))
                .set("billing_address[country]", address.text("country"));
        }

        if let Some(discount) = invoice.array("discounts").iter().find_map(Value::as_object) {
            let discount = Fields::new(Entity::Invoices, discount);
            row.set("discounts[entity_type][0]", "document_level_coupon")
                .set("discounts[entity_id][0]", discount.first_text(&["code", "coupon_code"]))
                .set("discounts[description][0]", discount.text("title"))
                .set(
                    "discounts[amount][0]",
                    discount.money_text("discount_amount", "discount_in_cents", "discounts[amount][0]")?,
                );
        }

        let tax = invoice.money("tax_amount", "tax_in_cents", "taxes[amount][0]")?;
        match invoice.array("taxes").iter().find_map(Value::as_object) {
            Some(entry) => {
                let entry = Fields::new(Entity::Invoices, entry);
                let name = entry.first_text(&["title", "name"]);
                row.set(
                    "taxes[name][0]",
                    if name.is_empty() { self.context.tax_name().to_string() } else { name },
                )
                .set("taxes[rate][0]", entry.text("percentage"))
                .set(
                    "taxes[amount][0]",
                    entry.money_text("tax_amount", "tax_in_cents", "taxes[amount][0]")?,
                );
            }
            None if tax.unwrap_or(0) != 0 => {
                row.set("taxes[name][0]", self.context.tax_name())
                    .set("taxes[amount][0]", tax.map(format_cents).unwrap_or_default());
            }
            None => {}
        }

        if let Some(paid) = invoice
            .money("paid_amount", "paid_in_cents", "payments[amount][0]")?
            .filter(|paid| *paid != 0)
        {
            row.set("payments[amount][0]", format_cents(paid))
                .set("payments[payment_method][0]", "other")
                .set("payments[date][0]", invoice.date("paid_date", "payments[date][0]")?);
        }

        Ok(row)
    }

    fn line_item_row(
        &self,
        document: &FlatRow<'static>,
        invoice: &Fields<'_>,
        item: &Fields<'_>,
        kind: LineItemKind,
    ) -> Result<FlatRow<'static>> {
        let mut row = document.clone();

        let entity_id = match kind {
            LineItemKind::Addon => item.first_text(&["component_handle", "component_id"]),
            LineItemKind::Plan => match item.str("product_handle") {
                Some(handle) => self.context.plan_id(handle).to_string(),
                None => item.text("product_id"),
            },
            LineItemKind::Adhoc => String::new(),
        };

        let (date_from, date_to) = if item.has("period_range_start") {
            (
                item.date("period_range_start", "line_items[date_from][0]")?,
                item.date("period_range_end", "line_items[date_to][0]")?,
            )
        } else {
            match invoice.naive_date("issue_date", "line_items[date_from][0]")? {
                Some(issued) => (
                    issued.format(DATE_FORMAT).to_string(),
                    issued
                        .checked_add_months(Months::new(1))
                        .map(|to| to.format(DATE_FORMAT).to_string())
                        .unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            }
        };

        let mut description = item.first_text(&["title", "description"]);
        if description.is_empty() {
            let family = invoice.text("product_family_name");
            let product = invoice.text("product_name");
            if !family.is_empty() || !product.is_empty() {
                description = format!("{} - {}", family, product);
            }
        }

        let mut quantity = item.text("quantity");
        if quantity.is_empty() {
            quantity = "1".to_string();
        }

        row.set("line_items[id][0]", item.text("uid"))
            .set("line_items[entity_type][0]", kind.as_str())
            .set("line_items[entity_id][0]", entity_id)
            .set("line_items[date_from][0]", date_from)
            .set("line_items[date_to][0]", date_to)
            .set("line_items[description][0]", description)
            .set(
                "line_items[unit_amount][0]",
                item.money_text("unit_price", "unit_price_in_cents", "line_items[unit_amount][0]")?,
            )
            .set("line_items[quantity][0]", quantity)
            .set(
                "line_items[amount][0]",
                item.money_text("subtotal_amount", "amount_in_cents", "line_items[amount][0]")?,
            );

        if let Some(tax) = item
            .money("tax_amount", "tax_in_cents", "line_items[tax1_amount][0]")?
            .filter(|tax| *tax != 0)
        {
            row.set("line_items[tax1_name][0]", self.context.tax_name())
                .set("line_items[tax1_amount][0]", format_cents(tax));
        }

        Ok(row)
    }
}

impl RecordFlattener for InvoiceFlattener {
    fn entity(&self) -> Entity {
        Entity::Invoices
    }

    fn schema(&self) -> &ColumnSchema {
        &SCHEMA
    }

    fn flatten(&self, record: &SourceRecord) -> Result<Vec<FlatRow<'static>>> {
        let invoice = Fields::of(Entity::Invoices, record);

        // 沒有 status 的發票照常匯出，未知或作廢狀態則略過
        let status = match invoice.str("status") {
            None => "",
            Some(raw) => match invoice_status(raw) {
                Some(status) => status,
                None => {
                    tracing::debug!("Skipping invoice {} with status '{}'", invoice.text("uid"), raw);
                    return Ok(Vec::new());
                }
            },
        };

        if invoice.money("subtotal_amount", "subtotal_in_cents", "invoice[total]")? == Some(0) {
            tracing::debug!("Skipping zero-value invoice {}", invoice.first_text(&["uid", "id"]));
            return Ok(Vec::new());
        }

        let document = self.document_row(&invoice, status)?;

        let mut rows = Vec::new();
        for item in invoice.array("line_items") {
            let Some(data) = item.as_object() else {
                continue;
            };
            let item = Fields::new(Entity::Invoices, data);
            let Some(kind) = LineItemKind::of(&item) else {
                continue;
            };
            rows.push(self.line_item_row(&document, &invoice, &item, kind)?);
        }

        if rows.is_empty() {
            rows.push(document);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::mapping::MappingConfig;
    use serde_json::json;

    fn record(value: Value) -> SourceRecord {
        SourceRecord::new(value.as_object().cloned().unwrap())
    }

    fn flattener() -> InvoiceFlattener {
        let mut mapping = MappingConfig::default();
        mapping
            .plans
            .insert("pro".to_string(), "scale-gbp".to_string());
        InvoiceFlattener::new(Arc::new(MappingContext::new(mapping, None)))
    }

    #[test]
    fn test_each_line_item_becomes_a_row() {
        let rows = flattener()
            .flatten(&record(json!({
                "id": "9",
                "line_items": [
                    {"uid": "A", "amount_in_cents": 500},
                    {"uid": "B", "amount_in_cents": 1200}
                ]
            })))
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.get("invoice[id]") == Some("9")));
        assert_eq!(rows[0].get("line_items[amount][0]"), Some("5.00"));
        assert_eq!(rows[1].get("line_items[amount][0]"), Some("12.00"));
        assert_eq!(rows[0].get("line_items[entity_type][0]"), Some("adhoc"));
        assert_eq!(rows[0].get("line_items[quantity][0]"), Some("1"));
    }

    #[test]
    fn test_relationship_invoice() {
        let rows = flattener()
            .flatten(&record(json!({
                "uid": "inv_8htcd29wcq3q6",
                "number": "1042",
                "status": "paid",
                "currency": "GBP",
                "issue_date": "2021-01-31",
                "due_date": "2021-01-31",
                "paid_date": "2021-02-01",
                "subscription_id": 3001,
                "subtotal_amount": "100.0",
                "discount_amount": "10.0",
                "tax_amount": "18.0",
                "paid_amount": "108.0",
                "product_name": "Pro",
                "product_family_name": "Acme",
                "customer": {"chargify_id": 77, "first_name": "Ada", "organization": "Acme Corp"},
                "billing_address": {"street": "1 High St", "city": "London", "zip": "N1", "country": "GB"},
                "line_items": [
                    {"uid": "li_1", "product_id": 5, "product_handle": "pro", "quantity": "1.0",
                     "unit_price": "100.0", "subtotal_amount": "100.0", "tax_amount": "18.0",
                     "period_range_start": "2021-01-31", "period_range_end": "2021-02-28"},
                    {"uid": "li_2", "component_handle": "seats", "quantity": "3.0",
                     "unit_price": "0.0", "subtotal_amount": "0.0", "tax_amount": "0.0"},
                    {"uid": "li_3", "kind": "mystery"},
                    "not-an-object"
                ],
                "discounts": [{"code": "WELCOME10", "title": "Welcome", "discount_amount": "10.0"}],
                "taxes": [{"title": "VAT", "percentage": "20.0", "tax_amount": "18.0"}]
            })))
            .unwrap();

        assert_eq!(rows.len(), 2);
        let plan = &rows[0];
        assert_eq!(plan.get("invoice[id]"), Some("inv_8htcd29wcq3q6"));
        assert_eq!(plan.get("invoice[status]"), Some("paid"));
        assert_eq!(plan.get("invoice[po_number]"), Some("1042"));
        assert_eq!(plan.get("invoice[subscription_id]"), Some("3001"));
        assert_eq!(plan.get("invoice[customer_id]"), Some(""));
        assert_eq!(plan.get("invoice[total]"), Some("108.00"));
        assert_eq!(plan.get("invoice[date]"), Some("2021-01-31"));
        assert_eq!(plan.get("billing_address[company]"), Some("Acme Corp"));
        assert_eq!(plan.get("billing_address[line1]"), Some("1 High St"));
        assert_eq!(plan.get("line_items[entity_type][0]"), Some("plan"));
        assert_eq!(plan.get("line_items[entity_id][0]"), Some("scale-gbp"));
        assert_eq!(plan.get("line_items[date_to][0]"), Some("2021-02-28"));
        assert_eq!(plan.get("line_items[description][0]"), Some("Acme - Pro"));
        assert_eq!(plan.get("line_items[tax1_name][0]"), Some("VAT"));
        assert_eq!(plan.get("line_items[tax1_amount][0]"), Some("18.00"));
        assert_eq!(plan.get("discounts[entity_id][0]"), Some("WELCOME10"));
        assert_eq!(plan.get("discounts[amount][0]"), Some("10.00"));
        assert_eq!(plan.get("taxes[rate][0]"), Some("20.0"));
        assert_eq!(plan.get("payments[amount][0]"), Some("108.00"));
        assert_eq!(plan.get("payments[payment_method][0]"), Some("other"));
        assert_eq!(plan.get("payments[date][0]"), Some("2021-02-01"));

        let addon = &rows[1];
        assert_eq!(addon.get("line_items[entity_type][0]"), Some("addon"));
        assert_eq!(addon.get("line_items[entity_id][0]"), Some("seats"));
        assert_eq!(addon.get("line_items[quantity][0]"), Some("3.0"));
        // period falls back to issue date plus one month
        assert_eq!(addon.get("line_items[date_from][0]"), Some("2021-01-31"));
        assert_eq!(addon.get("line_items[date_to][0]"), Some("2021-02-28"));
        assert_eq!(addon.get("line_items[tax1_name][0]"), Some(""));
    }

    #[test]
    fn test_skipped_invoices() {
        let flattener = flattener();
        for status in ["canceled", "voided", "archived"] {
            let rows = flattener
                .flatten(&record(json!({"uid": "inv_1", "status": status, "subtotal_amount": "5.0"})))
                .unwrap();
            assert!(rows.is_empty(), "status {status} should be skipped");
        }

        let zero = flattener
            .flatten(&record(json!({"uid": "inv_2", "status": "paid", "subtotal_amount": "0.0"})))
            .unwrap();
        assert!(zero.is_empty());
    }

    #[test]
    fn test_standalone_invoice_carries_customer_and_computed_total() {
        let rows = flattener()
            .flatten(&record(json!({
                "uid": "inv_3",
                "status": "open",
                "subtotal_amount": "50.0",
                "discount_amount": "5.0",
                "tax_amount": "9.0",
                "customer": {"chargify_id": 77, "reference": "cust-77"}
            })))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("invoice[status]"), Some("payment_due"));
        assert_eq!(rows[0].get("invoice[customer_id]"), Some("cust-77"));
        assert_eq!(rows[0].get("invoice[total]"), Some("54.00"));
        assert_eq!(rows[0].get("invoice[currency_code]"), Some("GBP"));
        assert_eq!(rows[0].get("taxes[name][0]"), Some("VAT"));
        assert_eq!(rows[0].get("taxes[amount][0]"), Some("9.00"));
        assert_eq!(rows[0].get("line_items[id][0]"), Some(""));
    }

    #[test]
    fn test_missing_invoice_id_is_mapping_error() {
        assert!(flattener()
            .flatten(&record(json!({"status": "paid", "line_items": []})))
            .is_err());
    }

    #[test]
    fn test_total_overflow_is_mapping_error() {
        let err = flattener()
            .flatten(&record(json!({
                "uid": "x",
                "subtotal_in_cents": i64::MAX,
                "tax_in_cents": 1
            })))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::utils::error::ExportError::MappingError { ref column, .. } if column == "invoice[total]"
        ));
    }

    #[test]
    fn test_rows_outlive_their_flattener() {
        let flattener = flattener();
        let rows = flattener
            .flatten(&record(json!({"uid": "inv_2", "line_items": [{"uid": "A"}]})))
            .unwrap();
        drop(flattener);

        assert_eq!(rows[0].get("invoice[id]"), Some("inv_2"));
        assert_eq!(rows[0].get("line_items[id][0]"), Some("A"));
    }
}
