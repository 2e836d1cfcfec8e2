use super::fields::{format_cents, Fields};
use super::MappingContext;
use crate::core::{ColumnSchema, Entity, FlatRow, RecordFlattener, Result, SourceRecord};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;

static SCHEMA: Lazy<ColumnSchema> = Lazy::new(|| {
    ColumnSchema::new([
        "customer[id]",
        "subscription[id]",
        "subscription[plan_id]",
        "subscription[plan_quantity]",
        "subscription[plan_unit_price]",
        "currency",
        "subscription[setup_fee]",
        "subscription[status]",
        "subscription[start_date]",
        "subscription[trial_start]",
        "subscription[trial_end]",
        "subscription[started_at]",
        "subscription[current_term_start]",
        "subscription[current_term_end]",
        "subscription[cancelled_at]",
        "subscription[pause_date]",
        "subscription[resume_date]",
        "billing_cycles",
        "subscription[auto_collection]",
        "subscription[po_number]",
        "coupon_ids[0]",
        "coupon_ids[1]",
        "subscription[payment_source_id]",
        "subscription[invoice_notes]",
        "subscription[meta_data]",
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
        "addons[id][0]",
        "addons[quantity][0]",
        "addons[unit_price][0]",
    ])
});

/// Chargebee 訂閱狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    InTrial,
    Paused,
    Future,
}

impl SubscriptionStatus {
    /// Maps a Chargify subscription state. Unknown states have no Chargebee counterpart.
    pub fn from_chargify(state: &str) -> Option<Self> {
        match state {
            "active" | "past_due" | "soft_failure" | "unpaid" => Some(Self::Active),
            "canceled" | "expired" | "trial_ended" | "suspended" => Some(Self::Cancelled),
            "trialing" => Some(Self::InTrial),
            "on_hold" | "paused" => Some(Self::Paused),
            "awaiting_signup" | "pending" => Some(Self::Future),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::InTrial => "in_trial",
            Self::Paused => "paused",
            Self::Future => "future",
        }
    }
}

/// Add-on slot of one row: id, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Addon {
    id: String,
    quantity: String,
    unit_price: String,
}

/// One row per supported component, or one plan-only row.
pub struct SubscriptionFlattener {
    context: Arc<MappingContext>,
}

impl SubscriptionFlattener {
    pub fn new(context: Arc<MappingContext>) -> Self {
        Self { context }
    }

    fn addon(component: &Value) -> Result<Option<Addon>> {
        let Some(data) = component.as_object() else {
            return Ok(None);
        };
        let component = Fields::new(Entity::Subscriptions, data);

        let quantity = match component.str("kind").unwrap_or_default() {
            "quantity_based_component" | "quantity_based" => component.text("allocated_quantity"),
            "on_off_component" | "on_off" => {
                if !component.flag("enabled") {
                    return Ok(None);
                }
                "1".to_string()
            }
            "metered_component" | "metered" | "prepaid_usage_component" | "prepaid_usage"
            | "event_based_component" | "event_based" => component.text("unit_balance"),
            _ => return Ok(None),
        };

        let id = component.first_text(&["component_handle", "component_id"]);
        if id.is_empty() {
            return Ok(None);
        }

        Ok(Some(Addon {
            id,
            quantity,
            unit_price: component.money_text("unit_price", "unit_price_in_cents", "addons[unit_price][0]")?,
        }))
    }
}

impl RecordFlattener for SubscriptionFlattener {
    fn entity(&self) -> Entity {
        Entity::Subscriptions
    }

    fn schema(&self) -> &ColumnSchema {
        &SCHEMA
    }

    fn flatten(&self, record: &SourceRecord) -> Result<Vec<FlatRow<'static>>> {
        let subscription = Fields::of(Entity::Subscriptions, record);

        let Some(handle) = subscription.object("product").and_then(|p| p.str("handle")) else {
            tracing::debug!(
                "Skipping subscription {} without product handle",
                subscription.text("id")
            );
            return Ok(Vec::new());
        };
        let state = subscription.text("state");
        let Some(status) = SubscriptionStatus::from_chargify(&state) else {
            tracing::warn!(
                "Skipping subscription {} in unknown state '{}'",
                subscription.text("id"),
                state
            );
            return Ok(Vec::new());
        };

        let customer_id = subscription
            .object("customer")
            .map(|c| c.first_text(&["reference", "id"]))
            .unwrap_or_default();
        let currency = match subscription.str("currency") {
            Some(currency) => currency.to_string(),
            None => self.context.default_currency().to_string(),
        };

        let mut base = FlatRow::new(&SCHEMA);
        base.set("customer[id]", customer_id)
            .set("subscription[id]", subscription.required(&["id"], "subscription[id]")?)
            .set("subscription[plan_id]", self.context.plan_id(handle))
            .set("subscription[plan_quantity]", "1")
            .set(
                "subscription[plan_unit_price]",
                subscription
                    .money("product_price", "product_price_in_cents", "subscription[plan_unit_price]")?
                    .map(format_cents)
                    .unwrap_or_default(),
            )
            .set("currency", currency)
            .set("subscription[setup_fee]", "0")
            .set("subscription[status]", status.as_str());

        if status == SubscriptionStatus::Future {
            base.set(
                "subscription[start_date]",
                subscription.date("next_assessment_at", "subscription[start_date]")?,
            );
        }
        if status == SubscriptionStatus::InTrial {
            base.set(
                "subscription[trial_start]",
                subscription.date("trial_started_at", "subscription[trial_start]")?,
            )
            .set(
                "subscription[trial_end]",
                subscription.date("trial_ended_at", "subscription[trial_end]")?,
            );
        }
        if matches!(status, SubscriptionStatus::Active | SubscriptionStatus::Cancelled) {
            let started_key = if subscription.has("activated_at") { "activated_at" } else { "created_at" };
            base.set(
                "subscription[started_at]",
                subscription.date(started_key, "subscription[started_at]")?,
            );
        }
        if matches!(status, SubscriptionStatus::Active | SubscriptionStatus::Paused) {
            base.set(
                "subscription[current_term_start]",
                subscription.date("current_period_started_at", "subscription[current_term_start]")?,
            )
            .set(
                "subscription[current_term_end]",
                subscription.date("current_period_ends_at", "subscription[current_term_end]")?,
            );
        }

        let cancelled_key = if state == "trial_ended" { "trial_ended_at" } else { "canceled_at" };
        base.set(
            "subscription[cancelled_at]",
            subscription.date(cancelled_key, "subscription[cancelled_at]")?,
        )
        .set(
            "subscription[pause_date]",
            subscription.date("on_hold_at", "subscription[pause_date]")?,
        );

        let manual_collection = matches!(
            subscription.str("payment_collection_method"),
            Some("invoice" | "remittance")
        );
        base.set(
            "subscription[auto_collection]",
            if manual_collection { "off" } else { "on" },
        );

        let mut coupons: Vec<String> = subscription
            .array("coupon_codes")
            .iter()
            .filter_map(Value::as_str)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
        if coupons.is_empty() {
            coupons.extend(subscription.str("coupon_code").map(str::to_string));
        }
        for (slot, code) in coupons.into_iter().take(2).enumerate() {
            base.set(&format!("coupon_ids[{}]", slot), code);
        }

        let mut addons = Vec::new();
        for component in subscription.array("components") {
            addons.extend(Self::addon(component)?);
        }

        if addons.is_empty() {
            return Ok(vec![base]);
        }

        Ok(addons
            .into_iter()
            .map(|addon| {
                let mut row = base.clone();
                row.set("addons[id][0]", addon.id)
                    .set("addons[quantity][0]", addon.quantity)
                    .set("addons[unit_price][0]", addon.unit_price);
                row
            })
            .collect())
    }
}
