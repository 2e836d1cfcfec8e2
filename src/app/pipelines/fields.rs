//! Read-side helpers over a Chargify JSON object.
//!
//! Every accessor renders into the exact string a CSV cell should hold:
//! missing and `null` values become empty strings, dates get a fixed
//! UTC format and money is written with two fraction digits.

use crate::core::{Entity, SourceRecord};
use crate::utils::error::{ExportError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    entity: Entity,
    data: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(entity: Entity, data: &'a Map<String, Value>) -> Self {
        Self { entity, data }
    }

    pub fn of(entity: Entity, record: &'a SourceRecord) -> Self {
        Self::new(entity, &record.data)
    }

    /// 非 null 的原始值
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.data.get(key).filter(|value| !value.is_null())
    }

    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    pub fn text(&self, key: &str) -> String {
        self.raw(key).map(scalar_text).unwrap_or_default()
    }

    /// Non-empty string value.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.raw(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// First non-empty rendering among `keys`.
    pub fn first_text(&self, keys: &[&str]) -> String {
        keys.iter()
            .map(|key| self.text(key))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.raw(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn object(&self, key: &str) -> Option<Fields<'a>> {
        self.raw(key)
            .and_then(Value::as_object)
            .map(|data| Fields::new(self.entity, data))
    }

    pub fn array(&self, key: &str) -> &'a [Value] {
        self.raw(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Identity columns: the first non-empty key wins, absence is a `MappingError`.
    pub fn required(&self, keys: &[&str], column: &str) -> Result<String> {
        let value = self.first_text(keys);
        if value.is_empty() {
            return Err(self.mapping_error(
                column,
                format!("none of [{}] is present", keys.join(", ")),
            ));
        }
        Ok(value)
    }

    pub fn mapping_error(&self, column: &str, message: impl Into<String>) -> ExportError {
        ExportError::MappingError {
            entity: self.entity.to_string(),
            column: column.to_string(),
            message: message.into(),
        }
    }

    /// 日期欄位：timestamp 轉 UTC `YYYY-MM-DD HH:MM:SS`，純日期保持 `YYYY-MM-DD`
    pub fn date(&self, key: &str, column: &str) -> Result<String> {
        match self.str(key) {
            None => Ok(String::new()),
            Some(raw) => render_date(raw)
                .ok_or_else(|| self.mapping_error(column, format!("'{}' is not a date", raw))),
        }
    }

    /// Calendar date of a date or timestamp field.
    pub fn naive_date(&self, key: &str, column: &str) -> Result<Option<NaiveDate>> {
        match self.str(key) {
            None => Ok(None),
            Some(raw) => parse_date(raw)
                .map(Some)
                .ok_or_else(|| self.mapping_error(column, format!("'{}' is not a date", raw))),
        }
    }

    /// Amount in cents from a decimal field (`"12.5"`) or, failing that, an
    /// integer-cents field (`1250`).
    pub fn money(&self, decimal_key: &str, cents_key: &str, column: &str) -> Result<Option<i64>> {
        if let Some(value) = self.raw(decimal_key) {
            return decimal_value_cents(value)
                .map(Some)
                .ok_or_else(|| self.mapping_error(column, format!("'{}' is not an amount", value)));
        }
        if let Some(value) = self.raw(cents_key) {
            return cents_value(value)
                .map(Some)
                .ok_or_else(|| self.mapping_error(column, format!("'{}' is not a cent amount", value)));
        }
        Ok(None)
    }

    pub fn money_text(&self, decimal_key: &str, cents_key: &str, column: &str) -> Result<String> {
        Ok(self
            .money(decimal_key, cents_key, column)?
            .map(format_cents)
            .unwrap_or_default())
    }
}

/// Scalars as text; nested structures have no single-cell rendering.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
}

pub fn render_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Some(date.format(DATE_FORMAT).to_string());
    }
    parse_timestamp(raw).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// `"12.345"` → `1235`. Rounds half away from zero past the second digit.
pub fn parse_decimal_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut fraction_digits = fraction.bytes().map(|b| i64::from(b - b'0'));
    let tenths = fraction_digits.next().unwrap_or(0);
    let hundredths = fraction_digits.next().unwrap_or(0);
    let round_up = i64::from(fraction_digits.next().map_or(false, |d| d >= 5));

    let cents = whole
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths + round_up)?;
    Some(if negative { -cents } else { cents })
}

fn decimal_value_cents(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_decimal_cents(s),
        Value::Number(n) => match n.as_i64() {
            Some(whole) => whole.checked_mul(100),
            None => n.as_f64().map(|f| (f * 100.0).round() as i64),
        },
        _ => None,
    }
}

fn cents_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `500` → `"5.00"`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
