use std::fmt;

/// Chargify 匯出的實體種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Customers,
    Subscriptions,
    Invoices,
}

impl Entity {
    pub fn name(&self) -> &'static str {
        match self {
            Entity::Customers => "customers",
            Entity::Subscriptions => "subscriptions",
            Entity::Invoices => "invoices",
        }
    }

    /// Chargify REST 路徑（相對於帳戶 base URL）
    pub fn path(&self) -> &'static str {
        match self {
            Entity::Customers => "customers.json",
            Entity::Subscriptions => "subscriptions.json",
            Entity::Invoices => "invoices.json",
        }
    }

    /// 單筆紀錄的 envelope key，例如 `{"customer": {...}}`
    pub fn record_key(&self) -> &'static str {
        match self {
            Entity::Customers => "customer",
            Entity::Subscriptions => "subscription",
            Entity::Invoices => "invoice",
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.csv", self.name())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One billing entity as returned by the source API, envelope removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl SourceRecord {
    pub fn new(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { data }
    }
}

/// Next Chargify page to request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(pub u32);

impl PageCursor {
    pub fn first() -> Self {
        PageCursor(1)
    }

    pub fn page(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Self {
        PageCursor(self.0 + 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<SourceRecord>,
    /// `None` once the source is exhausted
    pub next: Option<PageCursor>,
}

/// Ordered, fixed set of output columns for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<String>,
}

impl ColumnSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// One output line: a value for every column of its schema, in schema order.
///
/// Cells start out empty, so a row always carries exactly the schema's
/// columns no matter which ones a flattener fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow<'s> {
    schema: &'s ColumnSchema,
    values: Vec<String>,
}

impl<'s> FlatRow<'s> {
    pub fn new(schema: &'s ColumnSchema) -> Self {
        Self {
            schema,
            values: vec![String::new(); schema.len()],
        }
    }

    /// 依欄位名稱設定值；未知欄位屬於程式錯誤
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
        let position = self.schema.position(column);
        debug_assert!(position.is_some(), "column {} is not part of the schema", column);
        match position {
            Some(index) => self.values[index] = value.into(),
            None => tracing::warn!("Ignoring value for unknown column '{}'", column),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .map(|index| self.values[index].as_str())
    }

    pub fn schema(&self) -> &'s ColumnSchema {
        self.schema
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}
