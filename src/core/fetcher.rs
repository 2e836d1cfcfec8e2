use crate::core::{Entity, Page, PageCursor, PageSource, Result, SourceRecord};
use crate::utils::error::ExportError;
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

/// Chargify 預設每頁筆數
pub const DEFAULT_PER_PAGE: u32 = 100;
/// Chargify 允許的最大每頁筆數
pub const MAX_PER_PAGE: u32 = 200;

const ERROR_BODY_LIMIT: usize = 512;

/// Authenticated client for one Chargify account.
#[derive(Clone)]
pub struct ChargifyClient {
    client: Client,
    base_url: String,
    api_key: String,
    per_page: u32,
}

impl ChargifyClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    fn endpoint(&self, entity: Entity) -> String {
        format!("{}/{}", self.base_url, entity.path())
    }
}

impl std::fmt::Debug for ChargifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargifyClient")
            .field("base_url", &self.base_url)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PageSource for ChargifyClient {
    async fn fetch_page(&self, entity: Entity, cursor: PageCursor) -> Result<Page> {
        let url = self.endpoint(entity);
        tracing::debug!("📡 {}: requesting page {} from {}", entity, cursor.page(), url);

        // Chargify 慣例：API key 當 username，密碼固定為 "x"
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some("x"))
            .query(&[("page", cursor.page()), ("per_page", self.per_page)])
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("📡 {}: page {} responded {}", entity, cursor.page(), status);

        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(ERROR_BODY_LIMIT)
                .collect();
            tracing::error!(
                "❌ {}: page {} failed with status {}",
                entity,
                cursor.page(),
                status
            );
            return Err(ExportError::UpstreamError {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let payload: Value =
            response
                .json()
                .await
                .map_err(|e| ExportError::MalformedPayload {
                    message: format!("{} page {} is not valid JSON: {}", entity, cursor.page(), e),
                })?;

        let records = unwrap_records(entity, payload)?;
        let next = if records.len() < self.per_page as usize {
            None
        } else {
            Some(cursor.next())
        };

        Ok(Page { records, next })
    }
}

/// 拆掉 Chargify 的 envelope。
///
/// Customers and subscriptions come back as `[{"customer": {...}}, ...]`,
/// invoices as `{"invoices": [{...}, ...]}`.
pub fn unwrap_records(entity: Entity, payload: Value) -> Result<Vec<SourceRecord>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut wrapper) => match wrapper.remove(entity.name()) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ExportError::MalformedPayload {
                    message: format!("{} response has no '{}' array", entity, entity.name()),
                })
            }
        },
        other => {
            return Err(ExportError::MalformedPayload {
                message: format!("{} response is not a list of records: {}", entity, other),
            })
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut obj) => {
                let key = entity.record_key();
                if obj.len() == 1 && matches!(obj.get(key), Some(Value::Object(_))) {
                    if let Some(Value::Object(inner)) = obj.remove(key) {
                        return Ok(SourceRecord::new(inner));
                    }
                }
                Ok(SourceRecord::new(obj))
            }
            other => Err(ExportError::MalformedPayload {
                message: format!("{} record is not an object: {}", entity, other),
            }),
        })
        .collect()
}

/// Lazily walks the pages of one entity, strictly forward.
///
/// Yields every non-empty page in order and ends at the first empty page or
/// when the source reports no next cursor. An error is yielded once and ends
/// the stream.
pub fn paginate<S>(
    source: Arc<S>,
    entity: Entity,
) -> impl Stream<Item = Result<Vec<SourceRecord>>> + Send + 'static
where
    S: PageSource + ?Sized + 'static,
{
    stream::try_unfold(
        (source, Some(PageCursor::first()), 0u32),
        move |(source, cursor, fetched)| async move {
            let Some(cursor) = cursor else {
                tracing::info!("✅ {}: pagination finished after {} pages", entity, fetched);
                return Ok::<_, ExportError>(None);
            };

            let page = source.fetch_page(entity, cursor).await?;
            if page.records.is_empty() {
                tracing::info!("✅ {}: pagination finished after {} pages", entity, fetched);
                return Ok(None);
            }

            tracing::debug!(
                "📄 {}: page {} returned {} records",
                entity,
                cursor.page(),
                page.records.len()
            );
            Ok(Some((page.records, (source, page.next, fetched + 1))))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // base64("test-key:x")
    const BASIC_AUTH: &str = "Basic dGVzdC1rZXk6eA==";

    fn record(id: u64) -> SourceRecord {
        let mut data = serde_json::Map::new();
        data.insert("id".to_string(), Value::from(id));
        SourceRecord::new(data)
    }

    /// In-memory pages; always advertises a next cursor so only an empty page stops it.
    struct StaticPages {
        pages: Vec<Vec<SourceRecord>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageSource for StaticPages {
        async fn fetch_page(&self, _entity: Entity, cursor: PageCursor) -> Result<Page> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let records = self
                .pages
                .get(cursor.page() as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(Page {
                records,
                next: Some(cursor.next()),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_page_sends_basic_auth_and_unwraps_envelopes() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/customers.json")
                .query_param("page", "1")
                .query_param("per_page", "2")
                .header("authorization", BASIC_AUTH);
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"customer": {"id": 1, "email": "a@x.com"}},
                    {"customer": {"id": 2, "email": "b@x.com"}}
                ]));
        });

        let client = ChargifyClient::new(server.base_url(), "test-key").with_per_page(2);
        let page = client
            .fetch_page(Entity::Customers, PageCursor::first())
            .await
            .unwrap();

        api_mock.assert();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].data["email"], "b@x.com");
        assert_eq!(page.next, Some(PageCursor(2)));
    }

    #[tokio::test]
    async fn test_fetch_page_short_page_has_no_next_cursor() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/invoices.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"invoices": [{"uid": "inv_1"}]}));
        });

        let client = ChargifyClient::new(server.base_url(), "test-key").with_per_page(2);
        let page = client
            .fetch_page(Entity::Invoices, PageCursor::first())
            .await
            .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].data["uid"], "inv_1");
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn test_fetch_page_non_success_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/subscriptions.json");
            then.status(401).body("HTTP Basic: Access denied.");
        });

        let client = ChargifyClient::new(server.base_url(), "wrong");
        let err = client
            .fetch_page(Entity::Subscriptions, PageCursor::first())
            .await
            .unwrap_err();

        match err {
            ExportError::UpstreamError { status, body, .. } => {
                assert_eq!(status, 401);
                assert!(body.contains("Access denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_invalid_json_is_malformed_payload() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/customers.json");
            then.status(200).body("<html>maintenance</html>");
        });

        let client = ChargifyClient::new(server.base_url(), "test-key");
        let err = client
            .fetch_page(Entity::Customers, PageCursor::first())
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::MalformedPayload { .. }));
    }

    #[test]
    fn test_unwrap_records_rejects_missing_wrapper() {
        let err = unwrap_records(Entity::Invoices, serde_json::json!({"data": []})).unwrap_err();
        assert!(matches!(err, ExportError::MalformedPayload { .. }));

        let err = unwrap_records(Entity::Customers, serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, ExportError::MalformedPayload { .. }));
    }

    #[test]
    fn test_unwrap_records_accepts_bare_objects() {
        let records =
            unwrap_records(Entity::Customers, serde_json::json!([{"id": 7, "email": "c@x.com"}]))
                .unwrap();
        assert_eq!(records[0].data["id"], 7);
    }

    #[tokio::test]
    async fn test_paginate_stops_at_first_empty_page() {
        let source = Arc::new(StaticPages {
            pages: vec![vec![record(1), record(2)], vec![record(3), record(4)], vec![record(5)]],
            calls: AtomicUsize::new(0),
        });

        let pages: Vec<Vec<SourceRecord>> = paginate(source.clone(), Entity::Customers)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2][0].data["id"], 5);
        // three data pages plus the terminating empty one
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_paginate_honours_absent_cursor() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET).path("/customers.json").query_param("page", "1");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([{"customer": {"id": 1}}]));
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/customers.json").query_param("page", "2");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([]));
        });

        let client = Arc::new(ChargifyClient::new(server.base_url(), "test-key").with_per_page(5));
        let pages: Vec<Vec<SourceRecord>> = paginate(client, Entity::Customers)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        first.assert_hits(1);
        second.assert_hits(0);
    }
}
