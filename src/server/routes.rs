use super::AppState;
use crate::app::pipelines::{export_raw_csv, flattener_for};
use crate::core::export::{export_csv, CsvExport};
use crate::core::Entity;
use crate::utils::error::Result;
use axum::body::StreamBody;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::TryStreamExt;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/customers/csv", get(customers_csv))
        .route("/subscriptions/csv", get(subscriptions_csv))
        .route("/invoices/csv", get(invoices_csv))
        .route("/chargify_subscriptions/csv", get(chargify_subscriptions_csv))
        .route("/chargify_invoices/csv", get(chargify_invoices_csv))
        .with_state(state)
}

async fn healthcheck() -> &'static str {
    "OK"
}

async fn customers_csv(State(state): State<AppState>) -> Result<Response> {
    mapped_export(state, Entity::Customers).await
}

async fn subscriptions_csv(State(state): State<AppState>) -> Result<Response> {
    mapped_export(state, Entity::Subscriptions).await
}

async fn invoices_csv(State(state): State<AppState>) -> Result<Response> {
    mapped_export(state, Entity::Invoices).await
}

async fn chargify_subscriptions_csv(State(state): State<AppState>) -> Result<Response> {
    let export = export_raw_csv(state.source, Entity::Subscriptions).await?;
    Ok(csv_response(export))
}

async fn chargify_invoices_csv(State(state): State<AppState>) -> Result<Response> {
    let export = export_raw_csv(state.source, Entity::Invoices).await?;
    Ok(csv_response(export))
}

async fn mapped_export(state: AppState, entity: Entity) -> Result<Response> {
    let flattener = flattener_for(entity, state.context);
    let export = export_csv(state.source, flattener).await?;
    Ok(csv_response(export))
}

/// Streams the export as an attachment; a mid-stream failure ends the body early.
fn csv_response(export: CsvExport) -> Response {
    let filename = export.filename;
    let disposition = format!("attachment; filename=\"{}\"", filename);

    let body = export.body.inspect_err(move |e| {
        tracing::error!("❌ {} stream aborted: {}", filename, e);
    });

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        StreamBody::new(body),
    )
        .into_response()
}
