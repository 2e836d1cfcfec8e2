use crate::utils::error::ExportError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors raised before the first body byte; later ones truncate the stream instead.
impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = if self.is_upstream() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        tracing::error!(
            "❌ Export failed with {}: {} (Category: {:?}, Severity: {:?})",
            status,
            self,
            self.category(),
            self.severity()
        );
        tracing::error!("💡 Suggestion: {}", self.recovery_suggestion());

        (status, self.user_friendly_message()).into_response()
    }
}
