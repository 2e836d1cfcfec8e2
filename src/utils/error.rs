use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Upstream API returned {status} for {url}: {body}")]
    UpstreamError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Malformed upstream payload: {message}")]
    MalformedPayload { message: String },

    #[error("Cannot map {entity} column {column}: {message}")]
    MappingError {
        entity: String,
        column: String,
        message: String,
    },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Upstream,
    Mapping,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ExportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExportError::ConfigError { .. }
            | ExportError::MissingConfigError { .. }
            | ExportError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            ExportError::HttpError(_)
            | ExportError::UpstreamError { .. }
            | ExportError::MalformedPayload { .. } => ErrorCategory::Upstream,
            ExportError::MappingError { .. } => ErrorCategory::Mapping,
            ExportError::CsvError(_) | ExportError::IoError(_) => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::Critical,
            ErrorCategory::Upstream => ErrorSeverity::Medium,
            ErrorCategory::Mapping => ErrorSeverity::High,
            ErrorCategory::Output => ErrorSeverity::High,
        }
    }

    /// 上游錯誤（網路、狀態碼、回應格式）
    pub fn is_upstream(&self) -> bool {
        self.category() == ErrorCategory::Upstream
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ExportError::ConfigError { .. } | ExportError::InvalidConfigValueError { .. } => {
                "Check the command line flags and environment variables"
            }
            ExportError::MissingConfigError { .. } => {
                "Set CHARGIFY_DOMAIN, CHARGIFY_API_KEY and STRIPE_API_KEY (a .env file works too)"
            }
            ExportError::HttpError(_) => "Check network connectivity to the Chargify API",
            ExportError::UpstreamError { status, .. } if *status == 401 || *status == 403 => {
                "Verify CHARGIFY_API_KEY and CHARGIFY_DOMAIN"
            }
            ExportError::UpstreamError { .. } | ExportError::MalformedPayload { .. } => {
                "Retry the export; the Chargify API may be degraded"
            }
            ExportError::MappingError { .. } => {
                "Inspect the source record in Chargify; a required identifier is missing or malformed"
            }
            ExportError::CsvError(_) | ExportError::IoError(_) => "Retry the export",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Upstream => format!("Chargify request failed: {}", self),
            ErrorCategory::Mapping => format!("Could not convert a Chargify record: {}", self),
            ErrorCategory::Output => format!("Could not write CSV output: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_errors_are_categorised() {
        let err = ExportError::UpstreamError {
            status: 500,
            url: "https://acme.chargify.com/customers.json".to_string(),
            body: "boom".to_string(),
        };
        assert!(err.is_upstream());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_auth_failures_point_at_credentials() {
        let err = ExportError::UpstreamError {
            status: 401,
            url: "https://acme.chargify.com/customers.json".to_string(),
            body: String::new(),
        };
        assert!(err.recovery_suggestion().contains("CHARGIFY_API_KEY"));
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = ExportError::MissingConfigError {
            field: "chargify_api_key".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().starts_with("Invalid configuration"));
    }
}
