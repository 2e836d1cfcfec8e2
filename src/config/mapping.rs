use crate::utils::error::{ExportError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Chargify → Chargebee 對照設定（可選的 TOML 檔）
///
/// ```toml
/// default_currency = "GBP"
/// taxable_countries = ["GB"]
/// tax_name = "VAT"
///
/// [plans]
/// basic = "starter-gbp"
/// pro = "scale-gbp"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub default_currency: String,
    pub taxable_countries: Vec<String>,
    pub tax_name: String,
    /// Chargify product handle → Chargebee plan id
    pub plans: HashMap<String, String>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_currency: "GBP".to_string(),
            taxable_countries: vec!["GB".to_string()],
            tax_name: "VAT".to_string(),
            plans: HashMap::new(),
        }
    }
}

impl MappingConfig {
    /// 從 TOML 檔案載入對照表
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ExportError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析對照表
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ExportError::ConfigError {
            message: format!("Mapping file parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PLAN_SUFFIX})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ExportError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for MappingConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("mapping.default_currency", &self.default_currency)?;
        validation::validate_non_empty_string("mapping.tax_name", &self.tax_name)?;

        for (handle, plan_id) in &self.plans {
            validation::validate_non_empty_string(&format!("mapping.plans.{}", handle), plan_id)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_when_sections_are_missing() {
        let config = MappingConfig::from_toml_str("").unwrap();
        assert_eq!(config, MappingConfig::default());
    }

    #[test]
    fn test_parse_plan_mapping() {
        let toml_content = r#"
default_currency = "EUR"
taxable_countries = ["DE", "FR"]

[plans]
basic = "starter-eur"
"pro-plus" = "professional-eur"
"#;

        let config = MappingConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.taxable_countries, vec!["DE", "FR"]);
        assert_eq!(config.tax_name, "VAT");
        assert_eq!(config.plans["pro-plus"], "professional-eur");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MAPPING_TEST_CURRENCY", "USD");

        let config =
            MappingConfig::from_toml_str(r#"default_currency = "${MAPPING_TEST_CURRENCY}""#)
                .unwrap();
        assert_eq!(config.default_currency, "USD");

        std::env::remove_var("MAPPING_TEST_CURRENCY");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = MappingConfig::from_toml_str("plans = 3").unwrap_err();
        assert!(matches!(err, ExportError::ConfigError { .. }));
    }

    #[test]
    fn test_empty_plan_id_fails_validation() {
        let config = MappingConfig::from_toml_str("[plans]\nbasic = \" \"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mapping_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"tax_name = \"GST\"\n[plans]\nunlimited = \"unlimited-aud\"\n")
            .unwrap();

        let config = MappingConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.tax_name, "GST");
        assert_eq!(config.plans["unlimited"], "unlimited-aud");
    }
}
