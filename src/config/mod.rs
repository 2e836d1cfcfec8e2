pub mod mapping;

use crate::core::fetcher::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::utils::error::{ExportError, Result};
use crate::utils::validation::{self, Validate};
use clap::Parser;
use mapping::MappingConfig;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// 命令列參數，未指定時改讀環境變數（可由 `.env` 提供）
#[derive(Clone, Parser)]
#[command(name = "chargify-export")]
#[command(about = "Serves Chargify customers, subscriptions and invoices as Chargebee import CSV")]
pub struct CliArgs {
    #[arg(long, env = "CHARGIFY_DOMAIN", help = "Chargify subdomain, e.g. `acme` for acme.chargify.com")]
    pub chargify_domain: Option<String>,

    #[arg(long, env = "CHARGIFY_API_KEY", hide_env_values = true)]
    pub chargify_api_key: Option<String>,

    #[arg(
        long,
        env = "STRIPE_API_KEY",
        hide_env_values = true,
        help = "Enables Stripe card references in the customer export"
    )]
    pub stripe_api_key: Option<String>,

    #[arg(long, env = "CHARGIFY_BASE_URL", help = "Overrides https://{domain}.chargify.com")]
    pub chargify_base_url: Option<String>,

    #[arg(long, env = "CHARGIFY_PER_PAGE", default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: u32,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "MAPPING_FILE", help = "TOML file with plan ids and tax settings")]
    pub mapping_file: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, env = "LOG_JSON", help = "Emit logs as JSON")]
    pub log_json: bool,
}

/// Validated runtime settings.
#[derive(Clone)]
pub struct AppConfig {
    pub chargify_domain: String,
    pub chargify_api_key: String,
    pub stripe_api_key: String,
    pub chargify_base_url: Option<String>,
    pub per_page: u32,
    pub bind_address: String,
    pub port: u16,
    pub mapping_file: Option<String>,
    pub mapping: MappingConfig,
}

impl AppConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let chargify_domain =
            validation::validate_required_field("chargify_domain", &args.chargify_domain)?.to_string();
        let chargify_api_key =
            validation::validate_required_field("chargify_api_key", &args.chargify_api_key)?.to_string();
        let stripe_api_key =
            validation::validate_required_field("stripe_api_key", &args.stripe_api_key)?.to_string();

        let mapping = match &args.mapping_file {
            Some(path) => {
                validation::validate_path("mapping_file", path)?;
                validation::validate_file_extensions("mapping_file", std::slice::from_ref(path), &["toml"])?;
                tracing::info!("📁 Loading mapping from: {}", path);
                MappingConfig::from_file(path)?
            }
            None => MappingConfig::default(),
        };

        let config = Self {
            chargify_domain,
            chargify_api_key,
            stripe_api_key,
            chargify_base_url: args
                .chargify_base_url
                .filter(|url| !url.trim().is_empty()),
            per_page: args.per_page,
            bind_address: args.bind_address,
            port: args.port,
            mapping_file: args.mapping_file,
            mapping,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn base_url(&self) -> String {
        match &self.chargify_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.chargify.com", self.chargify_domain),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| ExportError::InvalidConfigValueError {
                field: "bind_address".to_string(),
                value: self.bind_address.clone(),
                reason: format!("{}", e),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        if self.chargify_domain.contains(['/', ':', '.']) {
            return Err(ExportError::InvalidConfigValueError {
                field: "chargify_domain".to_string(),
                value: self.chargify_domain.clone(),
                reason: "Expected the bare subdomain, e.g. `acme`".to_string(),
            });
        }
        validation::validate_url("chargify_base_url", &self.base_url())?;
        validation::validate_range("per_page", self.per_page, 1, MAX_PER_PAGE)?;
        validation::validate_positive_number("port", self.port as usize, 1)?;
        self.socket_addr()?;
        self.mapping.validate()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("chargify_domain", &self.chargify_domain)
            .field("chargify_api_key", &"<redacted>")
            .field("stripe_api_key", &"<redacted>")
            .field("base_url", &self.base_url())
            .field("per_page", &self.per_page)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("mapping_file", &self.mapping_file)
            .finish()
    }
}
