use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ANALYSIS_RUNNER__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub experimenter: ExperimenterConfig,
    #[serde(default)]
    pub external: ExternalConfigSource,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_url")]
    pub url: String,
    #[serde(default = "default_warehouse_database")]
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_dry_run_timeout_secs")]
    pub dry_run_timeout_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperimenterConfig {
    #[serde(default = "default_experimenter_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalConfigSource {
    #[serde(default = "default_config_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_config_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_validation_timeout_secs")]
    pub timeout_secs: u64,
}

// Default functions
fn default_warehouse_url() -> String {
    "http://localhost:8123".to_string()
}
fn default_warehouse_database() -> String {
    "experiment_analysis".to_string()
}
fn default_dry_run_timeout_secs() -> u64 {
    300
}
fn default_query_timeout_secs() -> u64 {
    3600
}
fn default_experimenter_url() -> String {
    "https://experimenter.services.mozilla.com/api/v1/experiments/".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_config_repo_url() -> String {
    "https://github.com/mozilla/jetstream-config".to_string()
}
fn default_config_branch() -> String {
    "main".to_string()
}
fn default_max_concurrency() -> usize {
    8
}
fn default_validation_timeout_secs() -> u64 {
    600
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            url: default_warehouse_url(),
            database: default_warehouse_database(),
            user: None,
            password: None,
            dry_run_timeout_secs: default_dry_run_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Default for ExperimenterConfig {
    fn default() -> Self {
        Self {
            api_url: default_experimenter_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ExternalConfigSource {
    fn default() -> Self {
        Self {
            repo_url: default_config_repo_url(),
            branch: default_config_branch(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_validation_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig::default(),
            experimenter: ExperimenterConfig::default(),
            external: ExternalConfigSource::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and an optional TOML file.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("ANALYSIS_RUNNER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
