use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::store::StoreConfig;
use crate::gate::{AuthRequirement, GateMode};
use crate::reconciler::ReconcilerConfig;
use crate::sources::GitHubConfig;

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: store, reconciler policy, sources, protected resources.
#[derive(Deserialize, Serialize, Debug, JsonSchema)]
pub struct ConfigV1 {
    pub bind_address: String,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: ReconcilerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl ConfigV1 {
    /// The protection declared for `path`; undeclared paths are public.
    pub fn resource(&self, path: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.path == path)
    }
}

fn default_target() -> String {
    "/".to_string()
}

/// A protected resource of the dashboard and how denials are presented.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct ResourceConfig {
    pub path: String,
    pub requirement: AuthRequirement,
    #[serde(default)]
    pub mode: GateMode,
    /// Redirect target for `mode: redirect`.
    #[serde(default = "default_target")]
    pub target: String,
}

/// Load config from a YAML file, with `AUTHLINK_` environment overrides
/// (`__` separates nested keys). Exits the process on invalid config.
pub fn load_config(path: &str) -> ConfigV1 {
    let figment = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("AUTHLINK_").split("__"));
    match extract_config(figment) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Extracts the current config version from any figment.
pub fn extract_config(figment: Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render configuration schema: {}", e),
    }
}
