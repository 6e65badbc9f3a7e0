//! Configuration management

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stack: StackConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,

    #[serde(default = "default_api_name")]
    pub api_name: String,

    #[serde(default = "default_stage_name")]
    pub stage_name: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            api_name: default_api_name(),
            stage_name: default_stage_name(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_table_name() -> String {
    "posts".to_string()
}

fn default_api_name() -> String {
    "RestAPI".to_string()
}

fn default_stage_name() -> String {
    "prod".to_string()
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("poststack").required(false))
            .add_source(config::Environment::with_prefix("POSTSTACK").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
