use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Settings shared by every service binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Load from an optional `configuration` file and `APP__*` variables.
    ///
    /// A bare `PORT` variable wins over both, matching how container
    /// platforms hand out the listening port.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mut loaded: Self = config.try_deserialize()?;
        if let Some(port) = parse_port(std::env::var("PORT").ok().as_deref())? {
            loaded.port = port;
        }

        Ok(loaded)
    }
}

fn parse_port(raw: Option<&str>) -> Result<Option<u16>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("PORT must be a valid port number"))
        }),
    }
}
