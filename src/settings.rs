use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Default, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub backend: Backend,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub listen: String,
}

/// Account created on startup when no user owns `phone` yet.
#[derive(Clone, Debug, Deserialize)]
pub struct SuperAdmin {
    pub phone: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    #[serde(default)]
    pub storage: Storage,
    pub http: Http,
    pub super_admin: SuperAdmin,
}

impl Settings {
    /// Reads `path` and lets `HAILER__SECTION__KEY` variables override it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("HAILER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
