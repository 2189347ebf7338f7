use crate::application_impl::DEFAULT_RATE_LIMIT_MESSAGE;
use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub session: Session,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub host: String, // base origin, e.g. "https://api.example.com"
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub single_flight: bool,
    pub rate_limit_message: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "JOBTALK";

/// Loads settings from a TOML file, overridden by `JOBTALK__SECTION__KEY` variables.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    build_settings(path, Environment::with_prefix(ENV_PREFIX).separator("__"))
}

fn build_settings(path: Option<&str>, environment: Environment) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .set_default("session.single_flight", true)
        .map_err(|e| anyhow!(e))?
        .set_default("session.rate_limit_message", DEFAULT_RATE_LIMIT_MESSAGE)
        .map_err(|e| anyhow!(e))?
        .set_default("log.filter", "info")
        .map_err(|e| anyhow!(e))?
        .add_source(File::with_name(path))
        .add_source(environment)
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
