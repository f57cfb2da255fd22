//! Runtime configuration for the visit logger.
//!
//! Settings resolve with the precedence CLI flag > environment > config file
//! > built-in default. The config file is optional TOML; pointing at a path
//! that does not exist is not an error.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ASSETS_DIR: &str = "public";

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the visit log file.
    pub data_dir: PathBuf,
    /// Directory served verbatim at the root, when it exists.
    pub assets_dir: PathBuf,
}

/// Settings supplied on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
}

/// Settings read from the optional TOML config file.
#[derive(Debug, Default, Clone)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct RootConfig {
    #[serde(default)]
    server: Option<RawServerSection>,
    #[serde(default)]
    store: Option<RawStoreSection>,
}

#[derive(Deserialize, Default)]
struct RawServerSection {
    host: Option<String>,
    port: Option<u16>,
    assets_dir: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawStoreSection {
    data_dir: Option<String>,
}

pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let parsed: RootConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;

    let server = parsed.server.unwrap_or_default();
    let store = parsed.store.unwrap_or_default();

    Ok(Some(FileConfig {
        host: server.host,
        port: server.port,
        data_dir: store.data_dir.map(PathBuf::from),
        assets_dir: server.assets_dir.map(PathBuf::from),
    }))
}

/// Listen port from the `PORT` environment variable; absent or non-numeric
/// values fall through to the next precedence level.
pub fn env_port() -> Option<u16> {
    env::var("PORT").ok().and_then(|value| value.parse().ok())
}

pub fn resolve(
    cli: &CliOverrides,
    file: Option<&FileConfig>,
    env_port: Option<u16>,
) -> ServerConfig {
    let file = file.cloned().unwrap_or_default();

    ServerConfig {
        host: cli
            .host
            .clone()
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: cli.port.or(env_port).or(file.port).unwrap_or(DEFAULT_PORT),
        data_dir: cli
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        assets_dir: cli
            .assets_dir
            .clone()
            .or(file.assets_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
    }
}
