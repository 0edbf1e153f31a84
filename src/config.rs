use anyhow::{Context, Result};
use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use crate::fields::{FieldLayout, SearchFallback};
use crate::pager::MAX_PAGE_LIMIT;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/videocat-env";
pub const CONFIG_PATH_VAR: &str = "VIDEOCAT_CONFIG";
pub const DEFAULT_DB_PATH: &str = "/var/lib/videocat/catalog.db";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

const KEYS: [&str; 6] = [
    "DB_PATH",
    "HOST",
    "PORT",
    "FIELD_LAYOUT",
    "SEARCH_FALLBACK",
    "MAX_PAGE_LIMIT",
];

/// Raw values found in the env file or the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub db_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub field_layout: Option<FieldLayout>,
    pub search_fallback: Option<SearchFallback>,
    pub max_page_limit: Option<u64>,
}

impl EnvConfig {
    /// Applies one `KEY=value` pair. Unknown keys are ignored; empty values
    /// leave the setting unset.
    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            return Ok(());
        }
        match key {
            "DB_PATH" => self.db_path = Some(PathBuf::from(value)),
            "HOST" => self.host = Some(value.to_string()),
            "PORT" => {
                let port = value
                    .parse()
                    .with_context(|| format!("Parsing PORT from {origin}"))?;
                self.port = Some(port);
            }
            "FIELD_LAYOUT" => {
                let layout = value
                    .parse()
                    .with_context(|| format!("Parsing FIELD_LAYOUT from {origin}"))?;
                self.field_layout = Some(layout);
            }
            "SEARCH_FALLBACK" => {
                let fallback = value
                    .parse()
                    .with_context(|| format!("Parsing SEARCH_FALLBACK from {origin}"))?;
                self.search_fallback = Some(fallback);
            }
            "MAX_PAGE_LIMIT" => {
                let limit = value
                    .parse()
                    .with_context(|| format!("Parsing MAX_PAGE_LIMIT from {origin}"))?;
                self.max_page_limit = Some(limit);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Fully resolved settings for the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub field_layout: FieldLayout,
    pub search_fallback: SearchFallback,
    pub max_page_limit: u64,
}

impl Settings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Parsing HOST {:?}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            field_layout: FieldLayout::default(),
            search_fallback: SearchFallback::default(),
            max_page_limit: MAX_PAGE_LIMIT,
        }
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            cfg.apply(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Loads settings from the env file at `path` (optional) with variables from
/// the process environment taking precedence.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    load_settings_with(path.as_ref(), |key| std::env::var(key).ok())
}

pub fn load_settings_with<F>(path: &Path, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    for key in KEYS {
        if let Some(value) = env(key) {
            cfg.apply(key, &value, "the environment")?;
        }
    }

    let defaults = Settings::default();
    Ok(Settings {
        db_path: cfg.db_path.unwrap_or(defaults.db_path),
        host: cfg.host.unwrap_or(defaults.host),
        port: cfg.port.unwrap_or(defaults.port),
        field_layout: cfg.field_layout.unwrap_or(defaults.field_layout),
        search_fallback: cfg.search_fallback.unwrap_or(defaults.search_fallback),
        max_page_limit: cfg.max_page_limit.unwrap_or(defaults.max_page_limit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn read_env_config_extracts_values() {
        let cfg = make_config(
            "# catalog\nDB_PATH=\"/data/c.db\"\nPORT=\"4242\"\nFIELD_LAYOUT=flat\n",
        );
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.port, Some(4242));
        assert_eq!(parsed.db_path, Some(PathBuf::from("/data/c.db")));
        assert_eq!(parsed.field_layout, Some(FieldLayout::Flat));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings =
            load_settings_with(Path::new("/nonexistent/videocat-env"), no_env).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn environment_overrides_file() {
        let cfg = make_config("PORT=\"4242\"\nSEARCH_FALLBACK=skip\n");
        let settings = load_settings_with(cfg.path(), |key| match key {
            "PORT" => Some("9000".into()),
            "SEARCH_FALLBACK" => Some("any".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.search_fallback, SearchFallback::AnyField);
        assert_eq!(settings.host, DEFAULT_HOST);
    }

    #[test]
    fn invalid_values_are_reported() {
        let cfg = make_config("MAX_PAGE_LIMIT=lots\n");
        let err = load_settings_with(cfg.path(), no_env).unwrap_err();
        assert!(format!("{err:#}").contains("MAX_PAGE_LIMIT"));
    }
}
