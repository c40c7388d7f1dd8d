use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "sockr.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub buffer_size: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub buffer_size: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub buffer_size: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub buffer_size: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6011,
            buffer_size: 1024,
            log_level: "info".to_string(),
        }
    }
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = cwd.join(CONFIG_FILE_NAME);
            if !candidate.exists() {
                return Ok(None);
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("SOCKR_HOST").filter(|v| !v.trim().is_empty()),
            port: lookup("SOCKR_PORT").and_then(|v| parse_port(&v)),
            buffer_size: lookup("SOCKR_BUFFER_SIZE").and_then(|v| parse_buffer_size(&v)),
            log_level: lookup("SOCKR_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
        }
    }
}

pub fn resolve_settings(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> Settings {
    let base = Settings::default();

    let host = cli
        .host
        .clone()
        .or_else(|| env_cfg.host.clone())
        .or_else(|| file_cfg.and_then(|c| c.host.clone()))
        .unwrap_or(base.host);

    let port = cli
        .port
        .or(env_cfg.port)
        .or(file_cfg.and_then(|c| c.port))
        .unwrap_or(base.port);

    let buffer_size = cli
        .buffer_size
        .or(env_cfg.buffer_size)
        .or(file_cfg.and_then(|c| c.buffer_size))
        .unwrap_or(base.buffer_size);

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| env_cfg.log_level.clone())
        .or_else(|| file_cfg.and_then(|c| c.log_level.clone()))
        .unwrap_or(base.log_level);

    Settings {
        host,
        port,
        buffer_size,
        log_level,
    }
}

/// Parses a port given as text, e.g. from the environment.
pub fn parse_port(input: &str) -> Option<u16> {
    input.trim().parse().ok()
}

fn parse_buffer_size(input: &str) -> Option<usize> {
    input.trim().parse().ok().filter(|size| *size > 0)
}

#[cfg(test)]
mod tests {
    use super::{
        CliOverrides, EnvConfig, FileConfig, Settings, load_file_config, parse_port,
        resolve_settings,
    };
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn valid_config_parses() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("sockr.json");
        fs::write(&path, r#"{"host":"0.0.0.0","port":7000}"#).expect("write should work");

        let parsed = load_file_config(None, dir.path())
            .expect("parse should work")
            .expect("file should exist");
        assert_eq!(parsed.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(parsed.port, Some(7000));
        assert_eq!(parsed.buffer_size, None);
    }

    #[test]
    fn missing_default_file_is_none() {
        let dir = tempdir().expect("tempdir should work");
        let parsed = load_file_config(None, dir.path()).expect("lookup should work");
        assert_eq!(parsed, None);
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("elsewhere.json");
        let err = load_file_config(Some(&path), dir.path()).expect_err("read should fail");
        assert!(format!("{err:#}").contains("failed reading config file"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("sockr.json");
        fs::write(&path, r#"{"unknown":1}"#).expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("sockr.json");
        fs::write(&path, r#"{"port":70000}"#).expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(format!("{err:#}").contains("failed parsing config file"));
    }

    #[test]
    fn env_values_are_parsed() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SOCKR_HOST", "localhost"),
            ("SOCKR_PORT", " 8123 "),
            ("SOCKR_BUFFER_SIZE", "0"),
            ("SOCKR_LOG_LEVEL", "debug"),
        ]);
        let env_cfg = EnvConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(env_cfg.host.as_deref(), Some("localhost"));
        assert_eq!(env_cfg.port, Some(8123));
        assert_eq!(env_cfg.buffer_size, None);
        assert_eq!(env_cfg.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn port_text_must_be_integer() {
        assert_eq!(parse_port("6011"), Some(6011));
        assert_eq!(parse_port("port"), None);
        assert_eq!(parse_port("-1"), None);
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let resolved =
            resolve_settings(&CliOverrides::default(), &EnvConfig::default(), None);
        assert_eq!(resolved, Settings::default());
        assert_eq!(resolved.buffer_size, 1024);
    }

    #[test]
    fn precedence_cli_env_file_defaults() {
        let file = FileConfig {
            host: Some("file-host".to_string()),
            port: Some(1000),
            buffer_size: Some(2048),
            log_level: Some("trace".to_string()),
        };

        let env_cfg = EnvConfig {
            host: Some("env-host".to_string()),
            port: Some(2000),
            ..EnvConfig::default()
        };

        let cli = CliOverrides {
            port: Some(3000),
            ..CliOverrides::default()
        };

        let resolved = resolve_settings(&cli, &env_cfg, Some(&file));
        assert_eq!(resolved.host, "env-host");
        assert_eq!(resolved.port, 3000);
        assert_eq!(resolved.buffer_size, 2048);
        assert_eq!(resolved.log_level, "trace");
    }
}
