/*
[INPUT]:  Optional YAML file, RADAR_AUTH_* environment variables
[OUTPUT]: Validated auth configuration and session file location
[POS]:    Configuration layer - layered settings for the CLI
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use radar_auth::AuthConfig;

/// Prefix for environment overrides, e.g. `RADAR_AUTH_CHAIN_ID`
pub const ENV_PREFIX: &str = "RADAR_AUTH";

const APP_DIR: &str = "radar-auth";
const SESSION_FILE: &str = "session.json";

/// Load settings: built-in defaults, then the YAML file, then the environment.
pub fn load_auth_config(path: Option<&Path>) -> Result<AuthConfig> {
    load_with_env(path, None)
}

/// Same as [`load_auth_config`] with an explicit environment map instead of
/// the process environment.
pub fn load_with_env(
    path: Option<&Path>,
    env: Option<config::Map<String, String>>,
) -> Result<AuthConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        let path_str = path.to_str().context("config path must be valid utf-8")?;
        builder = builder.add_source(File::new(path_str, FileFormat::Yaml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(env),
    );

    let config: AuthConfig = builder
        .build()
        .context("read configuration sources")?
        .try_deserialize()
        .context("parse auth configuration")?;
    config.validate().context("invalid auth configuration")?;
    Ok(config)
}

/// `<data dir>/radar-auth/session.json`
pub fn default_session_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(data_dir.join(APP_DIR).join(SESSION_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.chain_id, 534351);
    }

    #[test]
    fn test_environment_overrides() {
        let config = load_with_env(
            None,
            env(&[
                ("RADAR_AUTH_BASE_URL", "https://api.example.test"),
                ("RADAR_AUTH_CHAIN_ID", "1"),
                ("RADAR_AUTH_CHALLENGE_TTL_SECS", "60"),
            ]),
        )
        .unwrap();
        assert_eq!(config.base_url, "https://api.example.test");
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.challenge_ttl_secs, 60);
        assert_eq!(config.domain, AuthConfig::default().domain);
    }

    #[test]
    fn test_file_then_environment() {
        let dir = std::env::temp_dir().join(format!("radar-auth-cli-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("auth.yaml");
        fs::write(
            &path,
            "domain: example.test\nuri: https://example.test\nchain_id: 10\n",
        )
        .unwrap();

        let config = load_with_env(Some(&path), env(&[("RADAR_AUTH_CHAIN_ID", "534351")])).unwrap();
        assert_eq!(config.domain, "example.test");
        assert_eq!(config.uri, "https://example.test");
        assert_eq!(config.chain_id, 534351);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load_with_env(None, env(&[("RADAR_AUTH_CHAIN_ID", "0")])).is_err());
        assert!(load_with_env(None, env(&[("RADAR_AUTH_BASE_URL", "not a url")])).is_err());
        assert!(load_with_env(Some(Path::new("/nonexistent/auth.yaml")), env(&[])).is_err());
    }

    #[test]
    fn test_default_session_path() {
        if let Ok(path) = default_session_path() {
            assert!(path.ends_with("radar-auth/session.json"));
        }
    }
}
