use serde::{Deserialize, Serialize};
use std::env::VarError;
use std::path::PathBuf;
use std::time::Duration;
use toml;

use crate::backends::spec::DEFAULT_REVISION;
use crate::backends::{BackendKey, BackendSpec};
use crate::completion::{DEFAULT_MAX_NEW_TOKENS, DEFAULT_TIMEOUT};
use crate::registry::catalog::{self, Catalog, CatalogEntry, BUILTIN_DEFAULT_KEY};
use crate::die;
use tracing::warn;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub(crate) struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub(crate) struct Generation {
    pub max_new_tokens: usize,
    /// Zero disables the per-request timeout.
    pub timeout_secs: u64,
}

impl Default for Generation {
    fn default() -> Self {
        Generation {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Generation {
    pub(crate) fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub(crate) struct Hub {
    /// Revision used by backends that do not pin their own.
    pub revision: String,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Hub {
    fn default() -> Self {
        Hub {
            revision: DEFAULT_REVISION.to_string(),
            cache_dir: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct Backend {
    pub key: String,
    pub model_id: String,
    pub revision: Option<String>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub(crate) struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub generation: Generation,
    #[serde(default)]
    pub hub: Hub,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backends: Option<Vec<Backend>>,
}

impl Config {
    /// The declared catalog, or the built-in one when none is declared.
    pub(crate) fn catalog(&self) -> Result<Catalog, catalog::Error> {
        let backends = match &self.backends {
            Some(backends) => backends,
            None => return Ok(self.pin_builtin()),
        };

        let entries = backends
            .iter()
            .map(|b| {
                let revision = b.revision.as_ref().unwrap_or(&self.hub.revision);

                CatalogEntry::new(
                    BackendKey::new(b.key.as_str()),
                    BackendSpec::pinned(b.model_id.as_str(), revision.as_str()),
                )
            })
            .collect();

        Catalog::new(entries)
    }

    fn pin_builtin(&self) -> Catalog {
        let builtin = Catalog::builtin();

        if self.hub.revision == DEFAULT_REVISION {
            return builtin;
        }

        let entries: Vec<CatalogEntry> = builtin
            .iter()
            .map(|e| {
                CatalogEntry::new(
                    e.key.clone(),
                    BackendSpec::pinned(e.spec.model_id.as_str(), self.hub.revision.as_str()),
                )
            })
            .collect();

        Catalog::new(entries).unwrap_or(builtin)
    }
}

pub(crate) const ACCELERATION_ENV_VAR: &str = "GPU_ACCELERATION";
pub(crate) const DEFAULT_MODEL_ENV_VAR: &str = "MODEL_NAME";

/// Settings sourced from the process environment. Read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Environment {
    pub accelerator_requested: bool,
    pub default_key: BackendKey,
}

impl Environment {
    pub(crate) fn from_env() -> Environment {
        Environment::from_lookup(|name| match std::env::var(name) {
            Ok(value) => Some(value),
            Err(VarError::NotPresent) => None,
            Err(VarError::NotUnicode(_)) => die!("failed to parse {}", name),
        })
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Environment {
        let accelerator_requested = lookup(ACCELERATION_ENV_VAR)
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let default_key = lookup(DEFAULT_MODEL_ENV_VAR)
            .map(BackendKey::new)
            .unwrap_or_else(|| BackendKey::new(BUILTIN_DEFAULT_KEY));

        Environment {
            accelerator_requested,
            default_key,
        }
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/xgate/config.toml", ".xgate.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/xgate.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn parse_config<S: serde::de::DeserializeOwned>(config: &str) -> Result<S, toml::de::Error> {
    toml::de::from_str(config)
}

fn parse_config_or_die<S: serde::de::DeserializeOwned>(config: &str) -> S {
    match parse_config(config) {
        Ok(s) => s,
        Err(err) => die!("failed to parse config: {}", err),
    }
}

fn extra_fields_helper<'a>(
    path: &mut Vec<&'a String>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
    extra: &mut Vec<String>,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        if let Some(config_value) = config.get(user_key) {
            match (user_value, config_value) {
                (toml::Value::Table(user_value), toml::Value::Table(config_value)) => {
                    extra_fields_helper(path, user_value, config_value, extra)
                }
                (toml::Value::Array(user_values), toml::Value::Array(config_values)) => {
                    for (user_value, config_value) in user_values.iter().zip(config_values) {
                        if let (toml::Value::Table(user_value), toml::Value::Table(config_value)) =
                            (user_value, config_value)
                        {
                            extra_fields_helper(path, user_value, config_value, extra)
                        }
                    }
                }
                _ => {}
            }
        } else {
            let path: Vec<&str> = path.iter().map(|&s| s.as_str()).collect();

            extra.push(path.join("."));
        }

        path.pop();
    }
}

/// A copy of `config` in which every optional key is present, so that it
/// serializes to the full set of known keys.
fn with_every_key(config: &Config) -> Config {
    let mut config = config.clone();

    config.hub.cache_dir.get_or_insert_with(PathBuf::new);

    for backend in config.backends.iter_mut().flatten() {
        backend.revision.get_or_insert_with(String::new);
    }

    config
}

/// Dotted paths of keys in `raw_config` that `config` does not know about.
fn extra_fields(config: &Config, raw_config: &str) -> Result<Vec<String>, toml::de::Error> {
    let user_config: toml::Table = parse_config(raw_config)?;

    let config: toml::Table = {
        let serialized_config = match toml::ser::to_string(&with_every_key(config)) {
            Ok(serialized_config) => serialized_config,
            Err(_) => return Ok(Vec::new()),
        };

        parse_config(&serialized_config)?
    };

    let mut path = Vec::new();
    let mut extra = Vec::new();

    extra_fields_helper(&mut path, &user_config, &config, &mut extra);

    Ok(extra)
}

pub(crate) fn read_config(config: Option<PathBuf>) -> Config {
    let config_path = config.or_else(get_config_path);

    if let Some(path) = config_path {
        let raw_config = match std::fs::read_to_string(&path) {
            Ok(raw_config) => raw_config,
            Err(err) => die!("failed to read config {}: {}", path.display(), err),
        };

        let config: Config = parse_config_or_die(&raw_config);

        for key in extra_fields(&config, &raw_config).unwrap_or_default() {
            warn!("config contains extraneous key \"{}\", ignoring", key);
        }

        config
    } else {
        Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config: Config = parse_config("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.generation.max_new_tokens, 500);
        assert_eq!(config.generation.timeout(), Some(Duration::from_secs(300)));

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_declared_catalog() {
        let raw = r#"
            [hub]
            revision = "v1"

            [[backends]]
            key = "fast"
            model_id = "org/fast"

            [[backends]]
            key = "pinned"
            model_id = "org/pinned"
            revision = "abc123"
        "#;

        let config: Config = parse_config(raw).unwrap();
        let catalog = config.catalog().unwrap();

        let entries: Vec<&CatalogEntry> = catalog.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key.as_str(), "fast");
        assert_eq!(entries[0].spec, BackendSpec::pinned("org/fast", "v1"));
        assert_eq!(entries[1].spec, BackendSpec::pinned("org/pinned", "abc123"));
    }

    #[test]
    fn test_hub_revision_pins_builtin_catalog() {
        let config: Config = parse_config("[hub]\nrevision = \"v2\"").unwrap();

        let catalog = config.catalog().unwrap();

        assert!(catalog.iter().all(|e| e.spec.revision == "v2"));
        assert_eq!(
            catalog.spec("distilgpt2").unwrap().model_id,
            "distilgpt2"
        );
    }

    #[test]
    fn test_duplicate_backend_is_rejected() {
        let raw = r#"
            [[backends]]
            key = "fast"
            model_id = "org/a"

            [[backends]]
            key = "fast"
            model_id = "org/b"
        "#;

        let config: Config = parse_config(raw).unwrap();

        assert!(matches!(
            config.catalog(),
            Err(catalog::Error::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config: Config = parse_config("[generation]\ntimeout_secs = 0").unwrap();

        assert_eq!(config.generation.timeout(), None);
        assert_eq!(config.generation.max_new_tokens, 500);
    }

    #[test]
    fn test_reports_extraneous_keys() {
        let raw = r#"
            colour = "blue"

            [server]
            port = 9000
            workers = 4

            [[backends]]
            key = "fast"
            model_id = "org/fast"
            trust_remote_code = true
        "#;

        let config: Config = parse_config(raw).unwrap();
        let extra = extra_fields(&config, raw).unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(extra.contains(&"colour".to_string()));
        assert!(extra.contains(&"server.workers".to_string()));
        assert!(extra.contains(&"backends.trust_remote_code".to_string()));
        assert_eq!(extra.len(), 3);
    }

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Environment::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_environment_defaults() {
        let env = environment(&[]);

        assert!(!env.accelerator_requested);
        assert_eq!(env.default_key.as_str(), "deepseek-chat");
    }

    #[test]
    fn test_environment_overrides() {
        let env = environment(&[("GPU_ACCELERATION", "TRUE"), ("MODEL_NAME", "distilgpt2")]);

        assert!(env.accelerator_requested);
        assert_eq!(env.default_key.as_str(), "distilgpt2");

        let env = environment(&[("GPU_ACCELERATION", "1")]);
        assert!(!env.accelerator_requested);
    }
}
