use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::catalog::{CatalogRules, DEFAULT_CATEGORIES, DEFAULT_CATEGORY};
use crate::metadata::StoreBackend;
use crate::security::AdminCredentials;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_WWW_ROOT: &str = "public";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SITE_NAME: &str = "Vidshelf";
const DEFAULT_LOG_FILTER: &str = "vidshelf=info,backend=info,migrate_store=info,tower_http=info,warn";

/// Installs the global fmt subscriber. `RUST_LOG` replaces the default filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub data_dir: PathBuf,
    pub www_root: PathBuf,
    pub port: u16,
    pub host: String,
    pub store: StoreBackend,
    pub site_name: String,
    /// Used when a request carries no `Host` header.
    pub site_origin: String,
    pub rules: CatalogRules,
    /// Production deployments get `Secure` cookies.
    pub production: bool,
    pub admin: AdminCredentials,
}

/// Command line values; each one beats both the process environment and the
/// env file.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_dir: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub store: Option<StoreBackend>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeSettings> {
    build_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let data_dir = overrides
        .data_dir
        .or_else(|| lookup("CATALOG_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let www_root = overrides
        .www_root
        .or_else(|| lookup("CATALOG_WWW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT));
    let port = overrides
        .port
        .or_else(|| {
            lookup("CATALOG_PORT")
                .or_else(|| lookup("PORT"))
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("CATALOG_HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let store = match overrides.store {
        Some(store) => store,
        None => lookup("CATALOG_STORE")
            .map(|value| value.parse::<StoreBackend>())
            .transpose()
            .context("Parsing CATALOG_STORE")?
            .unwrap_or_default(),
    };

    let site_name = lookup("CATALOG_SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());
    let site_origin = lookup("CATALOG_SITE_ORIGIN")
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| format!("http://{host}:{port}"));

    let mut categories: Vec<String> = lookup("CATALOG_CATEGORIES")
        .map(|value| {
            value
                .split(',')
                .map(|item| item.trim().to_lowercase())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_CATEGORIES.iter().map(|item| item.to_string()).collect());
    let default_category = lookup("CATALOG_DEFAULT_CATEGORY")
        .map(|value| value.to_lowercase())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    if !categories.contains(&default_category) {
        categories.push(default_category.clone());
    }
    let rules = CatalogRules {
        categories,
        default_category,
        rank_new_videos: lookup("CATALOG_RANK_NEW_VIDEOS").is_some_and(|value| parse_flag(&value)),
    };

    let production = lookup("CATALOG_ENV").is_some_and(|value| value.eq_ignore_ascii_case("production"));
    let admin = AdminCredentials {
        user: lookup("ADMIN_USER").unwrap_or_default(),
        password: lookup("ADMIN_PASSWORD").unwrap_or_default(),
        token: lookup("ADMIN_TOKEN").unwrap_or_default(),
    };

    Ok(RuntimeSettings {
        data_dir,
        www_root,
        port,
        host,
        store,
        site_name,
        site_origin,
        rules,
        production,
        admin,
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl RuntimeSettings {
    /// Logs the settings an operator most likely wants to double check.
    pub fn warn_about_gaps(&self) {
        if !self.admin.is_configured() {
            warn!("ADMIN_PASSWORD or ADMIN_TOKEN is not set; admin login is disabled");
        }
        if self.admin.user.is_empty() {
            warn!("ADMIN_USER is empty");
        }
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

/// Parses `KEY=value` lines, tolerating `export`, quotes and comments.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> RuntimeSettings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let settings = settings_from("");
        assert_eq!(settings.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(settings.www_root, PathBuf::from(DEFAULT_WWW_ROOT));
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(settings.store, StoreBackend::Json);
        assert_eq!(settings.site_origin, "http://127.0.0.1:3000");
        assert_eq!(settings.rules, CatalogRules::default());
        assert!(!settings.production);
        assert!(!settings.admin.is_configured());
    }

    #[test]
    fn reads_every_key_from_file() {
        let settings = settings_from(
            "CATALOG_DATA_DIR=\"/srv/data\"\nCATALOG_WWW_ROOT=/srv/www\nCATALOG_PORT=4242\n\
             CATALOG_HOST=0.0.0.0\nCATALOG_STORE=sqlite\nCATALOG_SITE_NAME=\"My Videos\"\n\
             CATALOG_SITE_ORIGIN=https://videos.example/\nCATALOG_CATEGORIES=\"Music, Pets,,misc\"\n\
             CATALOG_DEFAULT_CATEGORY=misc\nCATALOG_RANK_NEW_VIDEOS=yes\nCATALOG_ENV=production\n\
             ADMIN_USER=root\nADMIN_PASSWORD=pw\nADMIN_TOKEN=tok\n",
        );
        assert_eq!(settings.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(settings.www_root, PathBuf::from("/srv/www"));
        assert_eq!(settings.port, 4242);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.store, StoreBackend::Sqlite);
        assert_eq!(settings.site_name, "My Videos");
        assert_eq!(settings.site_origin, "https://videos.example");
        assert_eq!(settings.rules.categories, vec!["music", "pets", "misc"]);
        assert_eq!(settings.rules.default_category, "misc");
        assert!(settings.rules.rank_new_videos);
        assert!(settings.production);
        assert!(settings.admin.check_login("root", "pw", "tok"));
    }

    #[test]
    fn default_category_joins_the_vocabulary() {
        let settings = settings_from("CATALOG_CATEGORIES=music\nCATALOG_DEFAULT_CATEGORY=Misc\n");
        assert_eq!(settings.rules.categories, vec!["music", "misc"]);
        assert_eq!(settings.rules.normalize_category(Some("jazz")), "misc");
    }

    #[test]
    fn plain_port_is_a_fallback() {
        assert_eq!(settings_from("PORT=5000\n").port, 5000);
        assert_eq!(settings_from("PORT=5000\nCATALOG_PORT=6000\n").port, 6000);
    }

    #[test]
    fn invalid_port_defaults() {
        assert_eq!(settings_from("CATALOG_PORT=nope\n").port, DEFAULT_PORT);
    }

    #[test]
    fn unknown_store_is_an_error() {
        let vars = read_env_file(make_config("CATALOG_STORE=postgres\n").path()).unwrap();
        let err = build_settings(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains("CATALOG_STORE"));
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_config("CATALOG_DATA_DIR=/file\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            if key == "CATALOG_DATA_DIR" {
                Some("/env".to_string())
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/env"));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export CATALOG_DATA_DIR="/data"
            CATALOG_WWW_ROOT='/www'
            CATALOG_HOST =  "0.0.0.0"
            CATALOG_PORT=9090
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get("CATALOG_DATA_DIR").unwrap(), "/data");
        assert_eq!(vars.get("CATALOG_WWW_ROOT").unwrap(), "/www");
        assert_eq!(vars.get("CATALOG_HOST").unwrap(), "0.0.0.0");
        assert_eq!(vars.get("CATALOG_PORT").unwrap(), "9090");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut vars = HashMap::new();
        vars.insert("CATALOG_DATA_DIR".to_string(), "/file-data".to_string());
        vars.insert("CATALOG_WWW_ROOT".to_string(), "/file-www".to_string());
        vars.insert("CATALOG_HOST".to_string(), "file-host".to_string());
        vars.insert("CATALOG_PORT".to_string(), "7000".to_string());
        vars.insert("CATALOG_STORE".to_string(), "json".to_string());

        let overrides = RuntimeOverrides {
            data_dir: Some(PathBuf::from("/override-data")),
            www_root: None,
            port: Some(9000),
            host: Some("override-host".into()),
            store: Some(StoreBackend::Sqlite),
            env_path: None,
        };

        let settings = build_settings_with_overrides(
            &vars,
            |key| {
                if key == "CATALOG_WWW_ROOT" {
                    Some("/env-www".to_string())
                } else if key == "CATALOG_PORT" {
                    Some("8000".to_string())
                } else {
                    None
                }
            },
            overrides,
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/override-data"));
        assert_eq!(settings.www_root, PathBuf::from("/env-www"));
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, "override-host");
        assert_eq!(settings.store, StoreBackend::Sqlite);
    }

    #[test]
    fn blank_host_override_is_ignored() {
        let settings = build_settings_with_overrides(
            &HashMap::new(),
            |_| None,
            RuntimeOverrides {
                host: Some("   ".into()),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(settings.host, DEFAULT_HOST);
    }
}
