//! Service configuration from the environment, resource definitions from JSON files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::{validate, ResourceConfig};
use crate::error::ConfigError;

/// Behaviour of the authorization gate for requests that resolve to no endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedRoutes {
    #[default]
    Deny,
    Allow,
}

/// Metadata rendered into the generated API document.
#[derive(Clone, Debug)]
pub struct ApiInfo {
    pub title: String,
    pub description: Option<String>,
    pub version: String,
    pub servers: Vec<String>,
}

impl Default for ApiInfo {
    fn default() -> Self {
        ApiInfo {
            title: "API".into(),
            description: None,
            version: env!("CARGO_PKG_VERSION").into(),
            servers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub listen_addr: String,
    /// When set the PostgreSQL document store is used.
    pub database_url: Option<String>,
    pub store_schema: String,
    /// Directory holding `resources.json`, or the file itself.
    pub resources_path: Option<PathBuf>,
    pub api: ApiInfo,
    /// Include internal error detail in 500 responses.
    pub debug: bool,
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
    pub default_response_limit: u32,
    pub unresolved_routes: UnresolvedRoutes,
}

/// Hard cap for any list page size.
pub const MAX_RESPONSE_LIMIT: u32 = 1000;

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            listen_addr: "0.0.0.0:3000".into(),
            database_url: None,
            store_schema: "public".into(),
            resources_path: None,
            api: ApiInfo::default(),
            debug: false,
            request_timeout: Duration::from_secs(10),
            body_limit_bytes: 1024 * 1024,
            default_response_limit: 10,
            unresolved_routes: UnresolvedRoutes::Deny,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Load(format!("{}: {}", key, e)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Load(format!("{}: not a boolean: {}", key, other))),
    }
}

impl ServiceConfig {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = ServiceConfig::default();
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LISTEN_ADDR") {
            cfg.listen_addr = v;
        }
        cfg.database_url = get("DATABASE_URL");
        if let Some(v) = get("STORE_SCHEMA") {
            cfg.store_schema = v;
        }
        cfg.resources_path = get("RESOURCES_PATH").map(PathBuf::from);
        if let Some(v) = get("API_TITLE") {
            cfg.api.title = v;
        }
        cfg.api.description = get("API_DESCRIPTION");
        if let Some(v) = get("API_BASE_URLS") {
            cfg.api.servers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("DEBUG") {
            cfg.debug = parse_bool("DEBUG", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(parse("REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("BODY_LIMIT_BYTES") {
            cfg.body_limit_bytes = parse("BODY_LIMIT_BYTES", &v)?;
        }
        if let Some(v) = get("DEFAULT_RESPONSE_LIMIT") {
            let n: u32 = parse("DEFAULT_RESPONSE_LIMIT", &v)?;
            if n == 0 {
                return Err(ConfigError::Load("DEFAULT_RESPONSE_LIMIT must be positive".into()));
            }
            cfg.default_response_limit = n.min(MAX_RESPONSE_LIMIT);
        }
        if let Some(v) = get("UNRESOLVED_ROUTES") {
            cfg.unresolved_routes = match v.trim().to_ascii_lowercase().as_str() {
                "deny" => UnresolvedRoutes::Deny,
                "allow" => UnresolvedRoutes::Allow,
                other => {
                    return Err(ConfigError::Load(format!(
                        "UNRESOLVED_ROUTES: expected deny or allow, got {}",
                        other
                    )))
                }
            };
        }
        Ok(cfg)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResourcesFile {
    List(Vec<ResourceConfig>),
    Wrapped { resources: Vec<ResourceConfig> },
}

/// Load resource definitions from `<dir>/resources.json` (or a file path) and validate them.
pub fn load_resources_from_path(path: &Path) -> Result<Vec<ResourceConfig>, ConfigError> {
    let file = if path.is_dir() {
        path.join("resources.json")
    } else {
        path.to_path_buf()
    };
    let raw = std::fs::read_to_string(&file)
        .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
    let resources = match serde_json::from_str::<ResourcesFile>(&raw)
        .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?
    {
        ResourcesFile::List(list) => list,
        ResourcesFile::Wrapped { resources } => resources,
    };
    validate(&resources)?;
    tracing::info!(path = %file.display(), count = resources.len(), "resource definitions loaded");
    Ok(resources)
}
