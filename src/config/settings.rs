//! Process settings from the environment (a `.env` file is honoured).

use crate::case::NamingPolicy;
use crate::error::ConfigError;
use crate::query::QueryDefaults;
use std::str::FromStr;

pub const DEFAULT_ROUTE_PREFIX: &str = "odata";
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: Option<String>,
    /// Postgres schema used for tables whose type config names none.
    pub database_schema: String,
    pub config_dir: Option<String>,
    pub route_prefix: String,
    pub nested_level: usize,
    pub body_limit: usize,
    pub naming: NamingPolicy,
    pub query_defaults: QueryDefaults,
    /// Expose store types that have no entity declaration.
    pub auto_generate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_addr: "0.0.0.0:3000".into(),
            database_url: None,
            database_schema: "public".into(),
            config_dir: None,
            route_prefix: DEFAULT_ROUTE_PREFIX.into(),
            nested_level: 1,
            body_limit: DEFAULT_BODY_LIMIT,
            naming: NamingPolicy::default(),
            query_defaults: QueryDefaults::default(),
            auto_generate: false,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup; unset variables keep defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        if let Some(v) = get("BIND_ADDR") {
            s.bind_addr = v;
        }
        s.database_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if let Some(v) = get("DATABASE_SCHEMA") {
            s.database_schema = v;
        }
        s.config_dir = get("API_CONFIG_DIR").filter(|v| !v.trim().is_empty());
        if let Some(v) = get("API_ROUTE_PREFIX") {
            s.route_prefix = v.trim_matches('/').to_string();
        }
        if let Some(v) = get("API_NESTED_LEVEL") {
            s.nested_level = parse("API_NESTED_LEVEL", &v)?;
        }
        if let Some(v) = get("API_BODY_LIMIT") {
            s.body_limit = parse("API_BODY_LIMIT", &v)?;
        }
        if let Some(v) = get("API_NAMING") {
            s.naming = NamingPolicy::parse(&v)
                .ok_or_else(|| ConfigError::Validation(format!("API_NAMING: unknown policy '{}'", v)))?;
        }
        if let Some(v) = get("API_AUTO_GENERATE") {
            s.auto_generate = parse_bool("API_AUTO_GENERATE", &v)?;
        }

        let q = &mut s.query_defaults;
        for (key, flag) in [
            ("API_QUERY_COUNT", &mut q.enable_count),
            ("API_QUERY_EXPAND", &mut q.enable_expand),
            ("API_QUERY_FILTER", &mut q.enable_filter),
            ("API_QUERY_ORDERBY", &mut q.enable_order_by),
            ("API_QUERY_SELECT", &mut q.enable_select),
            ("API_QUERY_SKIPTOKEN", &mut q.enable_skip_token),
            ("API_QUERY_TOP", &mut q.enable_top),
        ] {
            if let Some(v) = get(key) {
                *flag = parse_bool(key, &v)?;
            }
        }
        if let Some(v) = get("API_MAX_TOP") {
            q.max_top = Some(parse("API_MAX_TOP", &v)?);
        }
        Ok(s)
    }
}

fn parse<T: FromStr>(key: &str, v: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    v.trim()
        .parse()
        .map_err(|e| ConfigError::Validation(format!("{}: {}", key, e)))
}

fn parse_bool(key: &str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Validation(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.route_prefix, "odata");
        assert_eq!(s.nested_level, 1);
        assert!(s.query_defaults.enable_count);
        assert!(s.database_url.is_none());
    }

    #[test]
    fn query_toggles_and_prefix() {
        let s = Settings::from_lookup(lookup(&[
            ("API_QUERY_COUNT", "false"),
            ("API_ROUTE_PREFIX", "/api/v1/"),
            ("API_MAX_TOP", "50"),
        ]))
        .unwrap();
        assert!(!s.query_defaults.enable_count);
        assert_eq!(s.route_prefix, "api/v1");
        assert_eq!(s.query_defaults.max_top, Some(50));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Settings::from_lookup(lookup(&[("API_NESTED_LEVEL", "deep")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("API_QUERY_TOP", "maybe")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("API_NAMING", "kebab")])).is_err());
    }
}
