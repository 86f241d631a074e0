//! Runtime configuration, read from the environment (and `.env` if present).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Canonical target applied to CPL and profiles created without one.
pub const DEFAULT_TARGET: f64 = 75.0;

/// Per-student score at or above which a student counts as passing a CPL.
pub const DEFAULT_PASS_THRESHOLD: f64 = 60.0;

const DEFAULT_DB_PATH: &str = "data/capaian.db";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub default_target: f64,
    pub student_pass_threshold: f64,
    /// Allowed browser origin; any origin when unset.
    pub cors_origin: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: DEFAULT_BIND.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            default_target: DEFAULT_TARGET,
            student_pass_threshold: DEFAULT_PASS_THRESHOLD,
            cors_origin: None,
        }
    }
}

// load .env if present
fn load_dotenv() {
    let _ = dotenv::dotenv();
}

impl AppConfig {
    /// Build the config from process env. Honors CAPAIAN_BIND, CAPAIAN_DB_URL,
    /// CAPAIAN_DB_PATH, CAPAIAN_DEFAULT_TARGET, CAPAIAN_PASS_THRESHOLD and
    /// CAPAIAN_CORS_ORIGIN.
    pub fn from_env() -> Self {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but with an injectable lookup, so tests do not
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();

        if let Some(bind) = lookup("CAPAIAN_BIND").filter(|s| !s.trim().is_empty()) {
            cfg.bind_addr = bind.trim().to_string();
        }

        if let Some(p) = lookup("CAPAIAN_DB_PATH").filter(|s| !s.trim().is_empty()) {
            cfg.db_path = PathBuf::from(p.trim());
        } else if let Some(url) = lookup("CAPAIAN_DB_URL") {
            // sqlite:///abs/path, sqlite://rel/path and file:// are all plain files here
            if let Some(rest) = url.strip_prefix("sqlite://") {
                cfg.db_path = PathBuf::from(rest);
            } else if let Some(rest) = url.strip_prefix("file://") {
                cfg.db_path = PathBuf::from(rest);
            } else {
                tracing::warn!(url = %url, "unsupported CAPAIAN_DB_URL scheme, using default path");
            }
        }

        if let Some(t) = parse_pct(lookup("CAPAIAN_DEFAULT_TARGET"), "CAPAIAN_DEFAULT_TARGET") {
            cfg.default_target = t;
        }
        if let Some(t) = parse_pct(lookup("CAPAIAN_PASS_THRESHOLD"), "CAPAIAN_PASS_THRESHOLD") {
            cfg.student_pass_threshold = t;
        }

        cfg.cors_origin = lookup("CAPAIAN_CORS_ORIGIN").filter(|s| !s.trim().is_empty());
        cfg
    }
}

fn parse_pct(raw: Option<String>, key: &str) -> Option<f64> {
    let raw = raw?;
    match raw.trim().replace(',', ".").parse::<f64>() {
        Ok(v) if (0.0..=100.0).contains(&v) => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring out-of-range percentage");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(|_| None);
        assert_eq!(cfg.default_target, 75.0);
        assert_eq!(cfg.student_pass_threshold, 60.0);
        assert_eq!(cfg.db_path, PathBuf::from("data/capaian.db"));
        assert!(cfg.cors_origin.is_none());
    }

    #[test]
    fn test_db_url_schemes() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("CAPAIAN_DB_URL", "sqlite:///tmp/x.db")]));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));

        let cfg = AppConfig::from_lookup(lookup_from(&[("CAPAIAN_DB_URL", "postgres://h/db")]));
        assert_eq!(cfg.db_path, PathBuf::from("data/capaian.db"));

        // explicit path wins over url
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("CAPAIAN_DB_URL", "file://a.db"),
            ("CAPAIAN_DB_PATH", "b.db"),
        ]));
        assert_eq!(cfg.db_path, PathBuf::from("b.db"));
    }

    #[test]
    fn test_percentages_are_range_checked() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("CAPAIAN_DEFAULT_TARGET", "70"),
            ("CAPAIAN_PASS_THRESHOLD", "150"),
        ]));
        assert_eq!(cfg.default_target, 70.0);
        assert_eq!(cfg.student_pass_threshold, 60.0);
    }
}
