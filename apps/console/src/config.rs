use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::CacheConfig;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub cache_stale_seconds: u64,
    /// `None` keeps idle cache entries for the whole run.
    pub cache_gc_seconds: Option<u64>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".into(),
            cache_stale_seconds: 0,
            cache_gc_seconds: Some(300),
            log_filter: "warn,client_core=info".into(),
        }
    }
}

impl Settings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            stale_time: Duration::from_secs(self.cache_stale_seconds),
            gc_time: self.cache_gc_seconds.map(Duration::from_secs),
        }
    }
}

/// Defaults, then `path` when it exists, then environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
            .with_context(|| format!("config file '{}' is not a flat string table", path.display()))?;
        apply_file(&mut settings, &file_cfg);
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    settings.api_base_url = normalize_api_base_url(&settings.api_base_url);
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("api_base_url") {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("cache_stale_seconds") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.cache_stale_seconds = parsed;
        }
    }
    if let Some(v) = file_cfg.get("cache_gc_seconds") {
        if let Some(parsed) = parse_gc_seconds(v) {
            settings.cache_gc_seconds = parsed;
        }
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = var("APP__CACHE_STALE_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.cache_stale_seconds = parsed;
        }
    }

    if let Some(v) = var("APP__CACHE_GC_SECONDS") {
        if let Some(parsed) = parse_gc_seconds(&v) {
            settings.cache_gc_seconds = parsed;
        }
    }

    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

/// `"off"` disables eviction; anything unparsable is ignored.
fn parse_gc_seconds(raw: &str) -> Option<Option<u64>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("off") || raw.eq_ignore_ascii_case("never") {
        return Some(None);
    }
    raw.parse::<u64>().ok().map(Some)
}

pub fn normalize_api_base_url(raw_api_base_url: &str) -> String {
    let raw_api_base_url = raw_api_base_url.trim().trim_end_matches('/');

    if raw_api_base_url.is_empty() {
        return Settings::default().api_base_url;
    }

    if raw_api_base_url.contains("://") {
        return raw_api_base_url.to_string();
    }

    format!("http://{raw_api_base_url}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
