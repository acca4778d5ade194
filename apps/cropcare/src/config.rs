use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "cropcare.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub locale: String,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000/".into(),
            locale: "en".into(),
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    locale: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// An explicit `config_path` must exist and parse. Without one, a missing or
/// malformed `cropcare.toml` in the working directory falls back to defaults.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let env = |key: &str| std::env::var(key).ok();
    let Some(path) = config_path else {
        let raw = fs::read_to_string(DEFAULT_CONFIG_FILE).ok();
        return Ok(load_settings_from(raw.as_deref(), env));
    };

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    let file_cfg = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
    Ok(layer_settings(Some(file_cfg), env))
}

/// Layers defaults, then the TOML file, then environment variables.
pub fn load_settings_from(
    raw_file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let file_cfg = raw_file.and_then(|raw| match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => Some(file_cfg),
        Err(err) => {
            tracing::warn!("ignoring unreadable config file: {err}");
            None
        }
    });
    layer_settings(file_cfg, env)
}

fn layer_settings(
    file_cfg: Option<FileSettings>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(file_cfg) = file_cfg {
        if let Some(v) = file_cfg.api_url {
            settings.api_base_url = v;
        }
        if let Some(v) = file_cfg.locale {
            settings.locale = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
    }

    if let Some(v) = env("CROPCARE_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("CROPCARE_LOCALE") {
        settings.locale = v;
    }
    if let Some(v) = env("APP__LOCALE") {
        settings.locale = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}

/// Parses the base URL and forces a trailing slash so endpoint paths join
/// beneath it rather than replacing its last segment.
pub fn normalize_base_url(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("API base URL is empty; set CROPCARE_API_URL or --api-url");
    }

    let mut url =
        Url::parse(raw).with_context(|| format!("invalid API base URL '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("API base URL '{raw}' must use http or https");
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
