use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use control_core::ControlConfig;
use serde::Deserialize;
use shared::domain::{
    ScreenSize, ScrollMode, ScrollSettings, DEFAULT_DELAY_SECONDS, DEFAULT_SENSITIVITY_DEGREES,
    DEFAULT_SKIP_DISTANCE,
};
use tracing::warn;

const DEFAULT_CONFIG_FILE: &str = "gazectl.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub delay_seconds: i64,
    pub skip_distance: f32,
    pub sensitivity: f32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub log_filter: String,
    pub classification_timeout_ms: u64,
    pub service_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delay_seconds: i64::from(DEFAULT_DELAY_SECONDS),
            skip_distance: DEFAULT_SKIP_DISTANCE,
            sensitivity: DEFAULT_SENSITIVITY_DEGREES,
            screen_width: 1080,
            screen_height: 2340,
            log_filter: "info".into(),
            classification_timeout_ms: 500,
            service_enabled: true,
        }
    }
}

impl Settings {
    pub fn screen(&self) -> ScreenSize {
        ScreenSize::new(self.screen_width, self.screen_height)
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            initial_settings: ScrollSettings {
                mode: ScrollMode::from_delay_seconds(self.delay_seconds),
                skip_distance: self.skip_distance,
                sensitivity_degrees: self.sensitivity,
            },
            service_enabled: self.service_enabled,
            classification_timeout: Duration::from_millis(self.classification_timeout_ms),
            ..ControlConfig::default()
        }
    }
}

/// Reads `path` (or `gazectl.toml` in the working directory when present), then applies
/// `APP__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => parse_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                parse_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };

    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn parse_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    parse_settings(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str(raw)?)
}

pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    override_parsed(&lookup, "APP__DELAY_SECONDS", &mut settings.delay_seconds);
    override_parsed(&lookup, "APP__SKIP_DISTANCE", &mut settings.skip_distance);
    override_parsed(&lookup, "APP__SENSITIVITY", &mut settings.sensitivity);
    override_parsed(&lookup, "APP__SCREEN_WIDTH", &mut settings.screen_width);
    override_parsed(&lookup, "APP__SCREEN_HEIGHT", &mut settings.screen_height);
    override_parsed(
        &lookup,
        "APP__CLASSIFICATION_TIMEOUT_MS",
        &mut settings.classification_timeout_ms,
    );
    override_parsed(&lookup, "APP__SERVICE_ENABLED", &mut settings.service_enabled);
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
