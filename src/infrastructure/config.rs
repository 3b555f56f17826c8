use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u64 = 1;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 50;
const DEFAULT_CASCADE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSettings {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
    pub concurrency: usize,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            concurrency: DEFAULT_CASCADE_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub timezone: Tz,
    pub cascade: CascadeSettings,
}

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": SUPPORTED_SCHEMA,
        "appName": "Protocol Tracker",
        "timezone": DEFAULT_TIMEZONE,
        "cascade": {
            "maxAttempts": DEFAULT_MAX_ATTEMPTS,
            "baseDelayMs": DEFAULT_BASE_DELAY_MS,
            "concurrency": DEFAULT_CASCADE_CONCURRENCY
        }
    })
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;

    let app_name = app
        .get("appName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Protocol Tracker")
        .to_string();

    let timezone = parse_timezone(
        app.get("timezone")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(DEFAULT_TIMEZONE),
    )?;

    let cascade = match app.get("cascade") {
        None | Some(serde_json::Value::Null) => CascadeSettings::default(),
        Some(value) => serde_json::from_value::<CascadeSettings>(value.clone()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid cascade settings in {}: {error}", path.display()))
        })?,
    };
    if cascade.max_attempts == 0 {
        return Err(InfraError::InvalidConfig(
            "cascade.maxAttempts must be >= 1".to_string(),
        ));
    }
    if cascade.concurrency == 0 {
        return Err(InfraError::InvalidConfig(
            "cascade.concurrency must be >= 1".to_string(),
        ));
    }

    Ok(AppConfig {
        app_name,
        timezone,
        cascade,
    })
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Tz::UTC);
    }
    value
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{value}': {error}")))
}

/// Persist a new IANA zone into `app.json`, keeping every other key.
pub fn save_timezone(config_dir: &Path, timezone: &str) -> Result<Tz, InfraError> {
    let timezone = parse_timezone(timezone)?;
    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "timezone".to_string(),
        serde_json::Value::String(timezone.name().to_string()),
    );

    let formatted = serde_json::to_string_pretty(&app)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(timezone)
}
