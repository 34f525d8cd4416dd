use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CIVIC_DIR_NAME: &str = ".civic";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_SLA_TARGET_HOURS: u64 = 3;
pub const DEFAULT_OVERDUE_THRESHOLD_HOURS: u64 = 3;
pub const DEFAULT_TREND_WEEKS: u32 = 8;
pub const MAX_TREND_WEEKS: u32 = 52;

const DEFAULT_SUPER_ADMIN_PASSKEY: &str = "ykls_764";
const DEFAULT_ELECTRICAL_PASSKEY: &str = "ljn_9871";
const DEFAULT_WATER_PASSKEY: &str = "ljn_9872";
const DEFAULT_MEDICAL_PASSKEY: &str = "ljn_9873";
const DEFAULT_SANITATION_PASSKEY: &str = "ljn_9874";
const DEFAULT_ROADS_PASSKEY: &str = "ljn_9875";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProviderKind {
    #[default]
    Auto,
    Mock,
    Gemini,
}

impl InferenceProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mock => "mock",
            Self::Gemini => "gemini",
        }
    }
}

impl std::str::FromStr for InferenceProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, mock, gemini"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CivicConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    #[serde(default = "default_sla_target_hours")]
    pub sla_target_hours: u64,
    #[serde(default = "default_overdue_threshold_hours")]
    pub overdue_threshold_hours: u64,
    #[serde(default = "default_trend_weeks")]
    pub trend_weeks: u32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            sla_target_hours: DEFAULT_SLA_TARGET_HOURS,
            overdue_threshold_hours: DEFAULT_OVERDUE_THRESHOLD_HOURS,
            trend_weeks: DEFAULT_TREND_WEEKS,
        }
    }
}

impl ReportingConfig {
    pub fn sla_target_ms(&self) -> i64 {
        hours_to_ms(self.sla_target_hours)
    }

    pub fn overdue_threshold_ms(&self) -> i64 {
        hours_to_ms(self.overdue_threshold_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProviderKind::Auto,
            model: None,
            api_key_env: default_api_key_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_super_admin_passkey")]
    pub super_admin_passkey: String,
    #[serde(default)]
    pub department_passkeys: DepartmentPasskeys,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            super_admin_passkey: default_super_admin_passkey(),
            department_passkeys: DepartmentPasskeys::default(),
        }
    }
}

/// Per-department admin passkeys, keyed by department display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DepartmentPasskeys {
    pub electrical: String,
    pub water: String,
    pub medical: String,
    pub sanitation: String,
    pub roads: String,
}

impl Default for DepartmentPasskeys {
    fn default() -> Self {
        Self {
            electrical: DEFAULT_ELECTRICAL_PASSKEY.to_owned(),
            water: DEFAULT_WATER_PASSKEY.to_owned(),
            medical: DEFAULT_MEDICAL_PASSKEY.to_owned(),
            sanitation: DEFAULT_SANITATION_PASSKEY.to_owned(),
            roads: DEFAULT_ROADS_PASSKEY.to_owned(),
        }
    }
}

impl DepartmentPasskeys {
    pub fn for_department(&self, department: &str) -> Option<&str> {
        let passkey = match department.trim().to_ascii_lowercase().as_str() {
            "electrical" => &self.electrical,
            "water" => &self.water,
            "medical" => &self.medical,
            "sanitation" => &self.sanitation,
            "roads" => &self.roads,
            _ => return None,
        };
        Some(passkey.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn civic_dir(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(CIVIC_DIR_NAME)
}

pub fn config_path(root: impl AsRef<Path>) -> PathBuf {
    civic_dir(root).join(CONFIG_FILE_NAME)
}

pub fn load_root_config(root: impl AsRef<Path>) -> Result<CivicConfig, ConfigError> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(CivicConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: CivicConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_root_config(root: impl AsRef<Path>) -> Result<CivicConfig, ConfigError> {
    let root = root.as_ref();
    fs::create_dir_all(civic_dir(root))?;

    let path = config_path(root);
    if path.exists() {
        return load_root_config(root);
    }

    let config = CivicConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &CivicConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.reporting.sla_target_hours == 0 {
        warnings.push(ConfigWarning {
            code: "sla_target_zero",
            message: "reporting.sla_target_hours is 0; only instantly resolved issues will count as compliant".to_owned(),
        });
    }
    if config.reporting.overdue_threshold_hours == 0 {
        warnings.push(ConfigWarning {
            code: "overdue_threshold_zero",
            message: "reporting.overdue_threshold_hours is 0; every open issue will count as overdue".to_owned(),
        });
    }
    if config.reporting.trend_weeks == 0 || config.reporting.trend_weeks > MAX_TREND_WEEKS {
        warnings.push(ConfigWarning {
            code: "trend_weeks_out_of_range",
            message: format!(
                "reporting.trend_weeks is {}; it is clamped to 1..={MAX_TREND_WEEKS}",
                config.reporting.trend_weeks
            ),
        });
    }
    if config.access.super_admin_passkey == DEFAULT_SUPER_ADMIN_PASSKEY
        || config.access.department_passkeys == DepartmentPasskeys::default()
    {
        warnings.push(ConfigWarning {
            code: "default_passkeys",
            message: "built-in admin passkeys are in use; set [access] values before exposing the service".to_owned(),
        });
    }

    warnings
}

fn hours_to_ms(hours: u64) -> i64 {
    i64::try_from(hours.saturating_mul(60 * 60 * 1000)).unwrap_or(i64::MAX)
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_owned()
}

fn default_api_key_env() -> String {
    DEFAULT_GEMINI_API_KEY_ENV.to_owned()
}

fn default_super_admin_passkey() -> String {
    DEFAULT_SUPER_ADMIN_PASSKEY.to_owned()
}

fn default_sla_target_hours() -> u64 {
    DEFAULT_SLA_TARGET_HOURS
}

fn default_overdue_threshold_hours() -> u64 {
    DEFAULT_OVERDUE_THRESHOLD_HOURS
}

fn default_trend_weeks() -> u32 {
    DEFAULT_TREND_WEEKS
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: CivicConfig) -> CivicConfig {
    config.inference.model = normalize_optional(config.inference.model.take());

    let api_key_env = config.inference.api_key_env.trim();
    if api_key_env.is_empty() {
        config.inference.api_key_env = default_api_key_env();
    } else {
        config.inference.api_key_env = api_key_env.to_owned();
    }

    let bind = config.server.bind.trim();
    if bind.is_empty() {
        config.server.bind = default_bind();
    } else {
        config.server.bind = bind.to_owned();
    }

    config
}
