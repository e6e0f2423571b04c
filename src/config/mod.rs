use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::budget::{DEFAULT_ALERT_THRESHOLD, default_budgets};

pub const PROJECT_CONFIG_FILE: &str = ".crewdesk.project.yml";
const DEFAULT_DATA_DIR: &str = ".crewdesk/data";
const DEFAULT_EXPORT_DIR: &str = ".crewdesk/exports";
const DEFAULT_CACHE_DIR: &str = ".crewdesk-cache";

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub budgets: BTreeMap<String, f64>,
    pub alert_threshold: f64,
}

impl EffectiveConfig {
    pub fn defaults(cwd: &Path) -> Self {
        Self {
            data_dir: cwd.join(DEFAULT_DATA_DIR),
            export_dir: cwd.join(DEFAULT_EXPORT_DIR),
            cache_dir: cwd.join(DEFAULT_CACHE_DIR),
            budgets: default_budgets(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    data_dir: Option<String>,
    #[serde(default)]
    export_dir: Option<String>,
    #[serde(default)]
    cache_dir: Option<String>,
    #[serde(default)]
    budgets: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    alert_threshold: Option<f64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config `{}`: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("budget for `{group}` must be a non-negative number, got {amount}")]
    InvalidBudget { group: String, amount: f64 },
    #[error("alert_threshold must be between 0 and 1000 percent, got {0}")]
    InvalidThreshold(f64),
}

/// Paths in a layer are already resolved; budgets merge per group key.
#[derive(Debug, Default)]
struct ConfigLayer {
    data_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    budgets: BTreeMap<String, f64>,
    alert_threshold: Option<f64>,
}

/// User config, then the nearest project config above `cwd`, then the repo
/// config; later layers win.
pub fn load_effective_config(
    cwd: &Path,
    home: &Path,
    repo_config: Option<&Path>,
    user_config: Option<&Path>,
) -> Result<EffectiveConfig, ConfigError> {
    let mut merged = EffectiveConfig::defaults(cwd);

    if let Some(path) = user_config.filter(|path| path.exists()) {
        merge_layer(&mut merged, load_config_layer(path, cwd, home)?);
    }

    if let Some(path) = find_nearest_project_config(cwd) {
        merge_layer(&mut merged, load_config_layer(&path, cwd, home)?);
    }

    if let Some(path) = repo_config.filter(|path| path.exists()) {
        merge_layer(&mut merged, load_config_layer(path, cwd, home)?);
    }

    Ok(merged)
}

pub fn find_nearest_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

fn merge_layer(merged: &mut EffectiveConfig, layer: ConfigLayer) {
    if let Some(dir) = layer.data_dir {
        merged.data_dir = dir;
    }
    if let Some(dir) = layer.export_dir {
        merged.export_dir = dir;
    }
    if let Some(dir) = layer.cache_dir {
        merged.cache_dir = dir;
    }
    merged.budgets.extend(layer.budgets);
    if let Some(threshold) = layer.alert_threshold {
        merged.alert_threshold = threshold;
    }
}

fn load_config_layer(path: &Path, cwd: &Path, home: &Path) -> Result<ConfigLayer, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = if content.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str::<RawConfig>(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    };
    parse_config_layer(raw, cwd, home)
}

fn parse_config_layer(raw: RawConfig, cwd: &Path, home: &Path) -> Result<ConfigLayer, ConfigError> {
    let resolve = |value: Option<String>| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| resolve_path(&value, cwd, home))
    };

    let mut budgets = BTreeMap::new();
    for (group, amount) in raw.budgets.unwrap_or_default() {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ConfigError::InvalidBudget { group, amount });
        }
        budgets.insert(crate::budget::group_key(&group), amount);
    }

    if let Some(threshold) = raw.alert_threshold {
        if !(0.0..=1000.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
    }

    Ok(ConfigLayer {
        data_dir: resolve(raw.data_dir),
        export_dir: resolve(raw.export_dir),
        cache_dir: resolve(raw.cache_dir),
        budgets,
        alert_threshold: raw.alert_threshold,
    })
}

pub fn default_repo_config_yaml() -> String {
    r#"data_dir: .crewdesk/data
export_dir: .crewdesk/exports
alert_threshold: 90
budgets:
  groupa: 50000
  groupb: 40000
  groupc: 55500
  parts: 290000
"#
    .to_string()
}

pub fn expand_tilde(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(path)
}

fn resolve_path(raw: &str, cwd: &Path, home: &Path) -> PathBuf {
    let expanded = expand_tilde(raw, home);
    if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    }
}
