use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use devsweep_core::{CleanConfig, ScanConfig};

/// 配置文件
///
/// ```toml
/// [scan]
/// workers = 8
/// max_depth = 12
/// enqueue_timeout_ms = 2000
///
/// [clean]
/// parallel = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanSettings,
    pub clean: CleanSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub workers: Option<usize>,
    pub max_depth: Option<usize>,
    pub enqueue_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanSettings {
    pub parallel: bool,
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Settings {
    /// 默认配置文件路径
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("devsweep").join("config.toml"))
    }

    /// 加载配置：显式指定的文件必须存在，默认位置的文件可以缺省
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::config_file_path() {
            Some(path) if path.is_file() => Self::load_from_file(&path),
            _ => {
                tracing::debug!("使用默认配置");
                Ok(Self::default())
            }
        }
    }

    /// 从文件加载设置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::info!("已加载配置文件: {:?}", path);
        Ok(settings)
    }

    /// 命令行参数优先于配置文件
    pub fn scan_config(&self, workers: Option<usize>, max_depth: Option<usize>) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            workers: workers.or(self.scan.workers),
            max_depth: max_depth.or(self.scan.max_depth),
            enqueue_timeout: self
                .scan
                .enqueue_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.enqueue_timeout),
        }
    }

    pub fn clean_config(&self, dry_run: bool, no_parallel: bool) -> CleanConfig {
        CleanConfig {
            dry_run,
            parallel: self.clean.parallel && !no_parallel,
        }
    }
}
