use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod cleaner;
pub mod error;
pub mod scanner;
pub mod security;
pub mod target;

pub use cleaner::{
    CleanConfig, DeleteOutcome, DeletePhase, DeleteProgress, Rejection, TargetCleaner,
    TargetValidation,
};
pub use error::{CleanError, EntryFailure, ScanError};
pub use scanner::{ScanConfig, ScanReport, TargetScanner};
pub use security::{PathValidator, SecurityError, SecurityReason};
pub use target::CleanupTarget;

/// 删除失败的目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    pub path: String,
    pub reason: String,
}

/// 清理结果统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanResult {
    pub cleaned_targets: usize,
    pub total_size_freed: u64,
    pub failed_targets: Vec<FailedTarget>,
    /// 因取消而未执行的目标
    pub skipped_targets: Vec<String>,
    pub duration_ms: u64,
}

impl Default for CleanResult {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanResult {
    pub fn new() -> Self {
        Self {
            cleaned_targets: 0,
            total_size_freed: 0,
            failed_targets: Vec::new(),
            skipped_targets: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn add_success(&mut self, size_freed: u64) {
        self.cleaned_targets += 1;
        self.total_size_freed += size_freed;
    }

    pub fn add_failure(&mut self, target_path: String, reason: String) {
        self.failed_targets.push(FailedTarget {
            path: target_path,
            reason,
        });
    }

    pub fn add_skipped(&mut self, target_path: String) {
        self.skipped_targets.push(target_path);
    }

    pub fn is_complete(&self) -> bool {
        self.failed_targets.is_empty() && self.skipped_targets.is_empty()
    }

    pub fn format_size(&self) -> String {
        format_bytes(self.total_size_freed)
    }
}

/// 格式化字节大小为人类可读格式
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{:.2} {}", size, UNITS[unit]),
    }
}
