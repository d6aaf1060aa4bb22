use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::CleanResult;
use crate::error::{CleanError, EntryFailure};
use crate::security::{PathValidator, SecurityError, SecurityReason};
use crate::target::CleanupTarget;

/// 删除任务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletePhase {
    Pending,
    Validating,
    Removing,
    Done,
    PartialFailure,
    /// 任务开始前已被取消
    Skipped,
}

impl DeletePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeletePhase::Done | DeletePhase::PartialFailure | DeletePhase::Skipped
        )
    }
}

/// 删除进度信息
#[derive(Debug, Clone)]
pub struct DeleteProgress {
    pub target_path: PathBuf,
    pub target_name: String,
    pub phase: DeletePhase,
    pub entries_removed: usize,
    pub error: Option<String>,
}

impl DeleteProgress {
    fn new(target: &CleanupTarget, phase: DeletePhase) -> Self {
        Self {
            target_path: target.path.clone(),
            target_name: target.name.clone(),
            phase,
            entries_removed: 0,
            error: None,
        }
    }
}

/// 清理器配置
#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub dry_run: bool,
    /// 每个目标作为独立任务并行删除
    pub parallel: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallel: true,
        }
    }
}

/// 单个目标的删除结果
#[derive(Debug)]
pub struct DeleteOutcome {
    pub path: PathBuf,
    pub freed_bytes: u64,
    pub entries_removed: usize,
    /// 被跳过或删除失败、仍留在磁盘上的条目
    pub failures: Vec<EntryFailure>,
}

impl DeleteOutcome {
    pub fn phase(&self) -> DeletePhase {
        if self.failures.is_empty() {
            DeletePhase::Done
        } else {
            DeletePhase::PartialFailure
        }
    }
}

/// 被预校验拒绝的目标
#[derive(Debug)]
pub struct Rejection {
    pub target: CleanupTarget,
    pub error: CleanError,
}

/// 预校验结果
#[derive(Debug, Default)]
pub struct TargetValidation {
    pub accepted: Vec<CleanupTarget>,
    pub rejected: Vec<Rejection>,
}

/// 清理目标删除器
pub struct TargetCleaner {
    validator: PathValidator,
    config: CleanConfig,
    cancelled: Arc<AtomicBool>,
}

impl TargetCleaner {
    /// 基于扫描时的工作目录创建删除器
    pub fn new<P: AsRef<Path>>(working_dir: P, config: CleanConfig) -> Result<Self, CleanError> {
        let validator = PathValidator::new(working_dir)?;
        info!("删除器工作目录: {:?}", validator.working_dir());

        Ok(Self {
            validator,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn working_dir(&self) -> &Path {
        self.validator.working_dir()
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// 取消标志；置位后尚未开始的任务不再执行，已开始的任务不回滚
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 校验目标：安全检查 + 必须存在、不能是符号链接、必须是目录
    fn check_target(&self, path: &Path) -> Result<(), CleanError> {
        self.validator.validate(path)?;

        let metadata = fs::symlink_metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CleanError::Missing(path.to_path_buf()),
            _ => CleanError::Stat {
                path: path.to_path_buf(),
                source,
            },
        })?;

        if metadata.file_type().is_symlink() {
            return Err(SecurityError::new(path, SecurityReason::TargetIsSymlink).into());
        }

        if !metadata.is_dir() {
            return Err(SecurityError::new(path, SecurityReason::TargetNotDirectory).into());
        }

        Ok(())
    }

    /// 预校验目标列表，同时返回被拒绝的目标及原因
    pub fn partition_targets(&self, targets: &[CleanupTarget]) -> TargetValidation {
        let mut validation = TargetValidation::default();

        for target in targets {
            match self.check_target(&target.path) {
                Ok(()) => validation.accepted.push(target.clone()),
                Err(error) => {
                    debug!("目标 {:?} 未通过校验: {}", target.path, error);
                    validation.rejected.push(Rejection {
                        target: target.clone(),
                        error,
                    });
                }
            }
        }

        if !validation.rejected.is_empty() {
            info!(
                "预校验移除了 {} 个目标，保留 {} 个目标",
                validation.rejected.len(),
                validation.accepted.len()
            );
        }

        validation
    }

    /// 预校验目标列表，只返回通过校验的目标
    pub fn validate_targets(&self, targets: &[CleanupTarget]) -> Vec<CleanupTarget> {
        self.partition_targets(targets).accepted
    }

    /// 删除单个目标
    pub fn delete(&self, target: &CleanupTarget) -> Result<DeleteOutcome, CleanError> {
        self.delete_with_progress(target, |_| {})
    }

    /// 删除单个目标（带进度回调）
    pub fn delete_with_progress<F>(
        &self,
        target: &CleanupTarget,
        progress_callback: F,
    ) -> Result<DeleteOutcome, CleanError>
    where
        F: Fn(DeleteProgress),
    {
        progress_callback(DeleteProgress::new(target, DeletePhase::Validating));

        let result = self.run_delete(target, &progress_callback);

        let mut progress = DeleteProgress::new(target, DeletePhase::Done);
        match &result {
            Ok(outcome) => {
                progress.phase = outcome.phase();
                progress.entries_removed = outcome.entries_removed;
                if outcome.failures.is_empty() {
                    info!("成功删除目标: {:?} ({})", target.path, target.formatted_size());
                } else {
                    warn!(
                        "目标 {:?} 已删除，但有 {} 个条目失败",
                        target.path,
                        outcome.failures.len()
                    );
                }
            }
            Err(e) => {
                error!("删除目标失败 {:?}: {}", target.path, e);
                progress.phase = DeletePhase::PartialFailure;
                progress.error = Some(e.to_string());
            }
        }
        progress_callback(progress);

        result
    }

    fn run_delete<F>(
        &self,
        target: &CleanupTarget,
        progress_callback: &F,
    ) -> Result<DeleteOutcome, CleanError>
    where
        F: Fn(DeleteProgress),
    {
        self.check_target(&target.path)?;

        if self.config.dry_run {
            info!("DRY RUN: 将删除 {:?} ({})", target.path, target.formatted_size());
            return Ok(DeleteOutcome {
                path: target.path.clone(),
                freed_bytes: target.size,
                entries_removed: 0,
                failures: Vec::new(),
            });
        }

        progress_callback(DeleteProgress::new(target, DeletePhase::Removing));
        debug!("开始删除目标: {:?}", target.path);

        let entries = fs::read_dir(&target.path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CleanError::Missing(target.path.clone()),
            _ => CleanError::Open {
                path: target.path.clone(),
                source,
            },
        })?;

        let mut job = RemovalJob::new(&self.validator);
        job.remove_dir_contents(&target.path, entries);

        // 删除目标目录本身之前再校验一次
        self.validator.validate(&target.path)?;

        match fs::remove_dir(&target.path) {
            Ok(()) => Ok(DeleteOutcome {
                path: target.path.clone(),
                freed_bytes: target.size,
                entries_removed: job.removed + 1,
                failures: job.failures,
            }),
            Err(source) => Err(CleanError::Incomplete {
                path: target.path.clone(),
                failures: job.failures,
                source,
            }),
        }
    }

    /// 批量删除目标
    pub fn clean_targets(&self, targets: &[CleanupTarget]) -> CleanResult {
        self.clean_targets_with_progress(targets, |_| {})
    }

    /// 批量删除目标（带进度回调），每个目标一个独立任务
    pub fn clean_targets_with_progress<F>(
        &self,
        targets: &[CleanupTarget],
        progress_callback: F,
    ) -> CleanResult
    where
        F: Fn(DeleteProgress) + Sync,
    {
        let start_time = Instant::now();
        let result = Mutex::new(CleanResult::new());

        info!("开始删除 {} 个目标", targets.len());

        for target in targets {
            progress_callback(DeleteProgress::new(target, DeletePhase::Pending));
        }

        let run_job = |target: &CleanupTarget| {
            let path = target.path.to_string_lossy().to_string();

            if self.is_cancelled() {
                debug!("已取消，跳过目标: {}", path);
                progress_callback(DeleteProgress::new(target, DeletePhase::Skipped));
                lock(&result).add_skipped(path);
                return;
            }

            // 锁只在记录结果时持有，不跨越 I/O
            match self.delete_with_progress(target, &progress_callback) {
                Ok(outcome) => lock(&result).add_success(outcome.freed_bytes),
                Err(e) => lock(&result).add_failure(path, e.to_string()),
            }
        };

        if self.config.parallel {
            targets.par_iter().for_each(&run_job);
        } else {
            targets.iter().for_each(&run_job);
        }

        let mut result = result.into_inner().unwrap_or_else(PoisonError::into_inner);
        result.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "删除完成: 成功 {} 个，失败 {} 个，跳过 {} 个，释放空间 {}，耗时 {}ms",
            result.cleaned_targets,
            result.failed_targets.len(),
            result.skipped_targets.len(),
            result.format_size(),
            result.duration_ms
        );

        result
    }

    /// 预览删除操作（dry run）
    pub fn preview_clean(&self, targets: &[CleanupTarget]) -> CleanResult {
        let cleaner = TargetCleaner {
            validator: self.validator.clone(),
            config: CleanConfig {
                dry_run: true,
                ..self.config.clone()
            },
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        cleaner.clean_targets(targets)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 一个目标内部的递归删除，累积每个条目的失败
struct RemovalJob<'a> {
    validator: &'a PathValidator,
    removed: usize,
    failures: Vec<EntryFailure>,
}

impl<'a> RemovalJob<'a> {
    fn new(validator: &'a PathValidator) -> Self {
        Self {
            validator,
            removed: 0,
            failures: Vec::new(),
        }
    }

    fn remove_dir_contents(&mut self, dir: &Path, entries: fs::ReadDir) {
        for entry in entries {
            match entry {
                Ok(entry) => self.remove_entry(&entry.path()),
                Err(source) => self.failures.push(EntryFailure::io(dir, "read", source)),
            }
        }
    }

    fn remove_entry(&mut self, path: &Path) {
        // 每个条目在删除前重新校验，缩小检查与使用之间的窗口
        if let Err(err) = self.validator.validate(path) {
            warn!("跳过未通过校验的条目: {}", err);
            self.failures.push(err.into());
            return;
        }

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            // 已被外部删除
            Err(source) if source.kind() == io::ErrorKind::NotFound => return,
            Err(source) => {
                self.failures.push(EntryFailure::io(path, "stat", source));
                return;
            }
        };

        let file_type = metadata.file_type();
        let result = if file_type.is_symlink() {
            // 只删除链接本身，绝不跟随
            remove_symlink(path).map_err(|source| EntryFailure::io(path, "remove symlink", source))
        } else if file_type.is_dir() {
            self.remove_subdir(path)
        } else {
            fs::remove_file(path).map_err(|source| EntryFailure::io(path, "remove file", source))
        };

        match result {
            Ok(()) => self.removed += 1,
            Err(failure) => {
                debug!("条目删除失败: {}", failure);
                self.failures.push(failure);
            }
        }
    }

    fn remove_subdir(&mut self, path: &Path) -> Result<(), EntryFailure> {
        let entries =
            fs::read_dir(path).map_err(|source| EntryFailure::io(path, "open directory", source))?;
        self.remove_dir_contents(path, entries);
        fs::remove_dir(path).map_err(|source| EntryFailure::io(path, "remove directory", source))
    }
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    // 目录符号链接需要用 remove_dir 删除
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(not(windows))]
fn remove_symlink(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}
