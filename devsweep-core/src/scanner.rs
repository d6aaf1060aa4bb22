use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog;
use crate::error::ScanError;
use crate::target::CleanupTarget;

/// 工作线程数量下限
pub const MIN_WORKERS: usize = 4;
/// 工作线程数量上限
pub const MAX_WORKERS: usize = 16;

/// 扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 计算大小的工作线程数量（None 表示根据 CPU 数量自动选择）
    pub workers: Option<usize>,
    pub max_depth: Option<usize>,
    /// 工作队列满时，遍历线程最多等待多久，超时后丢弃该发现项
    pub enqueue_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: None,
            max_depth: None,
            enqueue_timeout: Duration::from_secs(2),
        }
    }
}

impl ScanConfig {
    /// 实际使用的工作线程数量
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(workers) => workers.max(1),
            None => default_worker_count(),
        }
    }
}

/// I/O 密集型任务：CPU 数量的 3 倍，限制在 4..=16 之间
pub fn default_worker_count() -> usize {
    (num_cpus::get() * 3).clamp(MIN_WORKERS, MAX_WORKERS)
}

/// 一次扫描的结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub working_dir: PathBuf,
    pub targets: Vec<CleanupTarget>,
    pub duration: Duration,
    /// 因工作队列持续满载而被丢弃的发现项数量
    pub dropped: usize,
}

impl ScanReport {
    /// 所有目标的总大小
    pub fn total_size(&self) -> u64 {
        self.targets.iter().map(|t| t.size).sum()
    }

    /// 扫描耗时，保留一位小数
    pub fn duration_string(&self) -> String {
        format!("{:.1}s", self.duration.as_secs_f64())
    }
}

/// 清理目标扫描器
pub struct TargetScanner {
    config: ScanConfig,
}

impl TargetScanner {
    /// 创建新的扫描器
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// 扫描指定路径下的所有清理目标
    pub fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<ScanReport, ScanError> {
        let start_time = Instant::now();
        let root_path = root_path.as_ref();
        info!("开始扫描路径: {:?}", root_path);

        let root = resolve_root(root_path)?;

        let workers = self.config.worker_count();
        // 通道容量为工作线程数的 2 倍
        let capacity = workers * 2;
        let (work_tx, work_rx) = bounded::<PathBuf>(capacity);
        let (result_tx, result_rx) = bounded::<CleanupTarget>(capacity);
        let dropped = AtomicUsize::new(0);

        debug!("启动 {} 个工作线程，队列容量 {}", workers, capacity);

        let targets = thread::scope(|scope| {
            let walker_root = root.as_path();
            let dropped = &dropped;
            let config = &self.config;
            scope.spawn(move || walk_for_targets(walker_root, config, work_tx, dropped));

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || size_worker(work_rx, result_tx));
            }
            drop(work_rx);
            drop(result_tx);

            // 单一汇总者独占结果列表，无需加锁
            result_rx.iter().collect::<Vec<_>>()
        });

        let report = ScanReport {
            working_dir: root,
            targets,
            duration: start_time.elapsed(),
            dropped: dropped.into_inner(),
        };

        info!(
            "扫描完成: 找到 {} 个清理目标，共 {}，耗时 {}",
            report.targets.len(),
            crate::format_bytes(report.total_size()),
            report.duration_string()
        );
        if report.dropped > 0 {
            warn!("工作队列拥塞，丢弃了 {} 个目标", report.dropped);
        }

        Ok(report)
    }

    /// 按大小排序（从大到小）
    pub fn sort_by_size(mut targets: Vec<CleanupTarget>) -> Vec<CleanupTarget> {
        targets.sort_by(|a, b| b.size.cmp(&a.size));
        targets
    }

    /// 按名称过滤目标
    pub fn filter_by_names(targets: Vec<CleanupTarget>, names: &[String]) -> Vec<CleanupTarget> {
        if names.is_empty() {
            return targets;
        }
        targets
            .into_iter()
            .filter(|t| names.iter().any(|n| n == &t.name))
            .collect()
    }
}

impl Default for TargetScanner {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

/// 校验并规范化扫描根目录
fn resolve_root(root_path: &Path) -> Result<PathBuf, ScanError> {
    let metadata = fs::metadata(root_path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ScanError::NotFound(root_path.to_path_buf()),
        _ => ScanError::Resolve {
            path: root_path.to_path_buf(),
            source,
        },
    })?;

    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root_path.to_path_buf()));
    }

    fs::canonicalize(root_path).map_err(|source| ScanError::Resolve {
        path: root_path.to_path_buf(),
        source,
    })
}

/// 深度优先遍历，把命中的目录交给工作线程，不进入已命中的目录
fn walk_for_targets(
    root: &Path,
    config: &ScanConfig,
    work_tx: Sender<PathBuf>,
    dropped: &AtomicUsize,
) {
    let mut walker = WalkDir::new(root).follow_links(false).min_depth(1);
    if let Some(depth) = config.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut entries = walker.into_iter();
    while let Some(entry) = entries.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("扫描错误: {}", e);
                continue;
            }
        };

        // 仅使用目录项自带的类型信息，不额外 stat
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!("跳过符号链接: {:?}", entry.path());
            continue;
        }
        if !file_type.is_dir() {
            continue;
        }

        let Some(name) = entry.path().to_str().and(entry.file_name().to_str()) else {
            debug!("跳过非 UTF-8 路径: {:?}", entry.path());
            entries.skip_current_dir();
            continue;
        };

        if !catalog::is_cleanup_target(name) {
            continue;
        }

        entries.skip_current_dir();
        debug!("发现清理目标: {:?}", entry.path());

        match work_tx.send_timeout(entry.into_path(), config.enqueue_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(path)) => {
                warn!("工作队列已满，丢弃目标: {:?}", path);
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(SendTimeoutError::Disconnected(_)) => break,
        }
    }
}

/// 计算目标大小并发送结果
fn size_worker(work_rx: Receiver<PathBuf>, result_tx: Sender<CleanupTarget>) {
    for path in work_rx {
        match CleanupTarget::from_path(&path) {
            Some(target) => {
                debug!("目标 {:?} 大小 {}", target.path, target.formatted_size());
                if result_tx.send(target).is_err() {
                    break;
                }
            }
            None => debug!("无法解析目标名称: {:?}", path),
        }
    }
}
