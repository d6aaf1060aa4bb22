use std::env;
use std::fs;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::error::CleanError;

/// 路径被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityReason {
    #[error("path contains invalid UTF-8 characters")]
    InvalidUtf8,

    #[error("path contains null bytes")]
    NullByte,

    #[error("failed to resolve absolute path")]
    Unresolvable,

    #[error("path normalization mismatch (potential traversal attack)")]
    NormalizationMismatch,

    #[error("path is outside working directory")]
    OutsideWorkingDir,

    #[error("cannot delete working directory itself")]
    WorkingDirItself,

    #[error("path attempts to traverse outside working directory")]
    Traversal,

    #[error("path crosses filesystem boundary")]
    CrossesFilesystem,

    #[error("parent directory {} is a symlink", .0.display())]
    SymlinkAncestor(PathBuf),

    #[error("working directory cannot be a symlink")]
    WorkingDirSymlink,

    #[error("target is a symlink, refusing to delete")]
    TargetIsSymlink,

    #[error("target is not a directory")]
    TargetNotDirectory,
}

impl SecurityReason {
    /// 是否属于越界/路径穿越类拒绝
    pub fn is_escape(&self) -> bool {
        matches!(
            self,
            SecurityReason::OutsideWorkingDir
                | SecurityReason::Traversal
                | SecurityReason::NormalizationMismatch
        )
    }
}

/// 安全校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("security violation for path {}: {reason}", .path.display())]
pub struct SecurityError {
    pub path: PathBuf,
    pub reason: SecurityReason,
}

impl SecurityError {
    pub fn new(path: impl Into<PathBuf>, reason: SecurityReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// 路径安全校验器
///
/// 持有规范化后的工作目录及其设备号，创建后不可变，可在多个线程间共享。
/// 每一次会修改文件系统的操作之前都必须先调用 [`PathValidator::validate`]。
#[derive(Debug, Clone)]
pub struct PathValidator {
    working_dir: PathBuf,
    working_dev: Option<u64>,
}

impl PathValidator {
    /// 基于工作目录创建校验器
    ///
    /// 工作目录必须存在、必须是目录，且本身不能是符号链接。
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CleanError> {
        let requested = working_dir.as_ref();
        let absolute = std::path::absolute(requested)
            .map(|p| lexical_clean(&p))
            .map_err(|source| CleanError::ResolveWorkingDir {
                path: requested.to_path_buf(),
                source,
            })?;

        // 使用 lstat，避免跟随工作目录本身的符号链接
        let metadata =
            fs::symlink_metadata(&absolute).map_err(|source| CleanError::ResolveWorkingDir {
                path: absolute.clone(),
                source,
            })?;

        if metadata.file_type().is_symlink() {
            return Err(SecurityError::new(absolute, SecurityReason::WorkingDirSymlink).into());
        }

        if !metadata.is_dir() {
            return Err(CleanError::WorkingDirNotADirectory(absolute));
        }

        let canonical =
            fs::canonicalize(&absolute).map_err(|source| CleanError::ResolveWorkingDir {
                path: absolute.clone(),
                source,
            })?;

        debug!("工作目录: {:?}", canonical);

        Ok(Self {
            working_dir: canonical,
            working_dev: device_id(&metadata),
        })
    }

    /// 规范化后的工作目录
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// 工作目录所在设备号（平台不支持时为 None）
    pub fn working_dev(&self) -> Option<u64> {
        self.working_dev
    }

    /// 校验候选路径，按顺序执行检查，第一个失败的检查决定拒绝原因
    pub fn validate(&self, candidate: &Path) -> Result<(), SecurityError> {
        let deny = |reason| Err(SecurityError::new(candidate, reason));

        // 1. 编码完整性
        let Some(text) = candidate.to_str() else {
            return deny(SecurityReason::InvalidUtf8);
        };
        if text.contains('\0') {
            return deny(SecurityReason::NullByte);
        }

        // 2. 绝对路径与其清理形式必须逐字一致
        let absolute = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            match env::current_dir() {
                Ok(cwd) => cwd.join(candidate),
                Err(_) => return deny(SecurityReason::Unresolvable),
            }
        };
        if absolute.as_os_str() != lexical_clean(&absolute).as_os_str() {
            return deny(SecurityReason::NormalizationMismatch);
        }

        // 3. 包含关系
        if !with_trailing_separator(&absolute).starts_with(&with_trailing_separator(&self.working_dir))
        {
            return deny(SecurityReason::OutsideWorkingDir);
        }
        if absolute == self.working_dir {
            return deny(SecurityReason::WorkingDirItself);
        }

        // 4. 相对路径中不允许出现 ..
        match absolute.strip_prefix(&self.working_dir) {
            Ok(relative) if !relative.components().any(|c| c == Component::ParentDir) => {}
            _ => return deny(SecurityReason::Traversal),
        }

        // 5. 设备边界（不跟随末端符号链接）
        if let Some(working_dev) = self.working_dev {
            if let Ok(metadata) = fs::symlink_metadata(&absolute) {
                if device_id(&metadata) != Some(working_dev) {
                    return deny(SecurityReason::CrossesFilesystem);
                }
            }
        }

        // 6. 祖先目录不能是符号链接
        self.check_ancestors(&absolute)
            .map_err(|reason| SecurityError::new(candidate, reason))
    }

    /// 校验候选路径，返回拒绝原因而不是错误
    pub fn check(&self, candidate: &Path) -> Option<SecurityReason> {
        self.validate(candidate).err().map(|err| err.reason)
    }

    fn check_ancestors(&self, path: &Path) -> Result<(), SecurityReason> {
        for ancestor in path
            .ancestors()
            .skip(1)
            .take_while(|ancestor| *ancestor != self.working_dir)
        {
            if let Ok(metadata) = fs::symlink_metadata(ancestor) {
                if metadata.file_type().is_symlink() {
                    return Err(SecurityReason::SymlinkAncestor(ancestor.to_path_buf()));
                }
            }
        }

        Ok(())
    }
}

/// 纯字面地清理路径：去掉 `.`、折叠多余分隔符、就地消解 `..`
///
/// 不访问文件系统，因此不会解析符号链接。
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => cleaned.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            Component::Normal(part) => cleaned.push(part),
        }
    }

    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }

    cleaned
}

fn with_trailing_separator(path: &Path) -> Vec<u8> {
    let mut bytes = path.as_os_str().as_encoded_bytes().to_vec();
    if !bytes.ends_with(MAIN_SEPARATOR_STR.as_bytes()) {
        bytes.extend_from_slice(MAIN_SEPARATOR_STR.as_bytes());
    }
    bytes
}

#[cfg(unix)]
fn device_id(metadata: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.dev())
}

#[cfg(not(unix))]
fn device_id(_metadata: &fs::Metadata) -> Option<u64> {
    None
}
