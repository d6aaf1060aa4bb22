use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::catalog;

/// Allocation unit used when estimating on-disk size
pub const BLOCK_SIZE: u64 = 4096;

/// A directory discovered under the working directory that can be swept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTarget {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub category: String,
    pub selected: bool,
}

impl CleanupTarget {
    /// Create a `CleanupTarget` from a directory path, computing its size.
    ///
    /// Returns `None` when the path has no UTF-8 basename.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let name = path.file_name()?.to_str()?.to_string();
        let size = calculate_directory_size(path);

        Some(Self {
            category: catalog::category_or_unknown(&name).to_string(),
            path: path.to_path_buf(),
            name,
            size,
            selected: false,
        })
    }

    /// Get a human-readable size string
    pub fn formatted_size(&self) -> String {
        crate::format_bytes(self.size)
    }

    /// Get relative path from a base directory
    pub fn relative_path(&self, base: &Path) -> PathBuf {
        self.path
            .strip_prefix(base)
            .unwrap_or(&self.path)
            .to_path_buf()
    }

    /// Check if the target directory still exists (without following a symlink)
    pub fn exists(&self) -> bool {
        self.path.symlink_metadata().is_ok()
    }
}

/// Round a file length up to whole blocks; empty files still occupy one block
pub fn block_rounded(len: u64) -> u64 {
    if len == 0 {
        BLOCK_SIZE
    } else {
        len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
    }
}

/// Calculate the block-rounded size of all regular files beneath `dir`.
///
/// Symlinks are never followed or counted, and unreadable entries are skipped.
pub fn calculate_directory_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| block_rounded(metadata.len()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_block_rounded() {
        assert_eq!(block_rounded(0), 4096);
        assert_eq!(block_rounded(1), 4096);
        assert_eq!(block_rounded(4096), 4096);
        assert_eq!(block_rounded(4097), 8192);
        assert_eq!(block_rounded(5000), 8192);
    }

    #[test]
    fn test_size_of_empty_and_small_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let target_dir = temp_dir.path().join("node_modules");
        fs::create_dir_all(&target_dir)?;
        fs::write(target_dir.join("empty.js"), "")?;
        fs::write(target_dir.join("bundle.js"), vec![b'x'; 5000])?;

        assert_eq!(calculate_directory_size(&target_dir), 4096 + 8192);

        Ok(())
    }

    #[test]
    fn test_size_counts_nested_files() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let nested = temp_dir.path().join("dist").join("assets").join("img");
        fs::create_dir_all(&nested)?;
        fs::write(nested.join("a.png"), vec![0u8; 10])?;
        fs::write(temp_dir.path().join("dist").join("index.html"), "<html>")?;

        assert_eq!(calculate_directory_size(&temp_dir.path().join("dist")), 8192);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_size_skips_symlinks() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&outside)?;
        fs::write(outside.join("huge.bin"), vec![0u8; 100_000])?;

        let target_dir = temp_dir.path().join(".cache");
        fs::create_dir_all(&target_dir)?;
        fs::write(target_dir.join("entry"), "x")?;
        std::os::unix::fs::symlink(&outside, target_dir.join("linked_dir"))?;
        std::os::unix::fs::symlink(outside.join("huge.bin"), target_dir.join("linked_file"))?;

        assert_eq!(calculate_directory_size(&target_dir), 4096);

        Ok(())
    }

    #[test]
    fn test_from_path() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let target_dir = temp_dir.path().join(".next");
        fs::create_dir_all(&target_dir)?;
        fs::write(target_dir.join("build-manifest.json"), "{}")?;

        let target = CleanupTarget::from_path(&target_dir).expect("utf-8 basename");
        assert_eq!(target.name, ".next");
        assert_eq!(target.category, "Next.js build cache");
        assert_eq!(target.size, 4096);
        assert!(!target.selected);
        assert!(target.exists());

        Ok(())
    }

    #[test]
    fn test_relative_path() {
        let target = CleanupTarget {
            path: PathBuf::from("/home/user/web/app/node_modules"),
            name: "node_modules".to_string(),
            size: 0,
            category: "Node.js/Bun.js dependencies".to_string(),
            selected: false,
        };

        let relative = target.relative_path(Path::new("/home/user/web"));
        assert_eq!(relative, PathBuf::from("app/node_modules"));
    }

    #[test]
    fn test_formatted_size() {
        let target = CleanupTarget {
            path: PathBuf::from("/w/dist"),
            name: "dist".to_string(),
            size: 12288,
            category: "Distribution/build files".to_string(),
            selected: true,
        };

        assert_eq!(target.formatted_size(), "12.00 KB");
    }
}
