//! # devsweep
//!
//! Find and delete regenerable development directories such as
//! `node_modules`, `.next`, `dist` and `.cache`.
//!
//! ## Features
//!
//! - Concurrent scan with a bounded worker pool for size calculation
//! - Path validation before every filesystem mutation
//! - Symlinks are never followed, only removed as links
//! - Per-target deletion progress and a batch summary
//!
//! ## Usage
//!
//! ### Command Line
//!
//! ```bash
//! # Scan current directory
//! devsweep scan
//!
//! # Delete only node_modules directories larger than 100MB
//! devsweep clean --only node_modules --min-size 100MB
//!
//! # Dry run to see what would be deleted
//! devsweep clean --dry-run
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use devsweep_core::{CleanConfig, ScanConfig, TargetCleaner, TargetScanner};
//!
//! let scanner = TargetScanner::new(ScanConfig::default());
//! let report = scanner.scan(".")?;
//!
//! // dry run：只校验并统计，不删除任何文件
//! let config = CleanConfig {
//!     dry_run: true,
//!     ..Default::default()
//! };
//! let cleaner = TargetCleaner::new(&report.working_dir, config)?;
//! let targets = cleaner.validate_targets(&report.targets);
//! let result = cleaner.clean_targets(&targets);
//! println!("{} directories, {}", result.cleaned_targets, result.format_size());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export core functionality
pub use devsweep_core::*;

pub use devsweep_cli::{Settings, run_cli};
