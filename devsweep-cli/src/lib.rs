use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use devsweep_core::{
    CleanResult, CleanupTarget, DeletePhase, DeleteProgress, ScanReport, TargetCleaner,
    TargetScanner, format_bytes,
};

pub mod settings;

pub use settings::Settings;

/// 扫描命令的参数配置
#[derive(Debug)]
struct ScanCommandArgs {
    path: PathBuf,
    max_depth: Option<usize>,
    workers: Option<usize>,
    sort_by_size: bool,
    json: bool,
}

/// 清理命令的参数配置
#[derive(Debug)]
struct CleanCommandArgs {
    path: PathBuf,
    max_depth: Option<usize>,
    workers: Option<usize>,
    only: Vec<String>,
    min_size: Option<String>,
    dry_run: bool,
    yes: bool,
    no_parallel: bool,
}

#[derive(Parser)]
#[command(name = "devsweep")]
#[command(about = "Find and delete regenerable development directories")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a directory for cleanup targets
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum depth to scan
        #[arg(short, long)]
        max_depth: Option<usize>,

        /// Number of size-calculation workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Sort by size (largest first)
        #[arg(short = 'S', long)]
        sort_by_size: bool,

        /// Print the scan result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scan a directory and delete cleanup targets
    Clean {
        /// Directory to scan and clean
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Maximum depth to scan
        #[arg(short, long)]
        max_depth: Option<usize>,

        /// Number of size-calculation workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Only delete directories with this name (can be specified multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        only: Vec<String>,

        /// Only delete directories at least this large (e.g. 500KB, 1GiB)
        #[arg(short = 's', long)]
        min_size: Option<String>,

        /// Dry run - show what would be deleted without deleting anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Delete targets one at a time
        #[arg(long)]
        no_parallel: bool,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(log_level))
        .with_writer(io::stderr)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            path,
            max_depth,
            workers,
            sort_by_size,
            json,
        } => handle_scan_command(
            &settings,
            ScanCommandArgs {
                path,
                max_depth,
                workers,
                sort_by_size,
                json,
            },
        ),
        Commands::Clean {
            path,
            max_depth,
            workers,
            only,
            min_size,
            dry_run,
            yes,
            no_parallel,
        } => handle_clean_command(
            &settings,
            CleanCommandArgs {
                path,
                max_depth,
                workers,
                only,
                min_size,
                dry_run,
                yes,
                no_parallel,
            },
        ),
    }
}

fn log_filter(level: &str) -> String {
    format!("devsweep={level},devsweep_core={level},devsweep_cli={level}")
}

fn scan(
    settings: &Settings,
    path: &Path,
    workers: Option<usize>,
    max_depth: Option<usize>,
) -> Result<ScanReport> {
    let scanner = TargetScanner::new(settings.scan_config(workers, max_depth));
    scanner
        .scan(path)
        .with_context(|| format!("failed to scan {}", path.display()))
}

fn handle_scan_command(settings: &Settings, args: ScanCommandArgs) -> Result<()> {
    let mut report = scan(settings, &args.path, args.workers, args.max_depth)?;

    if args.sort_by_size {
        report.targets = TargetScanner::sort_by_size(report.targets);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ScanSummary::from(&report))?);
        return Ok(());
    }

    display_targets(&report.targets, &report.working_dir);
    println!("Scan took {}", report.duration_string());
    Ok(())
}

fn handle_clean_command(settings: &Settings, args: CleanCommandArgs) -> Result<()> {
    // 使用未解析的原始路径，工作目录本身是符号链接时在扫描前失败
    let cleaner = TargetCleaner::new(
        &args.path,
        settings.clean_config(args.dry_run, args.no_parallel),
    )
    .with_context(|| format!("invalid working directory {}", args.path.display()))?;

    let report = scan(settings, cleaner.working_dir(), args.workers, args.max_depth)?;
    let targets = select_targets(report.targets, &args.only, args.min_size.as_deref())?;

    if targets.is_empty() {
        println!("No cleanup targets found.");
        return Ok(());
    }

    display_targets(&targets, &report.working_dir);

    // 预校验，显示被拒绝的目标
    let validation = cleaner.partition_targets(&targets);
    if !validation.rejected.is_empty() {
        println!("\nSkipping {} rejected paths:", validation.rejected.len());
        for rejection in &validation.rejected {
            println!("  - {}", rejection.error);
        }
    }

    let targets = validation.accepted;
    if targets.is_empty() {
        println!("Nothing left to delete.");
        return Ok(());
    }

    // 确认删除
    if !args.yes && !args.dry_run && !confirm_clean(&targets)? {
        println!("Cleaning cancelled.");
        return Ok(());
    }

    let base = report.working_dir.as_path();
    let result = cleaner.clean_targets_with_progress(&targets, |progress| {
        if let Some(line) = progress_line(&progress, base) {
            println!("{line}");
        }
    });

    display_clean_result(&result, args.dry_run);

    Ok(())
}

/// 按名称和最小大小选择目标
fn select_targets(
    targets: Vec<CleanupTarget>,
    only: &[String],
    min_size: Option<&str>,
) -> Result<Vec<CleanupTarget>> {
    let mut targets = TargetScanner::filter_by_names(targets, only);

    if let Some(size_str) = min_size {
        let min_size = parse_size_string(size_str)?;
        targets.retain(|t| t.size >= min_size);
    }

    for target in &mut targets {
        target.selected = true;
    }

    Ok(targets)
}

/// 解析大小字符串（如 "500KB"、"1GiB"）
pub fn parse_size_string(size_str: &str) -> Result<u64> {
    let size_str = size_str.trim().to_uppercase();

    // 提取数字部分和单位部分
    let (number_part, unit_part) = match size_str.find(|c: char| c.is_alphabetic()) {
        Some(pos) => size_str.split_at(pos),
        None => (size_str.as_str(), ""),
    };

    let number: f64 = number_part
        .trim()
        .parse()
        .with_context(|| format!("invalid number: {number_part}"))?;

    if number < 0.0 {
        bail!("size cannot be negative: {size_str}");
    }

    let multiplier: u64 = match unit_part {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_024 * 1_024,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_024 * 1_024 * 1_024,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_024_u64.pow(4),
        _ => bail!("unsupported unit: {unit_part}"),
    };

    Ok((number * multiplier as f64) as u64)
}

/// 删除进度对应的状态行，非终态返回 None
fn progress_line(progress: &DeleteProgress, base: &Path) -> Option<String> {
    let path = progress
        .target_path
        .strip_prefix(base)
        .unwrap_or(&progress.target_path)
        .display();

    if !progress.phase.is_terminal() {
        return None;
    }

    Some(match (progress.phase, &progress.error) {
        (DeletePhase::Done, _) => format!("  ✓ {path}"),
        (DeletePhase::Skipped, _) => format!("  - {path}: skipped"),
        (_, Some(error)) => format!("  ✗ {path}: {error}"),
        (_, None) => format!("  ! {path}: some entries could not be removed"),
    })
}

/// JSON 输出格式
#[derive(Debug, Serialize)]
struct ScanSummary<'a> {
    working_dir: &'a Path,
    targets: &'a [CleanupTarget],
    total_size: u64,
    duration_ms: u64,
    dropped: usize,
}

impl<'a> From<&'a ScanReport> for ScanSummary<'a> {
    fn from(report: &'a ScanReport) -> Self {
        Self {
            working_dir: &report.working_dir,
            targets: &report.targets,
            total_size: report.total_size(),
            duration_ms: report.duration.as_millis() as u64,
            dropped: report.dropped,
        }
    }
}

fn display_targets(targets: &[CleanupTarget], base_path: &Path) {
    if targets.is_empty() {
        println!("No cleanup targets found.");
        return;
    }

    let total_size: u64 = targets.iter().map(|t| t.size).sum();

    println!("\nFound {} cleanup targets:", targets.len());
    println!("{:<30} {:<12} {:<40}", "Category", "Size", "Path");
    println!("{}", "-".repeat(82));

    for target in targets {
        println!(
            "{:<30} {:<12} {:<40}",
            target.category,
            target.formatted_size(),
            target.relative_path(base_path).display()
        );
    }

    println!("{}", "-".repeat(82));
    println!("Total size: {}", format_bytes(total_size));
}

fn confirm_clean(targets: &[CleanupTarget]) -> Result<bool> {
    let total_size: u64 = targets.iter().map(|t| t.size).sum();

    print!(
        "\nThis will delete {} directories and free up {}. Continue? [y/N]: ",
        targets.len(),
        format_bytes(total_size)
    );

    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_confirmation(&input))
}

fn is_confirmation(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

fn summary_line(result: &CleanResult, dry_run: bool) -> String {
    let verb = if dry_run { "would delete" } else { "deleted" };
    format!(
        "{verb} {} directories • {} freed",
        result.cleaned_targets,
        result.format_size()
    )
}

fn display_clean_result(result: &CleanResult, dry_run: bool) {
    println!("\n{}", summary_line(result, dry_run));

    if !result.failed_targets.is_empty() {
        println!("\nFailed to delete {} targets:", result.failed_targets.len());
        for failure in &result.failed_targets {
            println!("  - {}: {}", failure.path, failure.reason);
        }
    }

    if !result.skipped_targets.is_empty() {
        println!("\nSkipped {} targets.", result.skipped_targets.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parse_scan_command() {
        let args = vec!["devsweep", "scan", "/tmp", "--max-depth", "3", "--json"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Scan {
                path,
                max_depth,
                json,
                sort_by_size,
                ..
            } => {
                assert_eq!(path, PathBuf::from("/tmp"));
                assert_eq!(max_depth, Some(3));
                assert!(json);
                assert!(!sort_by_size);
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_parse_clean_command() {
        let args = vec![
            "devsweep",
            "clean",
            "/tmp",
            "--only",
            "node_modules",
            "--only",
            ".next",
            "--min-size",
            "10MB",
            "--dry-run",
            "--yes",
            "--config",
            "/etc/devsweep.toml",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/devsweep.toml")));

        match cli.command {
            Commands::Clean {
                path,
                only,
                min_size,
                dry_run,
                yes,
                no_parallel,
                ..
            } => {
                assert_eq!(path, PathBuf::from("/tmp"));
                assert_eq!(only, vec!["node_modules".to_string(), ".next".to_string()]);
                assert_eq!(min_size.as_deref(), Some("10MB"));
                assert!(dry_run);
                assert!(yes);
                assert!(!no_parallel);
            }
            _ => panic!("Expected Clean command"),
        }
    }

    #[test]
    fn test_cli_default_path() {
        let cli = Cli::try_parse_from(["devsweep", "-v", "clean"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Clean { path, .. } => assert_eq!(path, PathBuf::from(".")),
            _ => panic!("Expected Clean command"),
        }
    }

    #[test]
    fn test_parse_size_string() {
        assert_eq!(parse_size_string("100").unwrap(), 100);
        assert_eq!(parse_size_string("500KB").unwrap(), 500_000);
        assert_eq!(parse_size_string("1KiB").unwrap(), 1_024);
        assert_eq!(parse_size_string("10mb").unwrap(), 10_000_000);
        assert_eq!(parse_size_string("1GiB").unwrap(), 1_073_741_824);
        assert_eq!(parse_size_string("1.5 G").unwrap(), 1_500_000_000);

        assert!(parse_size_string("invalid").is_err());
        assert!(parse_size_string("10XB").is_err());
        assert!(parse_size_string("-1MB").is_err());
    }

    fn target(path: &str, size: u64) -> CleanupTarget {
        let path = PathBuf::from(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        CleanupTarget {
            category: devsweep_core::catalog::category_or_unknown(&name).to_string(),
            path,
            name,
            size,
            selected: false,
        }
    }

    #[test]
    fn test_select_targets() {
        let targets = vec![
            target("/w/a/node_modules", 50_000),
            target("/w/b/node_modules", 500),
            target("/w/a/dist", 80_000),
        ];

        let all = select_targets(targets.clone(), &[], None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|t| t.selected));

        let selected =
            select_targets(targets.clone(), &["node_modules".to_string()], Some("1KB")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path, PathBuf::from("/w/a/node_modules"));

        assert!(select_targets(targets, &[], Some("big")).is_err());
    }

    #[test]
    fn test_progress_line() {
        let base = Path::new("/w");
        let mut progress = DeleteProgress {
            target_path: PathBuf::from("/w/app/node_modules"),
            target_name: "node_modules".to_string(),
            phase: DeletePhase::Removing,
            entries_removed: 0,
            error: None,
        };
        assert_eq!(progress_line(&progress, base), None);

        progress.phase = DeletePhase::Done;
        assert_eq!(
            progress_line(&progress, base).as_deref(),
            Some("  ✓ app/node_modules")
        );

        progress.phase = DeletePhase::PartialFailure;
        progress.error = Some("directory does not exist".to_string());
        assert_eq!(
            progress_line(&progress, base).as_deref(),
            Some("  ✗ app/node_modules: directory does not exist")
        );

        progress.phase = DeletePhase::Skipped;
        progress.error = None;
        assert_eq!(
            progress_line(&progress, base).as_deref(),
            Some("  - app/node_modules: skipped")
        );
    }

    #[test]
    fn test_summary_line() {
        let mut result = CleanResult::new();
        result.add_success(4096);
        result.add_success(8192);

        assert_eq!(summary_line(&result, false), "deleted 2 directories • 12.00 KB freed");
        assert_eq!(
            summary_line(&result, true),
            "would delete 2 directories • 12.00 KB freed"
        );
    }

    #[test]
    fn test_is_confirmation() {
        assert!(is_confirmation("y\n"));
        assert!(is_confirmation(" YES "));
        assert!(!is_confirmation("\n"));
        assert!(!is_confirmation("no"));
    }

    #[test]
    fn test_scan_summary_json() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("app").join("node_modules")).unwrap();
        fs::write(
            temp_dir.path().join("app").join("node_modules").join("a.js"),
            "1",
        )
        .unwrap();

        let report = scan(&Settings::default(), temp_dir.path(), Some(1), None).unwrap();
        let json = serde_json::to_value(ScanSummary::from(&report)).unwrap();

        assert_eq!(json["total_size"], 4096);
        assert_eq!(json["targets"][0]["name"], "node_modules");
        assert_eq!(json["dropped"], 0);
    }

    #[test]
    fn test_display_targets_empty() {
        let temp_dir = TempDir::new().unwrap();
        display_targets(&[], temp_dir.path());
    }

    fn clean_args(path: PathBuf) -> CleanCommandArgs {
        CleanCommandArgs {
            path,
            max_depth: None,
            workers: Some(1),
            only: Vec::new(),
            min_size: None,
            dry_run: false,
            yes: true,
            no_parallel: false,
        }
    }

    fn create_app(root: &Path) -> PathBuf {
        let modules = root.join("app").join("node_modules");
        fs::create_dir_all(&modules).unwrap();
        fs::write(modules.join("index.js"), "1").unwrap();
        modules
    }

    #[test]
    fn test_clean_command_deletes_targets() {
        let temp_dir = TempDir::new().unwrap();
        let modules = create_app(temp_dir.path());

        handle_clean_command(&Settings::default(), clean_args(temp_dir.path().to_path_buf()))
            .unwrap();

        assert!(!modules.exists());
        assert!(temp_dir.path().join("app").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_command_rejects_symlinked_working_dir() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real");
        let modules = create_app(&real);
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let err = handle_clean_command(&Settings::default(), clean_args(link))
            .expect_err("symlinked working directory must be rejected");

        let root_cause = err
            .downcast_ref::<devsweep_core::CleanError>()
            .expect("clean error");
        assert!(root_cause.is_security_violation());
        assert!(modules.join("index.js").exists());
    }
}
