use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Instant,
};

use clap::Parser;
use colored::Colorize;
use tracing::{debug, Level};

use imgrepo_spec::{
    depsolver::plan_builds,
    lint::{highlight_error_line, lint, Severity},
    logging::setup_logging,
    resolve::{resolve_spec_paths, DEFAULT_SPECS_DIR},
    ImageSpec, RepoFormat,
};

static CHECK_MARK: LazyLock<colored::ColoredString> = LazyLock::new(|| "✔".bright_green().bold());
static CROSS_MARK: LazyLock<colored::ColoredString> = LazyLock::new(|| "〤".bright_red().bold());
static WARN: LazyLock<colored::ColoredString> = LazyLock::new(|| "⚠️".bright_yellow().bold());

#[derive(Parser)]
#[command(name = "imgrepo-spec")]
#[command(about = "Linter for image spec files", long_about = None)]
#[command(version)]
struct Cli {
    /// Spec files or directories of spec files
    #[arg(default_value = DEFAULT_SPECS_DIR)]
    specs: Vec<PathBuf>,

    /// Repository format the specs must satisfy
    #[arg(short = 'f', long, value_enum, default_value_t = RepoFormat::All)]
    repo_format: RepoFormat,

    /// Print the build batches of the valid specs
    #[arg(long)]
    plan: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Lint a single file, printing its issues. Returns the spec when it has no
/// fatal issue.
fn lint_file(path: &Path, format: RepoFormat) -> Option<ImageSpec> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("[{}] {}: {}", &*CROSS_MARK, path.display(), err);
            return None;
        }
    };

    let spec = ImageSpec::parse(path, &content);
    let issues = lint(&spec, format);
    debug!("{}: {} issue(s)", path.display(), issues.len());

    for issue in &issues {
        let mark = match issue.severity {
            Severity::Error => &*CROSS_MARK,
            Severity::Warn => &*WARN,
        };
        eprintln!("[{}] {}: {}", mark, path.display(), issue.message);
        if issue.line_number > 0 {
            for line in highlight_error_line(&content, issue.line_number, issue.is_fatal()) {
                eprintln!("{}", line);
            }
            eprintln!();
        }
    }

    if issues.iter().any(|i| i.is_fatal()) {
        None
    } else {
        println!("[{}] {}", &*CHECK_MARK, path.display());
        Some(spec)
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, Level::WARN);

    println!("imgrepo-spec v{}", env!("CARGO_PKG_VERSION"));

    let now = Instant::now();
    let files = match resolve_spec_paths(&cli.specs) {
        Ok(files) => files,
        Err(err) => {
            eprintln!("[{}] {}", &*CROSS_MARK, err);
            std::process::exit(1);
        }
    };

    let valid: Vec<ImageSpec> = files
        .iter()
        .filter_map(|path| lint_file(path, cli.repo_format))
        .collect();
    let failed = files.len() - valid.len();

    let mut plan_failed = false;
    if cli.plan {
        match plan_builds(valid.clone()) {
            Ok(batches) => {
                println!();
                for (idx, batch) in batches.iter().enumerate() {
                    let ids: Vec<&str> = batch.iter().map(|s| s.id.as_str()).collect();
                    println!("Batch {}: {}", idx + 1, ids.join(", "));
                }
            }
            Err(err) => {
                eprintln!("[{}] {}", &*CROSS_MARK, err);
                plan_failed = true;
            }
        }
    }

    println!();
    println!(
        "[{}] {} files validated successfully",
        "+".bright_blue().bold(),
        valid.len(),
    );
    println!(
        "[{}] {} files failed to pass validation",
        "+".bright_blue().bold(),
        failed,
    );
    println!(
        "[{}] Evaluated {} file(s) in {:#?}",
        "+".bright_blue().bold(),
        files.len(),
        now.elapsed()
    );

    if failed > 0 || plan_failed {
        std::process::exit(1);
    }
}
