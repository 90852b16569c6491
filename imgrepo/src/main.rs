use std::{
    path::PathBuf,
    sync::LazyLock,
    time::{Duration, Instant},
};

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, Level};

use imgrepo::{
    types::{DEFAULT_BASE_URL, DEFAULT_REPO_DIR, DEFAULT_REPO_NAME},
    BuildOptions, Pipeline,
};
use imgrepo_spec::{logging::setup_logging, resolve::DEFAULT_SPECS_DIR, RepoFormat};

static CHECK_MARK: LazyLock<colored::ColoredString> = LazyLock::new(|| "✔".bright_green().bold());
static CROSS_MARK: LazyLock<colored::ColoredString> = LazyLock::new(|| "〤".bright_red().bold());
static WARN: LazyLock<colored::ColoredString> = LazyLock::new(|| "⚠️".bright_yellow().bold());

#[derive(Parser)]
#[command(name = "imgrepo")]
#[command(about = "Build qcow2 images from spec files and publish them as a lago / virt-builder repository", long_about = None)]
#[command(version)]
struct Cli {
    /// Metadata to generate; also selects the props specs must define
    #[arg(short = 'f', long, value_enum, default_value_t = RepoFormat::All)]
    repo_format: RepoFormat,

    /// Spec file or directory of spec files (repeatable)
    #[arg(short, long = "specs", default_value = DEFAULT_SPECS_DIR)]
    specs: Vec<PathBuf>,

    /// Directory the repository is generated in
    #[arg(short = 'o', long, default_value = DEFAULT_REPO_DIR)]
    repo_dir: PathBuf,

    /// Base URL the repository is served from
    #[arg(long, env = "IMGREPO_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Repository name, used by lago metadata
    #[arg(long, env = "IMGREPO_NAME", default_value = DEFAULT_REPO_NAME)]
    repo_name: String,

    /// Only regenerate repo.metadata and index from the images already built
    #[arg(long)]
    create_repo_only: bool,

    /// xz-compress the images
    #[arg(long)]
    compress: bool,

    /// Timeout in seconds for each external tool (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// Images built concurrently within a batch (0 = one per CPU)
    #[arg(short, long, default_value = "1")]
    jobs: usize,

    /// Keep build scratch directories
    #[arg(short, long)]
    keep: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, Level::INFO);

    println!("imgrepo v{}", env!("CARGO_PKG_VERSION"));

    let options = BuildOptions {
        repo_dir: cli.repo_dir,
        repo_format: cli.repo_format,
        repo_name: cli.repo_name,
        base_url: cli.base_url,
        compress: cli.compress,
        timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
        jobs: cli.jobs,
        keep_work: cli.keep,
    };
    let pipeline = Pipeline::new(options);
    let now = Instant::now();

    if cli.create_repo_only {
        match pipeline.regenerate() {
            Ok(documents) => {
                println!(
                    "[{}] Repository regenerated with {} image(s)",
                    &*CHECK_MARK,
                    documents.metadata.len()
                );
            }
            Err(err) => {
                eprintln!("[{}] {}", &*CROSS_MARK, err);
                std::process::exit(1);
            }
        }
        return;
    }

    let report = match pipeline.run(&cli.specs).await {
        Ok(report) => report,
        Err(err) => {
            error!("{}", err);
            eprintln!("[{}] {}", &*CROSS_MARK, err);
            std::process::exit(1);
        }
    };

    for built in &report.built {
        println!("[{}] {}", &*CHECK_MARK, built.path.display());
    }
    for (id, err) in &report.failed {
        eprintln!("[{}] {}: {}", &*CROSS_MARK, id, err);
    }
    for id in &report.skipped {
        eprintln!("[{}] {}: skipped", &*WARN, id);
    }
    if let Some(documents) = &report.documents {
        info!(
            "Repository {} lists {} image(s)",
            pipeline.options().repo_name,
            documents.metadata.len()
        );
    }

    println!();
    println!(
        "[{}] {} images built successfully",
        "+".bright_blue().bold(),
        report.built.len(),
    );
    println!(
        "[{}] {} images failed to build",
        "+".bright_blue().bold(),
        report.failed.len(),
    );
    println!(
        "[{}] Processed {}/{} spec(s) in {:#?}",
        "+".bright_blue().bold(),
        report.built.len() + report.failed.len(),
        report.built.len() + report.failed.len() + report.skipped.len(),
        now.elapsed()
    );

    if !report.is_success() {
        std::process::exit(1);
    }
}
