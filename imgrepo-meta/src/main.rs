//! imgrepo-meta CLI
//!
//! Regenerates repository metadata from image sidecars and hashes images.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use imgrepo_meta::{
    builder::generate_from_sidecars, checksum::compute_checksums, RepoConfig, Result,
};

#[derive(Parser)]
#[command(name = "imgrepo-meta")]
#[command(about = "Metadata generator for qcow2 image repositories", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate repo.metadata and index from the image sidecars in a repo
    Generate {
        /// Repository directory holding images and their .metadata sidecars
        #[arg(short, long, default_value = "image-repo")]
        repo_dir: PathBuf,

        /// Output directory for the documents (defaults to the repo directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Repository name, used by lago metadata
        #[arg(long, env = "IMGREPO_NAME", default_value = "test")]
        repo_name: String,

        /// Base URL the repository is served from
        #[arg(long, env = "IMGREPO_BASE_URL", default_value = "http://127.0.0.1:8181")]
        base_url: String,

        /// Number of images hashed in parallel (0 = one per CPU)
        #[arg(short, long, default_value = "1")]
        jobs: usize,
    },

    /// Compute checksums of an image
    Hash {
        /// Path to the image
        image: PathBuf,

        /// Print SHA-256 instead of SHA-512
        #[arg(long)]
        sha256: bool,
    },
}

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match cli.command {
        Commands::Generate {
            repo_dir,
            output,
            repo_name,
            base_url,
            jobs,
        } => cmd_generate(repo_dir, output, repo_name, base_url, jobs),

        Commands::Hash { image, sha256 } => cmd_hash(image, sha256),
    }
}

fn cmd_generate(
    repo_dir: PathBuf,
    output: Option<PathBuf>,
    repo_name: String,
    base_url: String,
    jobs: usize,
) -> Result<()> {
    let output_dir = output.unwrap_or_else(|| repo_dir.clone());
    let config = RepoConfig::new(repo_name, &base_url, output_dir)?;

    info!(
        "Generating metadata for repo {} ({})",
        config.repo_name, config.base_url
    );
    let documents = generate_from_sidecars(config, &repo_dir, jobs)?;

    for (name, version, entry) in documents.metadata.entries() {
        info!("{} {} -> {}", name, version, entry.url);
    }
    Ok(())
}

fn cmd_hash(image: PathBuf, sha256: bool) -> Result<()> {
    let checksums = compute_checksums(&image)?;

    let hash = if sha256 {
        checksums.sha256
    } else {
        checksums.sha512
    };

    println!("{}", hash);
    Ok(())
}
