//! Taproot CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "taproot")]
#[command(about = "Symbol graph index and architecture metrics for a source tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root, or any directory inside it (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or incrementally update the index
    Index {
        /// Ignore the previous index and re-extract every file
        #[arg(short, long)]
        force: bool,
    },
    /// Show statistics for the committed index
    Status,
    /// Look up a symbol with its callers and callees
    Symbol {
        /// Bare or qualified name
        name: String,
    },
    /// Show a file's symbols and its imports / imported-by sets
    File {
        /// Project-relative path
        path: String,
    },
    /// Shortest dependency paths between two symbols
    Path {
        from: String,
        to: String,
        /// Number of paths (defaults to `metrics.k_paths`)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List dependency cycles at symbol and file level
    Cycles,
    /// Show the community partition with directory cohesion
    Communities,
    /// Show topological layers and upward violations
    Layers,
    /// Rank symbols by fan-in / fan-out
    Fan {
        #[arg(short, long, value_enum, default_value = "total")]
        mode: FanArg,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Remove the index state
    Clear,
    /// Show version
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum FanArg {
    In,
    Out,
    Total,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("taproot={}", log_level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root = taproot_core::find_project_root(&cli.root);
    tracing::debug!("Project root: {}", root.display());

    match cli.command {
        Commands::Index { force } => commands::index(&root, force, cli.verbose),
        Commands::Status => commands::status(&root),
        Commands::Symbol { name } => commands::symbol(&root, &name),
        Commands::File { path } => commands::file(&root, &path),
        Commands::Path { from, to, k } => commands::path(&root, &from, &to, k),
        Commands::Cycles => commands::cycles(&root),
        Commands::Communities => commands::communities(&root),
        Commands::Layers => commands::layers(&root),
        Commands::Fan { mode, limit } => {
            let mode = match mode {
                FanArg::In => taproot_core::FanMode::In,
                FanArg::Out => taproot_core::FanMode::Out,
                FanArg::Total => taproot_core::FanMode::Total,
            };
            commands::fan(&root, mode, limit)
        }
        Commands::Clear => commands::clear(&root),
        Commands::Version => {
            println!("Taproot v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
