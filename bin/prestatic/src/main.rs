//! Prestatic CLI
//!
//! Compiles content entries into importable ES modules.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for prestatic.
#[derive(Parser)]
#[command(
    name = "prestatic",
    version,
    about = "Incremental content-to-module compiler"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "prestatic.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Compile every collection and singleton
    Build {
        /// Output directory, overriding `build.output_dir`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Project root that storage paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Remove the output directory before building
        #[arg(long)]
        clean: bool,
    },
    /// Validate configuration and entries without writing anything
    Check {
        /// Project root that storage paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
    /// Build, then rebuild whenever an entry changes
    Watch {
        /// Project root that storage paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    prestatic::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            output,
            root,
            clean,
        } => {
            prestatic::cmd::build::run(&cli.config, &root, output.as_deref(), clean)?;
        }
        Commands::Check { root, strict } => {
            prestatic::cmd::check::run(&cli.config, &root, strict)?;
        }
        Commands::Watch { root } => {
            prestatic::cmd::watch::run(&cli.config, &root).await?;
        }
    }

    Ok(())
}
