//! Build command - compiles entries into modules

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use prestatic_generator::Builder;

use super::{load_config, print_build_stats};

/// Run the build command.
///
/// `output` overrides `build.output_dir`. With `clean`, the output root is
/// removed first so every entry is recompiled.
pub fn run(config_path: &Path, root: &Path, output: Option<&Path>, clean: bool) -> Result<()> {
    tracing::info!(?config_path, ?root, ?output, clean, "Starting build");

    let config = load_config(config_path)?;
    tracing::debug!(?config, "Loaded configuration");

    let mut builder = Builder::new(config, root);
    if let Some(output) = output {
        tracing::info!(output = %output.display(), "Overriding output directory from CLI");
        builder = builder.with_output_dir(output);
    }

    if clean {
        builder.clean().wrap_err("Failed to clean output directory")?;
    }

    let stats = builder.build().wrap_err("Build failed")?;

    print_build_stats(&stats);
    println!("  Output:     {}", builder.output_dir().display());
    println!();

    tracing::info!(?stats, "Build completed successfully");

    Ok(())
}
