//! Check command - validate configuration and entries

use std::path::Path;

use color_eyre::eyre::{Result, bail};
use prestatic_generator::{Builder, Severity};

use super::load_config;

/// Run the check command.
///
/// Reads and walks every entry without compiling or writing. Errors always
/// fail the check; warnings fail it in strict mode.
pub fn run(config_path: &Path, root: &Path, strict: bool) -> Result<()> {
    tracing::info!(?config_path, ?root, strict, "Checking configuration and entries");

    println!("Checking configuration...");
    let config = match load_config(config_path) {
        Ok(config) => {
            println!("  ✓ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ✗ Configuration invalid: {e:#}");
            return Err(e);
        }
    };

    println!("\nChecking entries...");
    let report = Builder::new(config, root).check();

    let errors = report.count(Severity::Error);
    let warnings = report.count(Severity::Warning);

    println!();
    println!("Summary:");
    println!("  Entries:  {}", report.entries);
    println!("  Errors:   {errors}");
    println!("  Warnings: {warnings}");

    if !report.issues.is_empty() {
        println!();
        for issue in &report.issues {
            let mark = match issue.severity {
                Severity::Error => '✗',
                Severity::Warning => '⚠',
            };
            println!("  {mark} {issue}");
        }
    }

    if errors > 0 {
        bail!("Validation failed with {errors} error(s)");
    }

    if strict && warnings > 0 {
        bail!("Validation failed with {warnings} warning(s) (strict mode)");
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}
