//! Command implementations.

pub mod build;
pub mod check;
pub mod watch;

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use prestatic_core::Config;
use prestatic_generator::BuildStats;

/// Load the configuration at `path`, applying `PRESTATIC__*` overrides.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        color_eyre::eyre::bail!("Configuration file not found: {}", path.display());
    }
    Config::load_with_env(path).wrap_err("Failed to load configuration")
}

/// Print per-scope build counts.
pub fn print_build_stats(stats: &BuildStats) {
    println!();
    println!("  Build Statistics:");
    println!("  ─────────────────────────────────────────────");
    for (kind, name, scope) in stats.scopes() {
        println!(
            "  {kind:<10} {name:<16} {:>5} entries, {:>5} compiled",
            scope.entries, scope.compiled
        );
        if scope.pruned > 0 {
            println!("  {:<27} {:>5} pruned", "", scope.pruned);
        }
    }
    println!("  ─────────────────────────────────────────────");
    println!("  Entries:    {:>6}", stats.total_entries());
    println!("  Compiled:   {:>6}", stats.total_compiled());
    println!("  Writes:     {:>6}", stats.writes);
    println!("  Duration:   {:>6}ms", stats.duration_ms);
    println!();
}
