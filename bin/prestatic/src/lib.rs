//! Prestatic CLI Library
//!
//! Command implementations used by the `prestatic` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, check, watch)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use prestatic::cmd;
//!
//! cmd::build::run(Path::new("prestatic.toml"), Path::new("."), None, false).unwrap();
//! ```

pub mod cmd;

pub use prestatic_core::Config;
pub use prestatic_generator::{BuildStats, Builder, CheckReport};

/// Install the global tracing subscriber.
///
/// `verbose` counts `-v` flags: none logs warnings, then info, debug and trace.
/// Directives in `RUST_LOG` are applied on top. Targets are shown from debug up.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbose >= 2))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
