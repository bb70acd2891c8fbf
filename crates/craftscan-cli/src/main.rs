//! # Craftscan
//!
//! Command-line front end for the craftscan engine:
//! - `scan`: which catalog entries a pool of items can produce
//! - `index`: build and persist recipe indexes
//! - `config`: write a default service configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod app;
mod recipe_loader;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("craftscan=info".parse()?))
        .init();

    debug!("craftscan {}", env!("CARGO_PKG_VERSION"));
    app::run(app::Cli::parse())
}
