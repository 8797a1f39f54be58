//! envbake - offline IBL baking tool
//!
//! Converts HDR environment maps (equirectangular or cubemap cross) into
//! prefiltered specular cubemaps, diffuse irradiance, SH coefficients,
//! DFG LUTs and KTX containers.

use anyhow::Result;
use clap::Parser;

use envbake::config::{Args, Config};
use envbake::pipeline;

fn main() -> Result<()> {
    let args = Args::parse();

    // --quiet keeps errors only; RUST_LOG still overrides either way
    let default_level = if args.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    let config = Config::from_args(args)?;
    pipeline::run(&config)?;
    Ok(())
}
