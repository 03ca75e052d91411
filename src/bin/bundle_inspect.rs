use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{ArgGroup, Parser};
use poe_bundle_inspect::{
    bundle_loader::BundleSource,
    commands::{
        inspect::{inspect, InspectOptions},
        Patch,
    },
    VERBOSE,
};
use url::Url;

/// Prints the header of a PoE bundle file, along with a query string for a decompression
/// service pointing at its first block.
#[derive(Parser, Debug)]
#[command(
    name = "bundle_inspect",
    group(
        ArgGroup::new("source")
        .args(&["url", "patch", "file"])
        .required(false) // Falls back to the default bundle
        .multiple(false) // Only one can be used at a time
    )
)]
#[clap(version)]
struct Cli {
    /// Full URL of the bundle to fetch
    #[arg(long)]
    url: Option<Url>,

    /// Patch version to fetch the bundle from (1, 2, or specific_patch)
    #[arg(short, long, requires = "bundle")]
    patch: Option<Patch>,

    /// Bundle path under Bundles2, eg. Metadata/Shrines
    #[arg(short, long, requires = "patch")]
    bundle: Option<String>,

    /// Read the bundle from disk instead
    #[arg(long)]
    file: Option<PathBuf>,

    /// Uncompressed size the bundle is expected to have
    #[arg(long, default_value_t = 5012)]
    expected: u32,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Verbose printing of the raw header and block sizes
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug)]
struct Args {
    source: BundleSource,
    options: InspectOptions,
    verbose: bool,
}

/// Validates user input and constructs a valid input state
fn parse_args() -> Result<Args> {
    let cli = Cli::parse();

    let source = match (cli.url, cli.patch, cli.file) {
        (Some(url), _, _) => BundleSource::Url(url),
        (_, Some(patch), _) => BundleSource::Patch {
            version: patch.version().to_string(),
            bundle: cli.bundle.context("A bundle path is needed with --patch")?,
        },
        (_, _, Some(file)) => {
            ensure!(file.exists(), "Bundle file doesn't exist");
            BundleSource::File(file)
        }
        _ => BundleSource::default(),
    };

    Ok(Args {
        source,
        options: InspectOptions {
            expected_size: cli.expected,
            json: cli.json,
        },
        verbose: cli.verbose,
    })
}

fn main() -> Result<()> {
    let args = parse_args()?;
    VERBOSE.set(args.verbose).unwrap();

    inspect(&args.source, &args.options).context("Inspect command failed")
}
