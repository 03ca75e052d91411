use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use url::{form_urlencoded, Url};

use crate::{
    bundle_loader::{report_status, BundleSource, FetchedBundle},
    file_parsers::{
        bundle_header::{parser::block_sizes, types::HeaderSummary, BundleHeaderParser},
        FileParser,
    },
    VERBOSE,
};

#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Uncompressed size the bundle is expected to have
    pub expected_size: u32,
    /// Print the report as JSON instead of plain lines
    pub json: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            expected_size: 5012,
            json: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    status: u16,
    url: &'a str,
    expected_size: u32,
    #[serde(flatten)]
    summary: &'a HeaderSummary,
    query: String,
}

/// Query string for the decompression service, pointing it at the first block
pub fn decompress_query(url: &Url, summary: &HeaderSummary) -> String {
    let pairs = form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url.as_str())
        .append_pair("offset", &summary.block_array_end_offset.to_string())
        .append_pair("compressed", &summary.first_block_size.to_string())
        .append_pair("extracted", &summary.uncompressed_size.to_string())
        .finish();

    format!("?{pairs}")
}

/// Write the derived header values. The JSON report carries the status itself, the plain
/// report leaves it to [report_status]
pub fn write_report(
    out: &mut impl Write,
    status: StatusCode,
    url: &Url,
    summary: &HeaderSummary,
    options: &InspectOptions,
) -> Result<()> {
    let query = decompress_query(url, summary);

    if options.json {
        let report = Report {
            status: status.as_u16(),
            url: url.as_str(),
            expected_size: options.expected_size,
            summary,
            query,
        };
        serde_json::to_writer_pretty(&mut *out, &report).context("Failed to serialise report")?;
        writeln!(out)?;

        return Ok(());
    }

    writeln!(
        out,
        "expected {} actual {}",
        options.expected_size, summary.uncompressed_size
    )?;
    writeln!(out, "compressed size {}", summary.total_payload_size)?;
    writeln!(out, "head size {}", summary.head_payload_size)?;
    writeln!(out, "block count {}", summary.block_count)?;
    writeln!(out, "first block size {}", summary.first_block_size)?;
    writeln!(out, "{}", query)?;

    Ok(())
}

/// Report on an already fetched bundle. In plain mode the status line comes first, parsing
/// goes ahead whatever the status was.
pub fn inspect_bundle(
    out: &mut impl Write,
    bundle: &FetchedBundle,
    options: &InspectOptions,
) -> Result<HeaderSummary> {
    if options.json {
        // Keep stdout valid JSON, the status goes in the report
        if bundle.status != StatusCode::OK {
            eprintln!("WARN: Response status {}", bundle.status.as_u16());
        }
    } else {
        report_status(bundle.status, out)?;
    }

    let header = BundleHeaderParser.parse(&bundle.bytes)?;
    let summary = header.summary()?;

    // Only needed for diagnostics, so a short buffer isn't fatal here
    let sizes = block_sizes(&bundle.bytes, &header);

    if *VERBOSE.get().unwrap_or(&false) {
        eprintln!("{:#?}", header);
        match &sizes {
            Ok(sizes) => eprintln!("Block sizes: {:?}", sizes),
            Err(e) => eprintln!("Block sizes unavailable: {:?}", e),
        }
    }

    header
        .anomalies(sizes.as_deref().ok())
        .iter()
        .for_each(|a| eprintln!("WARN: {a}"));

    write_report(out, bundle.status, &bundle.url, &summary, options)
        .context("Failed to write report")?;

    Ok(summary)
}

/// Fetch a bundle and print its header report to stdout
pub fn inspect(source: &BundleSource, options: &InspectOptions) -> Result<()> {
    let bundle = source.load().context("Failed to load bundle")?;

    let mut stdout = BufWriter::new(io::stdout().lock());
    let result = inspect_bundle(&mut stdout, &bundle, options);

    // Flush whatever was written before an error, the status line in particular
    stdout.flush().context("Failed to flush stdout")?;

    result.map(|_| ())
}
