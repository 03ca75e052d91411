use std::{
    fs,
    io::{Read, Write},
    net::TcpStream,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use nom::{bytes::complete::take, multi::count, number::complete::le_u8, IResult};
use reqwest::{blocking::Client, StatusCode};
use url::Url;

/// Bundle inspected when nothing else is asked for. Its uncompressed size is known to be 5012
pub const DEFAULT_BUNDLE_URL: &str =
    "https://patch.poecdn.com/3.25.3.4/Bundles2/Metadata/Shrines.bundle.bin";

/// Where the bundle bytes come from
#[derive(Debug, Clone)]
pub enum BundleSource {
    Url(Url),
    Patch { version: String, bundle: String },
    File(PathBuf),
}

impl Default for BundleSource {
    fn default() -> Self {
        Self::Url(Url::parse(DEFAULT_BUNDLE_URL).expect("Default bundle URL is valid"))
    }
}

/// Raw bundle contents, along with where they came from
#[derive(Debug)]
pub struct FetchedBundle {
    pub url: Url,
    pub status: StatusCode,
    pub bytes: Bytes,
}

impl BundleSource {
    /// Where the bundle lives. Local files are given as a file:// URL
    pub fn url(&self) -> Result<Url> {
        match self {
            Self::Url(url) => Ok(url.clone()),
            Self::Patch { version, bundle } => bundle_url(version, bundle),
            Self::File(path) => {
                let path = fs::canonicalize(path)
                    .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
                Url::from_file_path(&path)
                    .map_err(|_| anyhow!("Failed to convert path to URL: {}", path.display()))
            }
        }
    }

    /// Load the bundle contents. Files always come back with a 200 status
    pub fn load(&self) -> Result<FetchedBundle> {
        match self {
            Self::File(path) => Ok(FetchedBundle {
                url: self.url()?,
                status: StatusCode::OK,
                bytes: load_bundle_file(path)?,
            }),
            _ => fetch_bundle(&self.url()?),
        }
    }
}

/// Resolve the CDN root for a patch version
pub fn cdn_base_url(version: &str) -> Result<Url> {
    match version {
        // Latest PoE 1
        "1" => cur_url_poe(),
        // Latest PoE 2
        "2" => cur_url_poe2(),
        // Specific PoE 1 patch
        v if v.starts_with("3.") => Url::parse(&format!("https://patch.poecdn.com/{}/", v))
            .with_context(|| "Failed to parse URL"),
        // Specific PoE 2 patch
        v if v.starts_with("4.") => Url::parse(&format!("https://patch-poe2.poecdn.com/{}/", v))
            .with_context(|| "Failed to parse URL"),
        v => bail!("Invalid version provided: {v:?}"),
    }
    .with_context(|| format!("Failed to get URL for version: {}", version))
}

/// Full URL of a bundle under a patch's Bundles2 folder, eg. "Metadata/Shrines"
pub fn bundle_url(version: &str, bundle: &str) -> Result<Url> {
    let bundle = bundle.trim_start_matches('/');
    let stub = if bundle.ends_with(".bundle.bin") {
        format!("Bundles2/{bundle}")
    } else {
        format!("Bundles2/{bundle}.bundle.bin")
    };

    cdn_base_url(version)?
        .join(&stub)
        .with_context(|| format!("Failed to build bundle URL from {stub:?}"))
}

/// Fetch a bundle with a single GET. A non-200 status is not an error, the body is returned
/// regardless so the caller can decide what to do with it.
pub fn fetch_bundle(url: &Url) -> Result<FetchedBundle> {
    // Short timeout for initial connection, but none for transfer to allow for fetching large
    // files on a poor network connection
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(None)
        .build()?;

    fetch_bundle_with(&client, url)
}

pub fn fetch_bundle_with(client: &Client, url: &Url) -> Result<FetchedBundle> {
    eprintln!("Downloading file: {}", url);
    let response = client
        .get(url.clone())
        .send()
        .with_context(|| format!("Failed to request {url}"))?;

    let status = response.status();
    let bytes = response.bytes().context("Failed to read response body")?;

    if *crate::VERBOSE.get().unwrap_or(&false) {
        eprintln!("Received {} bytes with status {}", bytes.len(), status);
    }

    Ok(FetchedBundle {
        url: url.clone(),
        status,
        bytes,
    })
}

/// Print the status code if it isn't 200
pub fn report_status(status: StatusCode, out: &mut impl Write) -> Result<()> {
    if status != StatusCode::OK {
        writeln!(out, "{}", status.as_u16()).context("Failed to write status")?;
    }

    Ok(())
}

/// Read a bundle from disk
pub fn load_bundle_file(path: &Path) -> Result<Bytes> {
    let contents = fs::read(path)
        .with_context(|| format!("Failed to read bundle file: {}", path.display()))?;

    Ok(Bytes::from(contents))
}

fn cur_url_poe() -> Result<Url> {
    cur_url("patch.pathofexile.com:12995", &[1, 6])
}
fn cur_url_poe2() -> Result<Url> {
    cur_url("patch.pathofexile2.com:13060", &[1, 7])
}

fn parse_response(input: &[u8]) -> IResult<&[u8], Vec<String>> {
    let (input, num_strings) = le_u8(input)?; // Parse the number of strings (N)
    let (input, _) = take(33usize)(input)?; // Discard the next 33 bytes (padding)
    count(parse_utf16_string, num_strings as usize)(input) // Parse N strings
}

fn parse_utf16_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, len) = le_u8(input)?; // Parse string length (L)
    let (input, utf16_bytes) = take(len as usize * 2)(input)?; // Extract L * 2 bytes of UTF-16 data
    let utf16_words: Vec<u16> = utf16_bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    Ok((input, String::from_utf16_lossy(&utf16_words)))
}

/// Ask the patch server for the CDN root of the current patch
fn cur_url(host: &str, send: &[u8]) -> Result<Url> {
    // The reply is small, a single read is enough
    let mut stream =
        TcpStream::connect(host).with_context(|| format!("Failed to connect to {host}"))?;
    stream.write_all(send)?;
    let mut buf = [0; 1024];
    let read = stream.read(&mut buf)?;

    let Ok((_, strings)) = parse_response(&buf[..read]) else {
        bail!("Failed to parse URLs from CDN")
    };

    // Grab the first one and return it as a URL
    let first = strings
        .into_iter()
        .next()
        .with_context(|| "No URLs returned from CDN")?;

    Url::parse(&first).with_context(|| format!("Failed to parse URL: {first:?}"))
}
