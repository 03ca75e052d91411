use anyhow::Result;

use crate::file_parsers::FileParser;

pub mod parser;
pub mod types;
use parser::parse_header;
use types::BundleHeader;

pub struct BundleHeaderParser;

impl FileParser for BundleHeaderParser {
    type Output = BundleHeader;

    fn parse(&self, bytes: &[u8]) -> Result<Self::Output> {
        parse_header(bytes)
    }
}
