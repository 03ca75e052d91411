use std::fmt::Display;

use anyhow::{ensure, Result};
use serde::Serialize;

/// Size of the fixed part of the header, i.e. where the block size array starts
pub const HEADER_SIZE: u64 = 60;

/// Encoded as a u32
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstFileEncode {
    Kraken6,    // 8
    MermaidA,   // 9
    Bitknit,    // 12
    LeviathanC, // 13
    Unknown(u32),
}

impl From<u32> for FirstFileEncode {
    fn from(value: u32) -> Self {
        use FirstFileEncode::*;
        match value {
            8 => Kraken6,
            9 => MermaidA,
            12 => Bitknit,
            13 => LeviathanC,
            x => Unknown(x),
        }
    }
}

/// Raw view of the fixed-offset bundle header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub uncompressed_size: u32,
    pub total_payload_size: u32,
    pub head_payload_size: u32,
    pub first_file_encode: FirstFileEncode,
    pub unk10: u32,
    pub uncompressed_size2: u64,
    pub total_payload_size2: u64,
    /// As declared in the file. Not trusted, see [BundleHeader::computed_block_count]
    pub block_count: u32,
    pub uncompressed_block_granularity: u32,
    pub unk28: [u32; 4],
    /// First entry of the block size array, read even if no blocks are expected
    pub first_block_size: u32,
}

impl BundleHeader {
    /// Number of blocks needed to hold the uncompressed data at the header's granularity
    pub fn computed_block_count(&self) -> Result<u32> {
        let granularity = self.uncompressed_block_granularity;
        ensure!(granularity != 0, "Granularity is zero");

        Ok(self.uncompressed_size.div_ceil(granularity))
    }

    /// Offset of the first byte after the block size array, where compressed data begins
    pub fn block_array_end_offset(&self) -> Result<u64> {
        Ok(HEADER_SIZE + 4 * self.computed_block_count()? as u64)
    }

    pub fn summary(&self) -> Result<HeaderSummary> {
        Ok(HeaderSummary {
            uncompressed_size: self.uncompressed_size,
            total_payload_size: self.total_payload_size,
            head_payload_size: self.head_payload_size,
            granularity: self.uncompressed_block_granularity,
            block_count: self.computed_block_count()?,
            first_block_size: self.first_block_size,
            block_array_end_offset: self.block_array_end_offset()?,
        })
    }

    /// Inconsistencies between redundant header fields
    pub fn anomalies(&self, block_sizes: Option<&[u32]>) -> Vec<Anomaly> {
        let mut anomalies = vec![];

        if let Ok(computed) = self.computed_block_count() {
            if computed != self.block_count {
                anomalies.push(Anomaly::BlockCount {
                    declared: self.block_count,
                    computed,
                });
            }
        }

        if self.uncompressed_size as u64 != self.uncompressed_size2 {
            anomalies.push(Anomaly::UncompressedSize {
                narrow: self.uncompressed_size,
                wide: self.uncompressed_size2,
            });
        }

        if self.total_payload_size as u64 != self.total_payload_size2 {
            anomalies.push(Anomaly::TotalPayloadSize {
                narrow: self.total_payload_size,
                wide: self.total_payload_size2,
            });
        }

        if let Some(sizes) = block_sizes {
            let sum = sizes.iter().map(|&s| s as u64).sum::<u64>();
            if sum > self.total_payload_size as u64 {
                anomalies.push(Anomaly::BlockSizeSum {
                    sum,
                    total_payload_size: self.total_payload_size,
                });
            }
        }

        anomalies
    }
}

/// The values derived from a bundle header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderSummary {
    pub uncompressed_size: u32,
    pub total_payload_size: u32,
    pub head_payload_size: u32,
    pub granularity: u32,
    pub block_count: u32,
    pub first_block_size: u32,
    pub block_array_end_offset: u64,
}

/// A potential format anomaly. Reported, never fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    BlockCount { declared: u32, computed: u32 },
    UncompressedSize { narrow: u32, wide: u64 },
    TotalPayloadSize { narrow: u32, wide: u64 },
    BlockSizeSum { sum: u64, total_payload_size: u32 },
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Anomaly::*;
        match self {
            BlockCount { declared, computed } => write!(
                f,
                "Declared block count {declared} differs from computed block count {computed}"
            ),
            UncompressedSize { narrow, wide } => write!(
                f,
                "Uncompressed size {narrow} differs from its 64-bit copy {wide}"
            ),
            TotalPayloadSize { narrow, wide } => write!(
                f,
                "Total payload size {narrow} differs from its 64-bit copy {wide}"
            ),
            BlockSizeSum {
                sum,
                total_payload_size,
            } => write!(
                f,
                "Block sizes sum to {sum}, more than the total payload size {total_payload_size}"
            ),
        }
    }
}
