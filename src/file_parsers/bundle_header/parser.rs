use anyhow::{anyhow, Result};
use nom::{
    bytes::complete::take,
    combinator::peek,
    multi::count,
    number::complete::{le_u32, le_u64},
    sequence::tuple,
    IResult,
};

use super::types::*;

fn unk28(input: &[u8]) -> IResult<&[u8], [u32; 4]> {
    let (input, (a, b, c, d)) = tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    Ok((input, [a, b, c, d]))
}

// Parser for the fixed header, leaves the input at the start of the block size array
fn head(input: &[u8]) -> IResult<&[u8], BundleHeader> {
    let (input, uncompressed_size) = le_u32(input)?;
    let (input, total_payload_size) = le_u32(input)?;
    let (input, head_payload_size) = le_u32(input)?;
    let (input, first_file_encode) = le_u32(input)?;
    let (input, unk10) = le_u32(input)?;
    let (input, uncompressed_size2) = le_u64(input)?;
    let (input, total_payload_size2) = le_u64(input)?;
    let (input, block_count) = le_u32(input)?;
    let (input, uncompressed_block_granularity) = le_u32(input)?;
    let (input, unk28) = unk28(input)?;
    let (input, first_block_size) = peek(le_u32)(input)?;

    Ok((
        input,
        BundleHeader {
            uncompressed_size,
            total_payload_size,
            head_payload_size,
            first_file_encode: first_file_encode.into(),
            unk10,
            uncompressed_size2,
            total_payload_size2,
            block_count,
            uncompressed_block_granularity,
            unk28,
            first_block_size,
        },
    ))
}

/// Describe a nom error without dumping the remaining input
fn describe(err: nom::Err<nom::error::Error<&[u8]>>) -> String {
    match err {
        nom::Err::Incomplete(_) => "not enough data".to_string(),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            format!("{:?} with {} bytes remaining", e.code, e.input.len())
        }
    }
}

/// Parse the fixed-offset header. Needs at least 64 bytes, the header plus the first block size
pub fn parse_header(contents: &[u8]) -> Result<BundleHeader> {
    let (_, header) =
        head(contents).map_err(|e| anyhow!("Failed to parse bundle header: {}", describe(e)))?;

    Ok(header)
}

/// Read the derived header values from a bundle buffer
pub fn read_header(contents: &[u8]) -> Result<HeaderSummary> {
    parse_header(contents)?.summary()
}

/// Read the whole block size array. Fails if the buffer is truncated before its end
pub fn block_sizes(contents: &[u8], header: &BundleHeader) -> Result<Vec<u32>> {
    fn size_array(input: &[u8], block_count: usize) -> IResult<&[u8], Vec<u32>> {
        let (input, _) = take(HEADER_SIZE as usize)(input)?;
        count(le_u32, block_count)(input)
    }

    let block_count = header.computed_block_count()? as usize;
    let (_, sizes) = size_array(contents, block_count)
        .map_err(|e| anyhow!("Failed to parse block sizes: {}", describe(e)))?;

    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out a header the same way the CDN does
    fn build(uncompressed_size: u32, granularity: u32, block_sizes: &[u32]) -> Vec<u8> {
        let total_payload_size =
            60 + 4 * block_sizes.len() as u32 + block_sizes.iter().sum::<u32>();

        let mut buf = vec![];
        buf.extend(uncompressed_size.to_le_bytes());
        buf.extend(total_payload_size.to_le_bytes());
        buf.extend(48u32.to_le_bytes());
        buf.extend(8u32.to_le_bytes());
        buf.extend(1u32.to_le_bytes());
        buf.extend((uncompressed_size as u64).to_le_bytes());
        buf.extend((total_payload_size as u64).to_le_bytes());
        buf.extend((block_sizes.len() as u32).to_le_bytes());
        buf.extend(granularity.to_le_bytes());
        buf.extend([0u8; 16]);
        block_sizes.iter().for_each(|s| buf.extend(s.to_le_bytes()));

        buf
    }

    #[test]
    fn test_read_header_fields() {
        let buf = build(5012, 1 << 20, &[1337]);

        let summary = read_header(&buf).unwrap();
        assert_eq!(
            summary,
            HeaderSummary {
                uncompressed_size: 5012,
                total_payload_size: 60 + 4 + 1337,
                head_payload_size: 48,
                granularity: 1 << 20,
                block_count: 1,
                first_block_size: 1337,
                block_array_end_offset: 64,
            }
        );
    }

    #[test]
    fn test_parse_header_raw_fields() {
        let buf = build(300, 100, &[10, 20, 30]);

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.first_file_encode, FirstFileEncode::Kraken6);
        assert_eq!(header.unk10, 1);
        assert_eq!(header.uncompressed_size2, 300);
        assert_eq!(header.block_count, 3);
        assert_eq!(header.unk28, [0; 4]);
        assert!(header.anomalies(None).is_empty());
    }

    #[test]
    fn test_block_count_rounds_up() {
        let buf = build(5012, 5012, &[1]);
        assert_eq!(read_header(&buf).unwrap().block_count, 1);

        let buf = build(5012, 5011, &[1, 1]);
        let summary = read_header(&buf).unwrap();
        assert_eq!(summary.block_count, 2);
        assert_eq!(summary.block_array_end_offset, 68);
    }

    #[test]
    fn test_minimal_buffer() {
        // Only size and granularity set, everything else zeroed
        let mut buf = vec![0u8; 64];
        buf[0..4].copy_from_slice(&5012u32.to_le_bytes());
        buf[40..44].copy_from_slice(&1048576u32.to_le_bytes());

        let summary = read_header(&buf).unwrap();
        assert_eq!(summary.uncompressed_size, 5012);
        assert_eq!(summary.block_count, 1);
        assert_eq!(summary.first_block_size, 0);
    }

    #[test]
    fn test_zero_granularity() {
        let buf = build(5012, 0, &[1]);

        let err = read_header(&buf).unwrap_err();
        assert!(err.to_string().contains("Granularity is zero"));
    }

    #[test]
    fn test_truncated_buffer() {
        let buf = build(5012, 1 << 20, &[1]);

        assert!(read_header(&buf[..63]).is_err());
        assert!(read_header(&buf[..20]).is_err());
        assert!(read_header(&[]).is_err());
    }

    #[test]
    fn test_block_sizes() {
        let buf = build(250, 100, &[7, 8, 9]);
        let header = parse_header(&buf).unwrap();

        assert_eq!(block_sizes(&buf, &header).unwrap(), vec![7, 8, 9]);
        assert!(block_sizes(&buf[..70], &header).is_err());
    }

    #[test]
    fn test_block_count_mismatch() {
        let mut buf = build(250, 100, &[7, 8, 9]);
        buf[36..40].copy_from_slice(&5u32.to_le_bytes());

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.computed_block_count().unwrap(), 3);
        assert_eq!(
            header.anomalies(None),
            vec![Anomaly::BlockCount {
                declared: 5,
                computed: 3
            }]
        );
    }

    #[test]
    fn test_wide_size_mismatch() {
        let mut buf = build(250, 100, &[7, 8, 9]);
        buf[20..28].copy_from_slice(&251u64.to_le_bytes());
        buf[4..8].copy_from_slice(&1u32.to_le_bytes());
        buf[28..36].copy_from_slice(&1u64.to_le_bytes());

        let header = parse_header(&buf).unwrap();
        let sizes = block_sizes(&buf, &header).unwrap();
        assert_eq!(
            header.anomalies(Some(&sizes)),
            vec![
                Anomaly::UncompressedSize {
                    narrow: 250,
                    wide: 251
                },
                Anomaly::BlockSizeSum {
                    sum: 24,
                    total_payload_size: 1
                },
            ]
        );
    }
}
