//! On-disk record framing.
//!
//! ```text
//! | len (4, LE) | codec_id (1) | crc32 (4, LE) | append_ts_ms (8, LE) | payload (len) |
//! ```
//!
//! `crc32` covers the payload only. A frame whose header or payload is cut
//! short at the end of a file is a torn write; anything else that does not
//! check out is corruption.

/// Bytes before the payload
pub const HEADER_LEN: usize = 4 + 1 + 4 + 8;

/// Largest payload accepted; a bigger length field means a damaged header
pub const MAX_PAYLOAD_LEN: u32 = 64 * 1024 * 1024;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub len: u32,
    pub codec_id: u8,
    pub crc: u32,
    pub append_timestamp: i64,
}

impl FrameHeader {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        let mut len = [0u8; 4];
        len.copy_from_slice(&buf[0..4]);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&buf[5..9]);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&buf[9..17]);

        Self {
            len: u32::from_le_bytes(len),
            codec_id: buf[4],
            crc: u32::from_le_bytes(crc),
            append_timestamp: i64::from_le_bytes(ts),
        }
    }

    /// Total frame size on disk
    pub fn frame_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.len)
    }
}

/// Encode a complete frame.
///
/// Callers refuse payloads over [`MAX_PAYLOAD_LEN`] first; a longer one
/// would not fit the length field.
pub fn encode(codec_id: u8, payload: &[u8], append_timestamp: i64) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN as usize);
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.push(codec_id);
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(&append_timestamp.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Why a frame failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDefect {
    /// Length field over [`MAX_PAYLOAD_LEN`]
    ImpossibleLength(u32),
    /// Payload does not match its checksum
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImpossibleLength(len) => write!(f, "impossible frame length {len}"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "crc mismatch: stored {expected:#010x}, computed {actual:#010x}")
            }
        }
    }
}

pub fn check_len(header: &FrameHeader) -> Result<(), FrameDefect> {
    if header.len > MAX_PAYLOAD_LEN {
        return Err(FrameDefect::ImpossibleLength(header.len));
    }
    Ok(())
}

pub fn check_crc(header: &FrameHeader, payload: &[u8]) -> Result<(), FrameDefect> {
    let actual = crc32fast::hash(payload);
    if actual != header.crc {
        return Err(FrameDefect::ChecksumMismatch {
            expected: header.crc,
            actual,
        });
    }
    Ok(())
}

/// Result of scanning a partition file
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scan {
    /// Start position of every complete frame, indexed by offset
    pub positions: Vec<u64>,
    /// End of the last complete frame
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to a torn frame
    pub torn_bytes: u64,
}

/// Corrupt frame found while scanning
#[derive(Debug, PartialEq, Eq)]
pub struct ScanError {
    /// Offset of the bad frame
    pub offset: u64,
    pub defect: FrameDefect,
}

/// Rebuild the offset index of a partition file.
///
/// A truncated trailing frame ends the scan cleanly; a complete frame that
/// fails validation is an error.
pub fn scan(bytes: &[u8]) -> Result<Scan, ScanError> {
    let mut scan = Scan::default();
    let mut pos = 0usize;

    loop {
        let rest = &bytes[pos..];
        if rest.is_empty() {
            break;
        }
        let Some(header_bytes) = rest.first_chunk::<HEADER_LEN>() else {
            scan.torn_bytes = rest.len() as u64;
            break;
        };

        let header = FrameHeader::parse(header_bytes);
        let offset = scan.positions.len() as u64;
        check_len(&header).map_err(|defect| ScanError { offset, defect })?;

        let frame_len = header.frame_len() as usize;
        if rest.len() < frame_len {
            scan.torn_bytes = rest.len() as u64;
            break;
        }

        check_crc(&header, &rest[HEADER_LEN..frame_len])
            .map_err(|defect| ScanError { offset, defect })?;

        scan.positions.push(pos as u64);
        pos += frame_len;
        scan.valid_len = pos as u64;
    }

    Ok(scan)
}
