//! Wire format for framed messages between ranks.
//!
//! Frame format: `[length:4][checksum:4][source:4][tag:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of (source + tag + payload)
//! - **source**: Rank of the sender (little-endian u32)
//! - **tag**: Message tag used for matching (little-endian u32)
//! - **payload**: Opaque message body

use crate::{Rank, Tag, TransportError};

/// Header size: 4 (length) + 4 (checksum) + 4 (source) + 4 (tag) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Maximum payload size (64 MiB).
///
/// Frames larger than this are rejected before any allocation is made for
/// them on the receiving side.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds maximum allowed size.
    #[error("frame too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    FrameTooLarge {
        /// Payload size in bytes.
        size: usize,
    },

    /// Length field has an invalid value.
    #[error("invalid frame length: {length}")]
    InvalidLength {
        /// The invalid length value from the header.
        length: u32,
    },
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        TransportError::Protocol {
            message: err.to_string(),
        }
    }
}

/// Fixed-size header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame size including header.
    pub length: u32,
    /// CRC32C checksum of (source + tag + payload).
    pub checksum: u32,
    /// Sending rank.
    pub source: Rank,
    /// Message tag.
    pub tag: Tag,
}

impl FrameHeader {
    /// Serialize header into buffer (must be at least HEADER_SIZE bytes).
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than HEADER_SIZE.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.source.get().to_le_bytes());
        buf[12..16].copy_from_slice(&self.tag.get().to_le_bytes());
    }

    /// Deserialize and validate a header.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if buffer is smaller than HEADER_SIZE
    /// - `InvalidLength` if the length field is smaller than the header
    /// - `FrameTooLarge` if the announced payload exceeds MAX_PAYLOAD_SIZE
    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }

        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let header = Self {
            length: word(0),
            checksum: word(4),
            source: Rank::new(word(8)),
            tag: Tag::new(word(12)),
        };

        if header.length < HEADER_SIZE as u32 {
            return Err(WireError::InvalidLength {
                length: header.length,
            });
        }
        if header.payload_len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::FrameTooLarge {
                size: header.payload_len(),
            });
        }
        Ok(header)
    }

    /// Length of the payload following the header.
    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }

    /// Check the payload against the header checksum.
    pub fn verify(&self, payload: &[u8]) -> Result<(), WireError> {
        let computed = compute_checksum(self.source, self.tag, payload);
        if computed != self.checksum {
            return Err(WireError::ChecksumMismatch {
                expected: self.checksum,
                actual: computed,
            });
        }
        Ok(())
    }
}

/// Compute CRC32C checksum over source + tag + payload.
fn compute_checksum(source: Rank, tag: Tag, payload: &[u8]) -> u32 {
    let mut prefix = [0u8; 8];
    prefix[0..4].copy_from_slice(&source.get().to_le_bytes());
    prefix[4..8].copy_from_slice(&tag.get().to_le_bytes());
    let crc = crc32c::crc32c(&prefix);
    crc32c::crc32c_append(crc, payload)
}

/// Encode a frame carrying `payload` from `source` with `tag`.
///
/// # Errors
///
/// Returns `FrameTooLarge` if payload exceeds MAX_PAYLOAD_SIZE.
///
/// # Examples
///
/// ```
/// use ghostline_transport::{encode_frame, FrameHeader, Rank, Tag, HEADER_SIZE};
///
/// let frame = encode_frame(Rank::new(2), Tag::DATA, b"halo").expect("encode");
/// let (head, payload) = frame.split_at(HEADER_SIZE);
/// let header = FrameHeader::deserialize(head).expect("header");
/// header.verify(payload).expect("checksum");
///
/// assert_eq!(header.source, Rank::new(2));
/// assert_eq!(header.tag, Tag::DATA);
/// assert_eq!(payload, b"halo");
/// ```
pub fn encode_frame(source: Rank, tag: Tag, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::FrameTooLarge {
            size: payload.len(),
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let mut data = vec![0u8; total_length];

    let header = FrameHeader {
        length: total_length as u32,
        checksum: compute_checksum(source, tag, payload),
        source,
        tag,
    };

    header.serialize_into(&mut data[..HEADER_SIZE]);
    data[HEADER_SIZE..].copy_from_slice(payload);

    Ok(data)
}

/// Decode a complete frame, validating its checksum.
#[cfg(test)]
fn decode_frame(data: &[u8]) -> Result<(FrameHeader, &[u8]), WireError> {
    let header = FrameHeader::deserialize(data)?;

    let expected_len = header.length as usize;
    if data.len() < expected_len {
        return Err(WireError::InsufficientData {
            needed: expected_len,
            have: data.len(),
        });
    }

    let payload = &data[HEADER_SIZE..expected_len];
    header.verify(payload)?;
    Ok((header, payload))
}
