//! Packing message bodies into bytes and back.
//!
//! The engine never looks inside a message: it asks the body how many bytes
//! it needs, allocates exactly that, and hands the buffer to [`Marshal::pack`].
//! On the receiving side it hands the delivered bytes to [`Marshal::unpack`].

use crate::error::MarshalError;

const F64_BYTES: usize = 8;

/// A message body the engine can move between ranks.
///
/// `pack` is always called with a buffer of exactly `packed_len()` bytes.
pub trait Marshal {
    /// Number of bytes `pack` will write.
    fn packed_len(&self) -> usize;

    /// Serialize into `buf`, which is exactly `packed_len()` bytes long.
    ///
    /// # Panics
    ///
    /// Implementations may panic when `buf` has any other length. The
    /// engines check the length before calling.
    fn pack(&self, buf: &mut [u8]);

    /// Replace the body's contents with the decoded `bytes`.
    fn unpack(&mut self, bytes: &[u8]) -> Result<(), MarshalError>;
}

/// Opaque bytes.
impl Marshal for Vec<u8> {
    fn packed_len(&self) -> usize {
        self.len()
    }

    fn pack(&self, buf: &mut [u8]) {
        buf.copy_from_slice(self);
    }

    fn unpack(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        self.clear();
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Ghost values, little-endian.
impl Marshal for Vec<f64> {
    fn packed_len(&self) -> usize {
        self.len() * F64_BYTES
    }

    fn pack(&self, buf: &mut [u8]) {
        for (chunk, value) in buf.chunks_exact_mut(F64_BYTES).zip(self) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn unpack(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        if bytes.len() % F64_BYTES != 0 {
            return Err(MarshalError::MisalignedLength {
                len: bytes.len(),
                element: F64_BYTES,
            });
        }

        self.clear();
        self.extend(bytes.chunks_exact(F64_BYTES).map(|chunk| {
            let mut raw = [0u8; F64_BYTES];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        }));
        Ok(())
    }
}

impl<T: Marshal + ?Sized> Marshal for Box<T> {
    fn packed_len(&self) -> usize {
        (**self).packed_len()
    }

    fn pack(&self, buf: &mut [u8]) {
        (**self).pack(buf)
    }

    fn unpack(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        (**self).unpack(bytes)
    }
}
