//! Bitstring codec.
//!
//! A status list is a fixed-length bitstring, GZIP-compressed and then
//! base64url-encoded without padding so that it can travel inside the
//! `encodedList` property of a status list credential.
//!
//! The first index is the left-most (most significant) bit of the first byte.
//!
//! See: <https://w3c-ccg.github.io/vc-status-list-2021/#bitstring-encoding>
use std::io::{Read, Write};

use bitvec::prelude::{BitVec, Msb0};
use flate2::{bufread::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum length of a published status list bitstring, for herd privacy.
///
/// See: <https://w3c-ccg.github.io/vc-status-list-2021/#revocation-bitstring-length>
pub const MIN_BITSTRING_LENGTH: usize = 131072;

/// Maximum decompressed size, in bytes, of a list of unknown length.
pub const MAX_DECODED_LENGTH: usize = 2097152; // 2MB

/// A compressed, base64url-encoded bitstring.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct EncodedList(pub String);

/// A decoded status list bitstring.
#[derive(Clone, Debug, PartialEq)]
pub struct BitString {
    bits: BitVec<Msb0, u8>,
}

#[derive(Error, Debug)]
pub enum DecodeListError {
    #[error("Base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Decompression: {0}")]
    Decompress(#[from] std::io::Error),
    #[error("Bitstring is too large: {0} bytes")]
    TooLarge(usize),
    #[error("Unexpected bitstring length: expected {expected} bits, found {found}")]
    Length { expected: usize, found: usize },
}

#[derive(Error, Debug)]
pub enum EncodeListError {
    #[error("Compression: {0}")]
    Compress(#[from] std::io::Error),
}

impl BitString {
    /// Construct a bitstring of `len` bits, all unset.
    ///
    /// Callers are expected to pass a multiple of 8, since the encoding is
    /// byte oriented.
    pub fn new(len: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, len),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DecodeListError> {
        let bits = BitVec::<Msb0, u8>::try_from_vec(bytes)
            .map_err(|bytes| DecodeListError::TooLarge(bytes.len()))?;
        Ok(Self { bits })
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|bit| *bit)
    }

    /// Set the bit at `index`. Returns `false` if the index is out of bounds.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        match self.bits.get_mut(index) {
            Some(mut bit) => {
                *bit = value;
                true
            }
            None => false,
        }
    }

    /// Indexes of all set bits, in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn count_set(&self) -> usize {
        self.bits.count_ones()
    }

    /// Compress and encode the bitstring.
    ///
    /// Encoding is deterministic: the GZIP header carries no timestamp or
    /// file name and the compression level is fixed.
    pub fn encode(&self) -> Result<EncodedList, EncodeListError> {
        let bytes = self.bits.clone().into_vec();
        let mut e = GzEncoder::new(Vec::new(), Compression::default());
        e.write_all(&bytes)?;
        let compressed = e.finish()?;
        Ok(EncodedList(base64::encode_config(
            compressed,
            base64::URL_SAFE_NO_PAD,
        )))
    }
}

impl EncodedList {
    /// Encode an empty list of `len` bits.
    pub fn empty(len: usize) -> Result<Self, EncodeListError> {
        BitString::new(len).encode()
    }

    /// Decode a list that is expected to hold exactly `len` bits.
    pub fn decode(&self, len: usize) -> Result<BitString, DecodeListError> {
        // Inflate at most one byte past the expected size, so an oversized
        // stream is detected without inflating all of it.
        let data = self.inflate(len / 8 + 1)?;
        if data.len() * 8 != len {
            return Err(DecodeListError::Length {
                expected: len,
                found: data.len() * 8,
            });
        }
        BitString::from_bytes(data)
    }

    /// Decode a list of unknown length, e.g. one fetched from a published
    /// status list credential.
    pub fn decode_unsized(&self) -> Result<BitString, DecodeListError> {
        let data = self.inflate(MAX_DECODED_LENGTH + 1)?;
        if data.len() > MAX_DECODED_LENGTH {
            return Err(DecodeListError::TooLarge(data.len()));
        }
        BitString::from_bytes(data)
    }

    fn inflate(&self, limit: usize) -> Result<Vec<u8>, DecodeListError> {
        let compressed = base64::decode_config(&self.0, base64::URL_SAFE_NO_PAD)?;
        let mut data = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .take(limit as u64)
            .read_to_end(&mut data)?;
        Ok(data)
    }
}
