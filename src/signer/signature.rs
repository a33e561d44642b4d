//! Signature values returned by the signer nodes

use crate::errors::EndpointError;
use std::fmt;

/// Length of a serialized (compressed G2) BLS signature
pub const SIGNATURE_LENGTH: usize = 96;

/// A 96-byte BLS signature produced by the remote signer.
///
/// The wallet never does curve arithmetic on it; it only checks the length
/// and hands the bytes back unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EndpointError> {
        let array: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            EndpointError::MalformedResponse(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Serialized form, byte for byte as the signer produced it.
    pub fn marshal(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }
}

impl From<[u8; SIGNATURE_LENGTH]> for Signature {
    fn from(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{}..)", hex::encode(&self.0[..8]))
    }
}
