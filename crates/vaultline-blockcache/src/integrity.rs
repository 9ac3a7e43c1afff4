//! HMAC-SHA256 signing of cached payloads
//!
//! Every file the cache writes is stored as `payload ++ tag`, where the tag
//! is the 32-byte HMAC-SHA256 of the payload under the cache's secret. The
//! tag detects local tampering or corruption; it provides no confidentiality.

use crate::error::{CacheError, CacheResult, IntegrityError};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Size of the tag appended to every cached payload
pub const TAG_LEN: usize = 32;

/// A keyed HMAC-SHA256 instance owned by one cache
///
/// The key is set up once at construction and cloned per operation, so
/// caches with different secrets can live side by side in one process.
#[derive(Clone)]
pub struct IntegrityKey {
    mac: HmacSha256,
}

impl IntegrityKey {
    /// Build a key from the configured secret. Any length is accepted.
    pub fn new(secret: &[u8]) -> CacheResult<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CacheError::InvalidConfiguration(format!("hmac secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Return `payload` with its tag appended.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        let tag = mac.finalize().into_bytes();

        let mut signed = Vec::with_capacity(payload.len() + TAG_LEN);
        signed.extend_from_slice(payload);
        signed.extend_from_slice(&tag);
        signed
    }

    /// Check the trailing tag of `blob` and return the payload in front of it.
    pub fn verify<'a>(&self, blob: &'a [u8]) -> Result<&'a [u8], IntegrityError> {
        if blob.len() < TAG_LEN {
            return Err(IntegrityError::TooShort { len: blob.len() });
        }

        let (payload, tag) = blob.split_at(blob.len() - TAG_LEN);
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(tag).map_err(|_| IntegrityError::Corrupted)?;

        Ok(payload)
    }

    /// Like [`verify`](Self::verify), but strips the tag from an owned buffer
    /// in place.
    pub fn verify_owned(&self, mut blob: Vec<u8>) -> Result<Vec<u8>, IntegrityError> {
        let len = self.verify(&blob)?.len();
        blob.truncate(len);
        Ok(blob)
    }
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityKey").finish_non_exhaustive()
    }
}
