use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use super::{hex_serde, to_array, ParseError};

/// SHA-1 hash of a content descriptor. Two peers serve the same torrent only
/// if their info hashes are equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Hashes `descriptor` with SHA-1.
    pub fn of(descriptor: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(descriptor);
        Self(hasher.finalize().into())
    }

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        to_array(bytes).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for InfoHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(&hex::decode(s)?)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.hex())
    }
}

hex_serde!(InfoHash);
