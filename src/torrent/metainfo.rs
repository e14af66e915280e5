use serde_bytes::ByteBuf;
use serde_derive::{Deserialize, Serialize};

/// Top level of a bencoded metainfo document. Only the `info` dictionary
/// matters for the connection layer; tracker keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaInfo {
    pub info: Info,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Info {
    /// Advisory name of the blob (or directory in the multi-file case).
    pub name: String,

    /// Number of bytes in each piece. Every piece has this length except
    /// possibly the last one.
    #[serde(rename = "piece length")]
    pub piece_length: u64,

    /// Concatenated 20-byte SHA-1 hashes, one per piece.
    pub pieces: ByteBuf,

    #[serde(flatten)]
    pub keys: Keys,
}

/// There is a key `length` or a key `files`, but not both or neither.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Keys {
    SingleFile { length: u64 },
    MultiFile { files: Vec<File> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct File {
    pub length: u64,
    pub path: Vec<String>,
}

impl Info {
    /// Total number of bytes, or `None` if the file lengths overflow.
    pub fn length(&self) -> Option<u64> {
        match &self.keys {
            Keys::SingleFile { length } => Some(*length),
            Keys::MultiFile { files } => files
                .iter()
                .try_fold(0u64, |total, file| total.checked_add(file.length)),
        }
    }
}
