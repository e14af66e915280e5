use std::fmt;

use crate::identity::InfoHash;

mod metainfo;

pub use metainfo::{File, Info, Keys, MetaInfo};

#[derive(thiserror::Error, Debug)]
pub enum TorrentError {
    #[error("Bencode decoding error: {0}")]
    Bencode(#[from] serde_bencode::Error),
    #[error("piece length must be positive")]
    ZeroPieceLength,
    #[error("total file length overflows")]
    LengthOverflow,
}

/// Immutable description of one torrent: what is being exchanged and how it
/// is split into pieces. Shared read-only by every connection for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    info_hash: InfoHash,
    name: String,
    length: u64,
    piece_length: u64,
}

impl TorrentInfo {
    pub fn new(
        info_hash: InfoHash,
        name: impl Into<String>,
        length: u64,
        piece_length: u64,
    ) -> Result<Self, TorrentError> {
        if piece_length == 0 {
            return Err(TorrentError::ZeroPieceLength);
        }
        Ok(Self {
            info_hash,
            name: name.into(),
            length,
            piece_length,
        })
    }

    /// Parses a bencoded metainfo document. The info hash is the SHA-1 of the
    /// re-encoded `info` dictionary.
    #[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn from_metainfo(bytes: &[u8]) -> Result<Self, TorrentError> {
        let meta: MetaInfo = serde_bencode::from_bytes(bytes)?;
        let encoded = serde_bencode::to_bytes(&meta.info)?;
        let length = meta.info.length().ok_or(TorrentError::LengthOverflow)?;
        let info = Self::new(
            InfoHash::of(&encoded),
            meta.info.name.clone(),
            length,
            meta.info.piece_length,
        )?;
        tracing::debug!("Parsed metainfo for {}", info);
        Ok(info)
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn piece_length(&self) -> u64 {
        self.piece_length
    }

    pub fn num_pieces(&self) -> u64 {
        self.length.div_ceil(self.piece_length)
    }

    /// Size of the piece at `index`; the last piece may be shorter. Returns
    /// `None` past the end.
    pub fn piece_size(&self, index: u64) -> Option<u64> {
        let pieces = self.num_pieces();
        if index >= pieces {
            return None;
        }
        if index == pieces - 1 {
            let remainder = self.length % self.piece_length;
            if remainder != 0 {
                return Some(remainder);
            }
        }
        Some(self.piece_length)
    }
}

impl fmt::Display for TorrentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TorrentInfo(hash={}, name={}, length={}, pieces={})",
            self.info_hash,
            self.name,
            self.length,
            self.num_pieces()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metainfo() -> Vec<u8> {
        let mut out = b"d4:infod6:lengthi10e4:name5:layer12:piece lengthi4e6:pieces60:".to_vec();
        out.extend_from_slice(&[7u8; 60]);
        out.extend_from_slice(b"ee");
        out
    }

    #[test]
    fn test_from_metainfo() {
        let info = TorrentInfo::from_metainfo(&metainfo()).unwrap();
        assert_eq!(info.name(), "layer");
        assert_eq!(info.length(), 10);
        assert_eq!(info.piece_length(), 4);
        assert_eq!(info.num_pieces(), 3);
    }

    #[test]
    fn test_info_hash_covers_info_dict_only() {
        let raw = metainfo();
        let info = TorrentInfo::from_metainfo(&raw).unwrap();
        // The info dictionary spans from after "d4:info" up to the outer "e".
        let dict = &raw[7..raw.len() - 1];
        assert_eq!(info.info_hash(), InfoHash::of(dict));
    }

    #[test]
    fn test_piece_sizes() {
        let info = TorrentInfo::new(InfoHash::of(b"x"), "x", 10, 4).unwrap();
        assert_eq!(info.piece_size(0), Some(4));
        assert_eq!(info.piece_size(2), Some(2));
        assert_eq!(info.piece_size(3), None);

        let even = TorrentInfo::new(InfoHash::of(b"x"), "x", 8, 4).unwrap();
        assert_eq!(even.piece_size(1), Some(4));
    }

    #[test]
    fn test_zero_piece_length_rejected() {
        assert!(matches!(
            TorrentInfo::new(InfoHash::of(b"x"), "x", 1, 0),
            Err(TorrentError::ZeroPieceLength)
        ));
    }

    fn multi_file_metainfo(lengths: &[u64]) -> Vec<u8> {
        let mut out = b"d4:infod5:filesl".to_vec();
        for (i, length) in lengths.iter().enumerate() {
            out.extend_from_slice(format!("d6:lengthi{}e4:pathl1:{}ee", length, i).as_bytes());
        }
        out.extend_from_slice(b"e4:name5:layer12:piece lengthi4e6:pieces20:");
        out.extend_from_slice(&[7u8; 20]);
        out.extend_from_slice(b"ee");
        out
    }

    #[test]
    fn test_multi_file_length_is_summed() {
        let info = TorrentInfo::from_metainfo(&multi_file_metainfo(&[3, 4])).unwrap();
        assert_eq!(info.length(), 7);
        assert_eq!(info.num_pieces(), 2);
    }

    #[test]
    fn test_multi_file_length_overflow_rejected() {
        let max = i64::MAX as u64;
        let raw = multi_file_metainfo(&[max, max, max]);
        assert!(matches!(
            TorrentInfo::from_metainfo(&raw),
            Err(TorrentError::LengthOverflow)
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(TorrentInfo::from_metainfo(b"not bencode").is_err());
    }
}
