/// Serializes 20 byte identifiers as lowercase hex strings.
macro_rules! hex_serde {
    ($ty:ident) => {
        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use hex_serde;

mod info_hash;
mod peer_id;

pub use info_hash::InfoHash;
pub use peer_id::PeerId;

/// Errors produced when parsing identifiers from their hex form.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 20 bytes, got {0}")]
    Length(usize),
}

/// Copies `bytes` into a fixed 20 byte array.
pub(crate) fn to_array(bytes: &[u8]) -> Result<[u8; 20], ParseError> {
    if bytes.len() != 20 {
        return Err(ParseError::Length(bytes.len()));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    Ok(out)
}
