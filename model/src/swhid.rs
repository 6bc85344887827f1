use crate::errors::SwhidError;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::str::{self, FromStr};

pub const SWHID_HASH_SIZE: usize = 20;
/// Wire form: 1 type byte + 1 version byte + 20 hash bytes
pub const SWHID_BYTES: usize = 22;
pub const SWHID_VERSION: u8 = 1;

#[repr(u8)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug, Serialize, Deserialize)]
pub enum NodeType {
    Content = 0,
    Directory = 1,
    Revision = 2,
    Release = 3,
    Snapshot = 4,
    Origin = 5,
}

impl NodeType {
    pub fn code(&self) -> &'static str {
        match self {
            NodeType::Content => "cnt",
            NodeType::Directory => "dir",
            NodeType::Revision => "rev",
            NodeType::Release => "rel",
            NodeType::Snapshot => "snp",
            NodeType::Origin => "ori",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, SwhidError> {
        match code {
            "cnt" => Ok(NodeType::Content),
            "dir" => Ok(NodeType::Directory),
            "rev" => Ok(NodeType::Revision),
            "rel" => Ok(NodeType::Release),
            "snp" => Ok(NodeType::Snapshot),
            "ori" => Ok(NodeType::Origin),
            _ => Err(SwhidError::UnknownType(code.to_string())),
        }
    }
}

impl TryFrom<u8> for NodeType {
    type Error = SwhidError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(NodeType::Content),
            1 => Ok(NodeType::Directory),
            2 => Ok(NodeType::Revision),
            3 => Ok(NodeType::Release),
            4 => Ok(NodeType::Snapshot),
            5 => Ok(NodeType::Origin),
            _ => Err(SwhidError::UnknownTypeTag(tag)),
        }
    }
}

/// A Software Heritage persistent identifier: a typed, salted git-style SHA-1.
///
/// The derived ordering (type tag, then hash bytes) coincides with the
/// lexicographic ordering of the textual form within a single type.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Swhid {
    pub node_type: NodeType,
    pub hash: [u8; SWHID_HASH_SIZE],
}

impl Swhid {
    pub fn new(node_type: NodeType, hash: [u8; SWHID_HASH_SIZE]) -> Self {
        Self { node_type, hash }
    }

    /// The fixed 22-byte wire form stored in the `nodes` table.
    pub fn to_bytes(&self) -> [u8; SWHID_BYTES] {
        let mut bytes = [0u8; SWHID_BYTES];
        bytes[0] = self.node_type as u8;
        bytes[1] = SWHID_VERSION;
        bytes[2..].copy_from_slice(&self.hash);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SwhidError> {
        if bytes.len() != SWHID_BYTES {
            return Err(SwhidError::InvalidLength(bytes.len()));
        }
        if bytes[1] != SWHID_VERSION {
            return Err(SwhidError::UnsupportedVersion(bytes[1].to_string()));
        }
        let node_type = NodeType::try_from(bytes[0])?;
        let mut hash = [0u8; SWHID_HASH_SIZE];
        hash.copy_from_slice(&bytes[2..]);
        Ok(Self { node_type, hash })
    }
}

impl Display for Swhid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut hex = [0u8; SWHID_HASH_SIZE * 2];
        faster_hex::hex_encode(&self.hash, &mut hex).expect("The output is exactly twice the size of the input");
        write!(f, "swh:{}:{}:{}", SWHID_VERSION, self.node_type.code(), str::from_utf8(&hex).expect("hex is always valid UTF-8"))
    }
}

impl Debug for Swhid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromStr for Swhid {
    type Err = SwhidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, ':');
        let (scheme, version, code, hex) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Err(SwhidError::MalformedIdentifier(s.to_string())),
        };
        if scheme != "swh" {
            return Err(SwhidError::MalformedIdentifier(s.to_string()));
        }
        if version != "1" {
            return Err(SwhidError::UnsupportedVersion(version.to_string()));
        }
        let node_type = NodeType::from_code(code)?;
        if hex.len() != SWHID_HASH_SIZE * 2 {
            return Err(SwhidError::InvalidLength(hex.len()));
        }
        let mut hash = [0u8; SWHID_HASH_SIZE];
        faster_hex::hex_decode(hex.as_bytes(), &mut hash).map_err(|_| SwhidError::InvalidHash(hex.to_string()))?;
        Ok(Self { node_type, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swhid_basics() {
        let swhid_str = "swh:1:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2";
        let swhid = Swhid::from_str(swhid_str).unwrap();
        assert_eq!(swhid.node_type, NodeType::Content);
        assert_eq!(swhid_str, swhid.to_string());

        let swhid2 = Swhid::from_str("swh:1:rev:94a9ed024d3859793618152ea559a168bbcbb5e2").unwrap();
        assert_ne!(swhid, swhid2);

        assert!(Swhid::from_str("swh:2:cnt:94a9ed024d3859793618152ea559a168bbcbb5e2").is_err());
        assert!(Swhid::from_str("swh:1:xxx:94a9ed024d3859793618152ea559a168bbcbb5e2").is_err());
        assert!(Swhid::from_str("swh:1:cnt:94a9ed0").is_err());
        assert!(Swhid::from_str("swh:1:cnt:zza9ed024d3859793618152ea559a168bbcbb5e2").is_err());
        assert!(Swhid::from_str("not-a-swhid").is_err());
    }

    #[test]
    fn test_wire_roundtrip() {
        let swhid = Swhid::from_str("swh:1:dir:94a9ed024d3859793618152ea559a168bbcbb5e2").unwrap();
        let bytes = swhid.to_bytes();
        assert_eq!(bytes[0], NodeType::Directory as u8);
        assert_eq!(bytes[1], SWHID_VERSION);
        assert_eq!(Swhid::from_bytes(&bytes).unwrap(), swhid);

        assert!(Swhid::from_bytes(&bytes[..21]).is_err());
        let mut bad_version = bytes;
        bad_version[1] = 9;
        assert!(Swhid::from_bytes(&bad_version).is_err());
    }

    #[test]
    fn test_ordering_matches_textual_form() {
        let a = Swhid::from_str("swh:1:rev:0000000000000000000000000000000000000001").unwrap();
        let b = Swhid::from_str("swh:1:rev:00000000000000000000000000000000000000ff").unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
