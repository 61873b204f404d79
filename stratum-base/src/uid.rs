// An opaque 9-byte identifier: one tag byte plus eight random bytes (spec.md §3, §6).
// UIDs are generated at creation and carry no ordering guarantee; tests that need a
// stable order must order by insertion, not by UID (spec.md §9).

use rand::RngCore;
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UidTag {
    Dataset,
    Stripe,
}

impl UidTag {
    fn byte(self) -> u8 {
        match self {
            UidTag::Dataset => b'd',
            UidTag::Stripe => b's',
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid([u8; 9]);

impl Uid {
    pub fn new(tag: UidTag) -> Self {
        let mut bytes = [0u8; 9];
        bytes[0] = tag.byte();
        rand::thread_rng().fill_bytes(&mut bytes[1..]);
        Uid(bytes)
    }

    pub fn to_hex(self) -> String {
        let mut s = String::with_capacity(18);
        for b in self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 18 {
            return None;
        }
        let mut bytes = [0u8; 9];
        for i in 0..9 {
            bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Uid(bytes))
    }

    pub fn as_bytes(self) -> [u8; 9] {
        self.0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.to_hex())
    }
}
impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uid::from_hex(&s).ok_or_else(|| DeError::custom("invalid UID hex string"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn test_roundtrip_hex() {
        let uid = Uid::new(UidTag::Dataset);
        let hex = uid.to_hex();
        assert_eq!(hex.len(), 18);
        assert_eq!(Uid::from_hex(&hex), Some(uid));
    }

    #[test]
    fn test_json_roundtrip() {
        let uid = Uid::new(UidTag::Stripe);
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json.len(), 20);
        let back: Uid = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, back);
    }

    #[test]
    fn test_uids_differ() {
        let a = Uid::new(UidTag::Dataset);
        let b = Uid::new(UidTag::Dataset);
        assert_ne!(a, b);
    }
}
