mod hashers;

pub use hashers::{Sha256d, sha256d};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::str::{self, FromStr};

pub const HASH_SIZE: usize = 32;

/// A 32-byte hash kept in internal (wire) byte order.
///
/// `Display`/`FromStr` use the reversed RPC byte order that daemons and block
/// explorers print, so `hash.to_string()` matches `getblocktemplate` output.
#[derive(PartialEq, Eq, Clone, Copy, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

pub const ZERO_HASH: Hash = Hash([0u8; HASH_SIZE]);

impl Hash {
    #[inline(always)]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    #[inline(always)]
    pub const fn as_bytes(&self) -> [u8; HASH_SIZE] {
        self.0
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, hex::FromHexError> {
        <[u8; HASH_SIZE]>::try_from(bytes).map(Hash).map_err(|_| hex::FromHexError::InvalidStringLength)
    }

    /// Same bytes, opposite order.
    #[inline]
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Hash(bytes)
    }

    /// Hex of the internal byte order, as Stratum transmits merkle branches.
    pub fn to_internal_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_internal_hex(hash_str: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(hash_str, &mut bytes)?;
        Ok(Hash(bytes))
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut hex = [0u8; HASH_SIZE * 2];
        hex::encode_to_slice(self.reversed().0, &mut hex).map_err(|_| std::fmt::Error)?;
        f.write_str(str::from_utf8(&hex).map_err(|_| std::fmt::Error)?)
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(hash_str: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_internal_hex(hash_str)?.reversed())
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Hash::from_str(&s).map_err(serde::de::Error::custom)
    }
}
