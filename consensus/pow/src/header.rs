use pool_hashes::{Hash, Sha256d};

pub const HEADER_SIZE: usize = 80;

/// The 80-byte block header. Hash fields hold internal byte order; integers
/// are serialized little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(self.prev_hash.as_slice());
        bytes[36..68].copy_from_slice(self.merkle_root.as_slice());
        bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    #[inline]
    pub fn hash(&self) -> Hash {
        Sha256d::hash(self.serialize())
    }
}
