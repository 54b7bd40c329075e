use crate::Hash;
use sha2::{Digest, Sha256};

/// Bitcoin's hash256: SHA-256 applied to a SHA-256 digest.
#[derive(Clone, Default)]
pub struct Sha256d(Sha256);

impl Sha256d {
    #[inline]
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    #[inline]
    pub fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
        self.0.update(data);
        self
    }

    #[inline]
    pub fn finalize(self) -> Hash {
        let first = self.0.finalize();
        Hash::from_bytes(Sha256::digest(first).into())
    }

    #[inline]
    pub fn hash<A: AsRef<[u8]>>(data: A) -> Hash {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

#[inline]
pub fn sha256d(data: &[u8]) -> Hash {
    Sha256d::hash(data)
}
