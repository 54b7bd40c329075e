use pool_hashes::Hash;
use pool_pow::{BlockHeader, Target, encoding::write_compact_size};

// Witness reserved value the coinbase witness carries when a commitment is present
const WITNESS_RESERVED_VALUE: [u8; 32] = [0u8; 32];

/// One unit of minable work. Immutable once published; a new block produces a
/// new template rather than a mutation of this one.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTemplate {
    pub job_id: u64,
    pub prev_hash: Hash,
    /// Coinbase bytes up to the extranonce injection point
    pub coinbase1: Vec<u8>,
    /// Coinbase bytes after the extranonce, starting with the pool tag
    pub coinbase2: Vec<u8>,
    /// Sibling hashes folding a coinbase hash into the merkle root
    pub merkle_branch: Vec<Hash>,
    pub version: u32,
    pub bits: u32,
    pub cur_time: u32,
    pub clean_jobs: bool,
    pub network_target: Target,
    pub height: u64,
    /// Non-coinbase transactions in daemon order, serialized
    pub transactions: Vec<Vec<u8>>,
    /// Whether the coinbase must carry the witness reserved value in a block
    pub segwit: bool,
}

impl JobTemplate {
    /// Job ids travel as lowercase hex.
    pub fn job_id_hex(&self) -> String {
        format!("{:x}", self.job_id)
    }

    /// `coinbase1 || extranonce1 || extranonce2 || coinbase2`
    pub fn coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Vec<u8> {
        let mut coinbase = Vec::with_capacity(self.coinbase1.len() + extranonce1.len() + extranonce2.len() + self.coinbase2.len());
        coinbase.extend_from_slice(&self.coinbase1);
        coinbase.extend_from_slice(extranonce1);
        coinbase.extend_from_slice(extranonce2);
        coinbase.extend_from_slice(&self.coinbase2);
        coinbase
    }

    /// Serializes a full block around a solved header and the miner's coinbase.
    pub fn assemble_block(&self, header: &BlockHeader, coinbase: &[u8]) -> Vec<u8> {
        let body_len: usize = self.transactions.iter().map(Vec::len).sum();
        let mut block = Vec::with_capacity(pool_pow::HEADER_SIZE + 9 + coinbase.len() + 36 + body_len);
        block.extend_from_slice(&header.serialize());
        write_compact_size(&mut block, 1 + self.transactions.len() as u64);
        if self.segwit {
            append_witness_coinbase(&mut block, coinbase);
        } else {
            block.extend_from_slice(coinbase);
        }
        for tx in self.transactions.iter() {
            block.extend_from_slice(tx);
        }
        block
    }
}

/// Re-serializes a stripped coinbase with marker, flag and a single witness
/// item holding the reserved value.
fn append_witness_coinbase(out: &mut Vec<u8>, stripped: &[u8]) {
    let (version, rest) = stripped.split_at(4.min(stripped.len()));
    let (body, lock_time) = rest.split_at(rest.len().saturating_sub(4));
    out.extend_from_slice(version);
    out.extend_from_slice(&[0x00, 0x01]);
    out.extend_from_slice(body);
    out.push(0x01);
    write_compact_size(out, WITNESS_RESERVED_VALUE.len() as u64);
    out.extend_from_slice(&WITNESS_RESERVED_VALUE);
    out.extend_from_slice(lock_time);
}
