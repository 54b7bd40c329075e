//! Canned regtest-style templates and jobs.

use crate::{
    block_template::builder::JobBuilder,
    model::{
        job::JobTemplate,
        template::{BlockTemplate, TemplateTransaction},
    },
};
use pool_hashes::sha256d;
use pool_pow::Target;

pub const POOL_TAG: &[u8] = b"/yeet/";
pub const EXTRANONCE1_SIZE: usize = 4;
pub const EXTRANONCE2_SIZE: usize = 4;

/// Regtest network bits, roughly every other hash is a block.
pub const EASY_BITS: u32 = 0x207fffff;
/// Difficulty 1 network bits, out of reach for test grinding.
pub const HARD_BITS: u32 = 0x1d00ffff;
/// Worker difficulty met by about one hash in 64.
pub const EASY_DIFFICULTY: f64 = 1.0 / 67_108_864.0;

pub const PREV_HASH: &str = "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206";
pub const CUR_TIME: u32 = 1_700_000_000;
pub const HEIGHT: u64 = 1;

pub fn payout_script() -> Vec<u8> {
    let mut script = vec![0x00, 0x14];
    script.extend_from_slice(&[0x75; 20]);
    script
}

pub fn block_template(tx_count: usize) -> BlockTemplate {
    block_template_with_bits(tx_count, EASY_BITS)
}

pub fn block_template_with_bits(tx_count: usize, bits: u32) -> BlockTemplate {
    let transactions = (0..tx_count)
        .map(|i| {
            let data = vec![0x02, 0x00, 0x00, 0x00, i as u8, 0xab, 0xcd];
            let txid = sha256d(&data).to_string();
            TemplateTransaction { data: hex::encode(&data), txid: Some(txid.clone()), hash: Some(txid) }
        })
        .collect();
    BlockTemplate {
        version: Some(0x2000_0000),
        previous_block_hash: Some(PREV_HASH.to_string()),
        transactions,
        coinbase_value: Some(5_000_000_000),
        coinbase_txn: None,
        target: Some(Target::from_compact(bits).to_string()),
        cur_time: Some(CUR_TIME),
        bits: Some(format!("{bits:08x}")),
        height: Some(HEIGHT),
        default_witness_commitment: None,
    }
}

pub fn job_builder() -> JobBuilder {
    JobBuilder::new(POOL_TAG.to_vec(), EXTRANONCE1_SIZE + EXTRANONCE2_SIZE, Some(payout_script()))
}

/// Job id 1 built from [`block_template_with_bits`].
pub fn job_template(tx_count: usize, bits: u32) -> JobTemplate {
    job_builder().build(&block_template_with_bits(tx_count, bits), 1).expect("fixture template is valid")
}
