use super::coinbase::{build_coinbase, split_coinbase};
use crate::{
    errors::{TemplateError, TemplateResult},
    model::{job::JobTemplate, template::BlockTemplate},
};
use pool_hashes::{Hash, sha256d};
use pool_merkle::merkle_branch;
use pool_pow::Target;
use std::str::FromStr;

/// Turns daemon block templates into minable jobs.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    pool_tag: Vec<u8>,
    /// extranonce1 + extranonce2 bytes reserved in the scriptSig
    extranonce_size: usize,
    payout_script: Option<Vec<u8>>,
}

impl JobBuilder {
    pub fn new(pool_tag: Vec<u8>, extranonce_size: usize, payout_script: Option<Vec<u8>>) -> Self {
        Self { pool_tag, extranonce_size, payout_script }
    }

    pub fn build(&self, template: &BlockTemplate, job_id: u64) -> TemplateResult<JobTemplate> {
        let prev_hash = parse_hash("previousblockhash", required(template.previous_block_hash.as_deref(), "previousblockhash")?)?;
        let version = required(template.version, "version")?;
        let cur_time = required(template.cur_time, "curtime")?;
        let bits_hex = required(template.bits.as_deref(), "bits")?;
        let bits = u32::from_str_radix(bits_hex, 16).map_err(|_| invalid_hex("bits", bits_hex))?;

        let mut transactions = Vec::with_capacity(template.transactions.len());
        let mut txids = Vec::with_capacity(template.transactions.len());
        for tx in template.transactions.iter() {
            if tx.data.is_empty() {
                return Err(TemplateError::MissingField("transactions.data"));
            }
            let data = hex::decode(&tx.data).map_err(|_| invalid_hex("transactions.data", &tx.data))?;
            let txid = match tx.txid.as_deref() {
                Some(txid) => parse_hash("transactions.txid", txid)?,
                None => sha256d(&data),
            };
            txids.push(txid);
            transactions.push(data);
        }

        let witness_commitment = match template.default_witness_commitment.as_deref() {
            Some(commitment) => Some(hex::decode(commitment).map_err(|_| invalid_hex("default_witness_commitment", commitment))?),
            None => None,
        };

        let coinbase = match template.coinbase_txn.as_ref() {
            Some(txn) => hex::decode(&txn.data).map_err(|_| invalid_hex("coinbasetxn.data", &txn.data))?,
            None => {
                let payout_script = self.payout_script.as_deref().ok_or(TemplateError::MissingField("coinbasetxn"))?;
                let height = required(template.height, "height")?;
                let value = required(template.coinbase_value, "coinbasevalue")?;
                build_coinbase(height, value, payout_script, witness_commitment.as_deref())
            }
        };
        let split = split_coinbase(&coinbase, &self.pool_tag, self.extranonce_size)?;

        let network_target = match template.target.as_deref() {
            Some(target) => Target::from_str(target).map_err(|_| invalid_hex("target", target))?,
            None => Target::from_compact(bits),
        };

        Ok(JobTemplate {
            job_id,
            prev_hash,
            coinbase1: split.part1,
            coinbase2: split.part2,
            merkle_branch: merkle_branch(&txids),
            version,
            bits,
            cur_time,
            clean_jobs: true,
            network_target,
            height: template.height.unwrap_or_default(),
            transactions,
            segwit: witness_commitment.is_some(),
        })
    }
}

fn required<T>(field: Option<T>, name: &'static str) -> TemplateResult<T> {
    field.ok_or(TemplateError::MissingField(name))
}

fn parse_hash(field: &'static str, value: &str) -> TemplateResult<Hash> {
    Hash::from_str(value).map_err(|_| invalid_hex(field, value))
}

fn invalid_hex(field: &'static str, value: &str) -> TemplateError {
    TemplateError::InvalidHex { field, value: value.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::template::CoinbaseTxn, testutils::fixtures};
    use pool_merkle::{calc_merkle_root, fold_merkle_root};
    use std::iter;

    fn builder() -> JobBuilder {
        JobBuilder::new(b"/yeet/".to_vec(), 8, Some(fixtures::payout_script()))
    }

    #[test]
    fn test_build_job_from_template() {
        let template = fixtures::block_template(3);
        let job = builder().build(&template, 7).unwrap();
        assert_eq!(job.job_id, 7);
        assert!(job.clean_jobs);
        assert_eq!(job.version, 0x2000_0000);
        assert_eq!(job.bits, 0x207fffff);
        assert_eq!(job.network_target, Target::from_compact(0x207fffff));
        assert_eq!(job.prev_hash.to_string(), template.previous_block_hash.unwrap());
        assert_eq!(job.transactions.len(), 3);
        assert_eq!(job.merkle_branch.len(), 2);
        assert!(!job.segwit);
    }

    #[test]
    fn test_coinbase_length_grows_by_extranonce_and_tag() {
        let template = fixtures::block_template(2);
        let original = build_coinbase(
            template.height.unwrap(),
            template.coinbase_value.unwrap(),
            &fixtures::payout_script(),
            None,
        );
        let job = builder().build(&template, 1).unwrap();
        for extranonce in [[0u8; 8], [0xff; 8]] {
            let coinbase = job.coinbase(&extranonce[..4], &extranonce[4..]);
            assert_eq!(coinbase.len(), original.len() + 8 + b"/yeet/".len());
        }
    }

    #[test]
    fn test_branch_reproduces_merkle_root_of_original_coinbase() {
        for tx_count in [0, 1, 2, 5, 8] {
            let mut template = fixtures::block_template(tx_count);
            let coinbase = build_coinbase(1, 50, &fixtures::payout_script(), None);
            template.coinbase_txn = Some(CoinbaseTxn { data: hex::encode(&coinbase) });
            let job = builder().build(&template, 1).unwrap();

            let txids: Vec<Hash> = template.transactions.iter().map(|tx| tx.txid.as_deref().unwrap().parse().unwrap()).collect();
            let expected = calc_merkle_root(iter::once(sha256d(&coinbase)).chain(txids).collect::<Vec<_>>().into_iter());
            assert_eq!(fold_merkle_root(sha256d(&coinbase), &job.merkle_branch), expected);
        }
    }

    #[test]
    fn test_txid_falls_back_to_hash_of_data() {
        let mut template = fixtures::block_template(1);
        let with_txid = builder().build(&template, 1).unwrap();
        template.transactions[0].txid = None;
        let without_txid = builder().build(&template, 1).unwrap();
        assert_eq!(with_txid.merkle_branch, without_txid.merkle_branch);
    }

    #[test]
    fn test_target_field_wins_over_bits() {
        let mut template = fixtures::block_template(0);
        template.target = Some("00000000ffff0000000000000000000000000000000000000000000000000000".to_string());
        assert_eq!(builder().build(&template, 1).unwrap().network_target, pool_pow::MAX_TARGET);
        template.target = None;
        assert_eq!(builder().build(&template, 1).unwrap().network_target, Target::from_compact(0x207fffff));
    }

    #[test]
    fn test_witness_commitment_marks_job_segwit() {
        let mut template = fixtures::block_template(1);
        template.default_witness_commitment = Some("6a24aa21a9ed".to_string() + &"00".repeat(32));
        let job = builder().build(&template, 1).unwrap();
        assert!(job.segwit);
        // commitment output follows the payout output in the coinbase tail
        assert!(hex::encode(&job.coinbase2).contains("6a24aa21a9ed"));
    }

    #[test]
    fn test_data_integrity_errors() {
        let mut template = fixtures::block_template(1);
        template.previous_block_hash = None;
        assert_eq!(builder().build(&template, 1), Err(TemplateError::MissingField("previousblockhash")));

        let mut template = fixtures::block_template(1);
        template.bits = Some("zz".to_string());
        assert!(matches!(builder().build(&template, 1), Err(TemplateError::InvalidHex { field: "bits", .. })));

        let mut template = fixtures::block_template(1);
        template.transactions[0].data = "0g".to_string();
        assert!(matches!(builder().build(&template, 1), Err(TemplateError::InvalidHex { field: "transactions.data", .. })));

        // no daemon coinbase and nowhere to pay
        let template = fixtures::block_template(1);
        let no_payout = JobBuilder::new(vec![], 8, None);
        assert_eq!(no_payout.build(&template, 1), Err(TemplateError::MissingField("coinbasetxn")));
        assert!(builder().build(&template, 1).is_ok());
    }
}
