use crate::{errors::ShareRejection, model::job::JobTemplate};
use pool_hashes::{Hash, sha256d};
use pool_merkle::fold_merkle_root;
use pool_pow::{BlockHeader, Target, target::hash_difficulty};

/// A `mining.submit` as the miner sent it, fields still in wire hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub worker_name: String,
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
}

/// The measured proof of work of a share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShareProof {
    pub hash: Hash,
    /// `MAX_TARGET / hash`
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Rejected(ShareRejection),
    Accepted(ShareProof),
    /// The share also meets the network target. Carries the serialized block.
    BlockFound(ShareProof, Vec<u8>),
}

/// Rebuilds the candidate header for a set of miner-chosen values, returning
/// it along with the coinbase it commits to.
pub fn candidate_header(job: &JobTemplate, extranonce1: &[u8], extranonce2: &[u8], ntime: u32, nonce: u32) -> (BlockHeader, Vec<u8>) {
    let coinbase = job.coinbase(extranonce1, extranonce2);
    let merkle_root = fold_merkle_root(sha256d(&coinbase), &job.merkle_branch);
    let header = BlockHeader { version: job.version, prev_hash: job.prev_hash, merkle_root, time: ntime, bits: job.bits, nonce };
    (header, coinbase)
}

/// Validates a share against the job it claims and the worker's target.
///
/// Only the job passed in is honored: a share naming any other job id is
/// stale. A share meeting the network target is a block even when it misses
/// the worker target.
pub fn validate(extranonce1: &[u8], job: &JobTemplate, share: &Share, worker_target: &Target, extranonce2_size: usize) -> Verdict {
    match check(extranonce1, job, share, worker_target, extranonce2_size) {
        Ok(verdict) => verdict,
        Err(rejection) => Verdict::Rejected(rejection),
    }
}

fn check(
    extranonce1: &[u8],
    job: &JobTemplate,
    share: &Share,
    worker_target: &Target,
    extranonce2_size: usize,
) -> Result<Verdict, ShareRejection> {
    if share.extranonce2.len() != extranonce2_size * 2 {
        return Err(ShareRejection::InvalidExtranonce2);
    }
    let extranonce2 = hex::decode(&share.extranonce2).map_err(|_| ShareRejection::InvalidExtranonce2)?;

    if u64::from_str_radix(&share.job_id, 16).ok() != Some(job.job_id) {
        return Err(ShareRejection::StaleJob);
    }

    let ntime = parse_u32(&share.ntime).ok_or(ShareRejection::MalformedField("ntime"))?;
    let nonce = parse_u32(&share.nonce).ok_or(ShareRejection::MalformedField("nonce"))?;

    let (header, coinbase) = candidate_header(job, extranonce1, &extranonce2, ntime, nonce);
    let hash = header.hash();
    let proof = ShareProof { hash, difficulty: hash_difficulty(&hash) };

    if job.network_target.is_met_by(&hash) {
        return Ok(Verdict::BlockFound(proof, job.assemble_block(&header, &coinbase)));
    }
    if !worker_target.is_met_by(&hash) {
        return Err(ShareRejection::LowDifficulty);
    }
    Ok(Verdict::Accepted(proof))
}

/// Parses the 8 hex digit big-endian form Stratum uses for `ntime` and `nonce`.
fn parse_u32(value: &str) -> Option<u32> {
    if value.len() != 8 {
        return None;
    }
    u32::from_str_radix(value, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{fixtures, grind};
    use pool_pow::MAX_TARGET;

    const EXTRANONCE1: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
    const EXTRANONCE2_SIZE: usize = 4;

    fn share(job: &JobTemplate, extranonce2: &str, nonce: u32) -> Share {
        Share {
            worker_name: "alice".to_string(),
            job_id: job.job_id_hex(),
            extranonce2: extranonce2.to_string(),
            ntime: format!("{:08x}", job.cur_time),
            nonce: format!("{:08x}", nonce),
        }
    }

    #[test]
    fn test_wrong_extranonce2_length_is_rejected_first() {
        let job = fixtures::job_template(2, fixtures::HARD_BITS);
        let mut bad = share(&job, "0000", 0);
        bad.job_id = "ffff".to_string();
        assert_eq!(validate(&EXTRANONCE1, &job, &bad, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::InvalidExtranonce2));
        let bad = share(&job, "0000000z", 0);
        assert_eq!(validate(&EXTRANONCE1, &job, &bad, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::InvalidExtranonce2));
    }

    #[test]
    fn test_other_job_ids_are_stale() {
        let job = fixtures::job_template(2, fixtures::HARD_BITS);
        let mut stale = share(&job, "00000000", 0);
        stale.job_id = format!("{:x}", job.job_id - 1);
        assert_eq!(validate(&EXTRANONCE1, &job, &stale, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::StaleJob));
        stale.job_id = "not-hex".to_string();
        assert_eq!(validate(&EXTRANONCE1, &job, &stale, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::StaleJob));
    }

    #[test]
    fn test_malformed_ntime_and_nonce() {
        let job = fixtures::job_template(0, fixtures::HARD_BITS);
        let mut bad = share(&job, "00000000", 0);
        bad.ntime = "123".to_string();
        assert_eq!(validate(&EXTRANONCE1, &job, &bad, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::MalformedField("ntime")));
        let mut bad = share(&job, "00000000", 0);
        bad.nonce = "xxxxxxxx".to_string();
        assert_eq!(validate(&EXTRANONCE1, &job, &bad, &MAX_TARGET, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::MalformedField("nonce")));
    }

    #[test]
    fn test_accepted_share_meets_worker_target_only() {
        let job = fixtures::job_template(3, fixtures::HARD_BITS);
        let worker_target = Target::from_difficulty(fixtures::EASY_DIFFICULTY);
        let extranonce2 = [0, 0, 0, 1];
        let nonce = grind::nonce_between(&job, &EXTRANONCE1, &extranonce2, &worker_target, &job.network_target);

        let verdict = validate(&EXTRANONCE1, &job, &share(&job, "00000001", nonce), &worker_target, EXTRANONCE2_SIZE);
        let Verdict::Accepted(proof) = verdict else { panic!("expected an accepted share, got {verdict:?}") };
        assert!(worker_target.is_met_by(&proof.hash));
        assert!(proof.difficulty >= fixtures::EASY_DIFFICULTY);

        // same inputs, same verdict
        assert_eq!(validate(&EXTRANONCE1, &job, &share(&job, "00000001", nonce), &worker_target, EXTRANONCE2_SIZE), Verdict::Accepted(proof));
        // a different extranonce1 commits to a different coinbase
        let other = validate(&[0, 0, 0, 0], &job, &share(&job, "00000001", nonce), &worker_target, EXTRANONCE2_SIZE);
        assert_ne!(other, Verdict::Accepted(proof));
    }

    #[test]
    fn test_easier_target_accepts_everything_a_harder_one_does() {
        let job = fixtures::job_template(1, fixtures::HARD_BITS);
        let hard = Target::from_difficulty(fixtures::EASY_DIFFICULTY);
        let easy = Target::from_difficulty(fixtures::EASY_DIFFICULTY / 16.0);
        let extranonce2 = [0, 0, 0, 2];
        let nonce = grind::nonce_between(&job, &EXTRANONCE1, &extranonce2, &hard, &job.network_target);
        let submitted = share(&job, "00000002", nonce);
        assert!(matches!(validate(&EXTRANONCE1, &job, &submitted, &hard, EXTRANONCE2_SIZE), Verdict::Accepted(_)));
        assert!(matches!(validate(&EXTRANONCE1, &job, &submitted, &easy, EXTRANONCE2_SIZE), Verdict::Accepted(_)));

        let nonce = grind::nonce_between(&job, &EXTRANONCE1, &extranonce2, &easy, &hard);
        let submitted = share(&job, "00000002", nonce);
        assert_eq!(validate(&EXTRANONCE1, &job, &submitted, &hard, EXTRANONCE2_SIZE), Verdict::Rejected(ShareRejection::LowDifficulty));
        assert!(matches!(validate(&EXTRANONCE1, &job, &submitted, &easy, EXTRANONCE2_SIZE), Verdict::Accepted(_)));
    }

    #[test]
    fn test_block_found_assembles_the_miner_coinbase() {
        let job = fixtures::job_template(2, fixtures::EASY_BITS);
        let extranonce2 = [0, 0, 0, 3];
        let nonce = grind::nonce_between(&job, &EXTRANONCE1, &extranonce2, &job.network_target, &Target::ZERO);
        let verdict = validate(&EXTRANONCE1, &job, &share(&job, "00000003", nonce), &MAX_TARGET, EXTRANONCE2_SIZE);
        let Verdict::BlockFound(proof, block) = verdict else { panic!("expected a block, got {verdict:?}") };

        let (header, coinbase) = candidate_header(&job, &EXTRANONCE1, &extranonce2, job.cur_time, nonce);
        assert_eq!(proof.hash, header.hash());
        assert_eq!(&block[..80], &header.serialize());
        assert_eq!(block[80] as usize, 1 + job.transactions.len());
        assert_eq!(&block[81..81 + coinbase.len()], coinbase.as_slice());
        assert!(block.ends_with(job.transactions.last().unwrap()));
    }

    #[test]
    fn test_low_difficulty_share() {
        let job = fixtures::job_template(0, fixtures::HARD_BITS);
        let worker_target = Target::from_difficulty(fixtures::EASY_DIFFICULTY);
        let extranonce2 = [0, 0, 0, 4];
        let nonce = grind::nonce_between(&job, &EXTRANONCE1, &extranonce2, &Target::from_be_bytes([0xff; 32]), &worker_target);
        assert_eq!(
            validate(&EXTRANONCE1, &job, &share(&job, "00000004", nonce), &worker_target, EXTRANONCE2_SIZE),
            Verdict::Rejected(ShareRejection::LowDifficulty)
        );
    }
}
