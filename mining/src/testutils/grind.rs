use crate::{model::job::JobTemplate, share::candidate_header};
use pool_pow::Target;

/// Finds the first nonce, at the job's own time, whose header hash meets
/// `meets` but not `misses`.
pub fn nonce_between(job: &JobTemplate, extranonce1: &[u8], extranonce2: &[u8], meets: &Target, misses: &Target) -> u32 {
    (0..=u32::MAX)
        .find(|&nonce| {
            let hash = candidate_header(job, extranonce1, extranonce2, job.cur_time, nonce).0.hash();
            meets.is_met_by(&hash) && !misses.is_met_by(&hash)
        })
        .expect("no nonce satisfies both targets")
}
