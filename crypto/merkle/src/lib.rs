use pool_hashes::{Hash, Sha256d, ZERO_HASH};

pub fn merkle_hash(left: Hash, right: Hash) -> Hash {
    let mut hasher = Sha256d::new();
    hasher.update(left).update(right);
    hasher.finalize()
}

/// Bitcoin merkle root: each level pairs neighbours and an odd trailing node
/// is paired with itself.
pub fn calc_merkle_root(hashes: impl ExactSizeIterator<Item = Hash>) -> Hash {
    if hashes.len() == 0 {
        return cold_path_empty();
    }
    let mut level: Vec<Hash> = hashes.collect();
    while level.len() > 1 {
        level = level.chunks(2).map(|pair| merkle_hash(pair[0], *pair.get(1).unwrap_or(&pair[0]))).collect();
    }
    level[0]
}

/// Sibling path of the first leaf (the coinbase) for a tree whose remaining
/// leaves are `txids`. This is the `merkle_branch` list of `mining.notify`.
pub fn merkle_branch(txids: &[Hash]) -> Vec<Hash> {
    // Slot 0 stands in for the yet unknown coinbase-side node of each level
    let mut level = Vec::with_capacity(txids.len() + 2);
    level.push(ZERO_HASH);
    level.extend_from_slice(txids);

    let mut branch = Vec::new();
    while level.len() > 1 {
        branch.push(level[1]);
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        next.push(ZERO_HASH);
        next.extend(level[2..].chunks(2).map(|pair| merkle_hash(pair[0], pair[1])));
        level = next;
    }
    branch
}

/// Folds a coinbase hash up a merkle branch, yielding the block merkle root.
pub fn fold_merkle_root(coinbase_hash: Hash, branch: &[Hash]) -> Hash {
    branch.iter().fold(coinbase_hash, |root, step| merkle_hash(root, *step))
}

#[inline(never)]
#[cold]
fn cold_path_empty() -> Hash {
    ZERO_HASH
}
