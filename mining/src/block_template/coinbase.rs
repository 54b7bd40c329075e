use crate::errors::{TemplateError, TemplateResult};
use pool_pow::encoding::{push_script_num, read_compact_size, write_compact_size};

/// Consensus limit on a coinbase scriptSig.
pub const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;

// zero txid and output index 0xffffffff
const NULL_OUTPOINT: [u8; 36] = {
    let mut outpoint = [0u8; 36];
    let mut i = 32;
    while i < 36 {
        outpoint[i] = 0xff;
        i += 1;
    }
    outpoint
};

/// Builds a stripped coinbase transaction paying `value` to `payout_script`,
/// with a BIP34 height scriptSig and an optional witness commitment output.
pub fn build_coinbase(height: u64, value: u64, payout_script: &[u8], witness_commitment: Option<&[u8]>) -> Vec<u8> {
    let mut script_sig = Vec::with_capacity(9);
    push_script_num(&mut script_sig, height as i64);

    let mut tx = Vec::with_capacity(128 + payout_script.len());
    tx.extend_from_slice(&1u32.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&NULL_OUTPOINT);
    write_compact_size(&mut tx, script_sig.len() as u64);
    tx.extend_from_slice(&script_sig);
    tx.extend_from_slice(&u32::MAX.to_le_bytes());

    write_compact_size(&mut tx, if witness_commitment.is_some() { 2 } else { 1 });
    tx.extend_from_slice(&value.to_le_bytes());
    write_compact_size(&mut tx, payout_script.len() as u64);
    tx.extend_from_slice(payout_script);
    if let Some(commitment) = witness_commitment {
        tx.extend_from_slice(&0u64.to_le_bytes());
        write_compact_size(&mut tx, commitment.len() as u64);
        tx.extend_from_slice(commitment);
    }

    tx.extend_from_slice(&0u32.to_le_bytes());
    tx
}

/// A coinbase cut around the extranonce injection point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseSplit {
    pub part1: Vec<u8>,
    pub part2: Vec<u8>,
}

/// Splits a stripped coinbase so that `part1 || extranonce || part2` is the
/// same transaction with `extranonce || tag` appended to its scriptSig. The
/// scriptSig length prefix in `part1` already accounts for both.
pub fn split_coinbase(coinbase: &[u8], tag: &[u8], extranonce_size: usize) -> TemplateResult<CoinbaseSplit> {
    // version
    let mut offset = 4;
    if coinbase.len() <= offset {
        return Err(TemplateError::MalformedCoinbase("truncated before the input count"));
    }
    if coinbase[offset] == 0x00 {
        return Err(TemplateError::MalformedCoinbase("witness serialization is not supported"));
    }
    let (input_count, consumed) =
        read_compact_size(&coinbase[offset..]).ok_or(TemplateError::MalformedCoinbase("truncated input count"))?;
    if input_count != 1 {
        return Err(TemplateError::MalformedCoinbase("coinbase must have exactly one input"));
    }
    offset += consumed + NULL_OUTPOINT.len();
    let head_end = offset;

    let (script_len, consumed) =
        read_compact_size(coinbase.get(offset..).unwrap_or_default()).ok_or(TemplateError::MalformedCoinbase("truncated scriptSig length"))?;
    offset += consumed;
    let script_end = offset.checked_add(script_len as usize).ok_or(TemplateError::MalformedCoinbase("scriptSig length overflow"))?;
    let script_sig = coinbase.get(offset..script_end).ok_or(TemplateError::MalformedCoinbase("truncated scriptSig"))?;
    let tail = &coinbase[script_end..];
    // sequence and lock time at the very least
    if tail.len() < 8 {
        return Err(TemplateError::MalformedCoinbase("truncated after scriptSig"));
    }

    let new_script_len = script_sig.len() + extranonce_size + tag.len();
    if new_script_len > MAX_COINBASE_SCRIPT_SIG_SIZE {
        return Err(TemplateError::ScriptSigTooLong(new_script_len));
    }

    let mut part1 = Vec::with_capacity(head_end + 1 + script_sig.len());
    part1.extend_from_slice(&coinbase[..head_end]);
    write_compact_size(&mut part1, new_script_len as u64);
    part1.extend_from_slice(script_sig);

    let mut part2 = Vec::with_capacity(tag.len() + tail.len());
    part2.extend_from_slice(tag);
    part2.extend_from_slice(tail);

    Ok(CoinbaseSplit { part1, part2 })
}

#[cfg(test)]
mod tests {
    use super::*;

    const P2WPKH: [u8; 22] = [
        0x00, 0x14, 0x75, 0x1e, 0x76, 0xe8, 0x19, 0x91, 0x96, 0xd4, 0x54, 0x94, 0x1c, 0x45, 0xd1, 0xb3, 0xa3, 0x23, 0xf1, 0x43, 0x3b, 0xd6,
    ];

    #[test]
    fn test_build_coinbase_layout() {
        let tx = build_coinbase(500_000, 625_000_000, &P2WPKH, None);
        assert_eq!(&tx[..5], &[1, 0, 0, 0, 1]);
        assert!(tx[5..37].iter().all(|b| *b == 0));
        assert_eq!(&tx[37..41], &[0xff; 4]);
        // scriptSig: length 4, push of three height bytes
        assert_eq!(&tx[41..46], &[0x04, 0x03, 0x20, 0xa1, 0x07]);
        assert_eq!(&tx[46..50], &[0xff; 4]);
        assert_eq!(tx[50], 1);
        assert_eq!(&tx[51..59], &625_000_000u64.to_le_bytes());
        assert_eq!(tx[59] as usize, P2WPKH.len());
        assert_eq!(&tx[60..82], &P2WPKH);
        assert_eq!(&tx[82..], &[0, 0, 0, 0]);

        let commitment = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];
        let with_commitment = build_coinbase(500_000, 625_000_000, &P2WPKH, Some(&commitment));
        assert_eq!(with_commitment[50], 2);
        assert_eq!(with_commitment.len(), tx.len() + 8 + 1 + commitment.len());
    }

    #[test]
    fn test_split_preserves_transaction() {
        let tag = b"/yeet/";
        let tx = build_coinbase(17, 5_000_000_000, &P2WPKH, None);
        let split = split_coinbase(&tx, tag, 8).unwrap();

        let extranonce = [0xeeu8; 8];
        let rebuilt = [split.part1.as_slice(), &extranonce, &split.part2].concat();
        assert_eq!(rebuilt.len(), tx.len() + extranonce.len() + tag.len());

        // scriptSig is now height push || extranonce || tag
        assert_eq!(rebuilt[41] as usize, 2 + extranonce.len() + tag.len());
        assert_eq!(&rebuilt[42..44], &[0x01, 0x11]);
        assert_eq!(&rebuilt[44..52], &extranonce);
        assert_eq!(&rebuilt[52..58], tag);
        // everything after the scriptSig is untouched
        assert_eq!(&rebuilt[58..], &tx[44..]);
        assert_eq!(&rebuilt[..41], &tx[..41]);
    }

    #[test]
    fn test_split_rejects_malformed() {
        let tx = build_coinbase(17, 50, &P2WPKH, None);
        assert!(matches!(split_coinbase(&tx[..3], b"", 8), Err(TemplateError::MalformedCoinbase(_))));
        assert!(matches!(split_coinbase(&tx[..43], b"", 8), Err(TemplateError::MalformedCoinbase(_))));

        let mut two_inputs = tx.clone();
        two_inputs[4] = 2;
        assert!(matches!(split_coinbase(&two_inputs, b"", 8), Err(TemplateError::MalformedCoinbase(_))));

        let mut witness = tx.clone();
        witness.splice(4..4, [0x00, 0x01]);
        assert!(matches!(split_coinbase(&witness, b"", 8), Err(TemplateError::MalformedCoinbase(_))));

        assert!(split_coinbase(&tx, &[0u8; 90], 8).is_ok());
        assert_eq!(split_coinbase(&tx, &[0u8; 91], 8), Err(TemplateError::ScriptSigTooLong(101)));
    }
}
