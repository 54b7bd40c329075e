//! Bitcoin transaction serialization primitives.

/// Appends a CompactSize unsigned integer.
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Reads a CompactSize from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn read_compact_size(bytes: &[u8]) -> Option<(u64, usize)> {
    let (&prefix, rest) = bytes.split_first()?;
    match prefix {
        0xfd => Some((u16::from_le_bytes(rest.get(..2)?.try_into().ok()?) as u64, 3)),
        0xfe => Some((u32::from_le_bytes(rest.get(..4)?.try_into().ok()?) as u64, 5)),
        0xff => Some((u64::from_le_bytes(rest.get(..8)?.try_into().ok()?), 9)),
        n => Some((n as u64, 1)),
    }
}

/// Script push of a block height as BIP34 requires it, matching how a
/// `CScript << height` serializes: small values use `OP_0`/`OP_1..OP_16`,
/// anything else a minimal signed little-endian number push.
pub fn push_script_num(out: &mut Vec<u8>, value: i64) {
    if value == 0 {
        out.push(0x00);
        return;
    }
    if value == -1 || (1..=16).contains(&value) {
        out.push((0x50 + value) as u8);
        return;
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut num = Vec::with_capacity(9);
    while abs > 0 {
        num.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // the top bit carries the sign
    if num.last().is_some_and(|b| b & 0x80 != 0) {
        num.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        if let Some(last) = num.last_mut() {
            *last |= 0x80;
        }
    }
    out.push(num.len() as u8);
    out.extend_from_slice(&num);
}
