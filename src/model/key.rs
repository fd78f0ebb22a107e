//! Bit-level helpers for keys and edge labels
//!
//! Keys are arbitrary byte strings read as bit strings, most significant bit
//! first. Internal nodes carry a label: the run of bits on their incoming
//! edge, stored left-aligned with the unused trailing bits cleared.

/// A bit offset or bit length within a key
pub type Depth = u16;

/// Largest key (in bytes) whose bit length still fits a `Depth`
pub const MAX_KEY_SIZE: usize = Depth::MAX as usize / 8;

/// Number of bytes needed to hold `bits` bits
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Length of a key in bits
pub fn bit_length(key: &[u8]) -> usize {
    key.len() * 8
}

/// Read the bit at `index` (0 = most significant bit of the first byte)
pub fn get_bit(key: &[u8], index: usize) -> bool {
    (key[index / 8] >> (7 - index % 8)) & 1 == 1
}

/// Number of leading bits shared by `a` (of `a_bits` bits) and `b` (of `b_bits` bits)
pub fn common_prefix_len(a: &[u8], a_bits: usize, b: &[u8], b_bits: usize) -> usize {
    (0..a_bits.min(b_bits))
        .take_while(|&i| get_bit(a, i) == get_bit(b, i))
        .count()
}

/// Number of leading bits of `label` that `key` matches from bit `offset` on
///
/// Compares in place, so walking a path costs nothing per level beyond the
/// label itself.
pub fn label_match_len(label: &[u8], label_bits: usize, key: &[u8], offset: usize) -> usize {
    let remaining = bit_length(key).saturating_sub(offset);
    (0..label_bits.min(remaining))
        .take_while(|&i| get_bit(label, i) == get_bit(key, offset + i))
        .count()
}

/// Split the first `key_len` bits of `key` at `split_point`
///
/// The prefix keeps its alignment with the trailing bits cleared; the suffix
/// is shifted so that it starts at bit 0.
pub fn split(key: &[u8], split_point: usize, key_len: usize) -> (Vec<u8>, Vec<u8>) {
    let prefix_len = bytes_for_bits(split_point);
    let suffix_len = bytes_for_bits(key_len - split_point);

    let mut prefix = key[..prefix_len].to_vec();
    if split_point % 8 != 0 {
        prefix[prefix_len - 1] &= 0xff << (8 - split_point % 8);
    }

    let shift = split_point % 8;
    let offset = split_point / 8;
    let suffix = (0..suffix_len)
        .map(|i| {
            let mut byte = key[i + offset] << shift;
            if shift != 0 && i + offset + 1 < key.len() {
                byte |= key[i + offset + 1] >> (8 - shift);
            }
            byte
        })
        .collect();

    (prefix, suffix)
}

/// Extract `bits` bits of `key` starting at bit `from`, left-aligned
pub fn extract(key: &[u8], from: usize, bits: usize) -> Vec<u8> {
    let (_, suffix) = split(key, from, bit_length(key));
    let (prefix, _) = split(&suffix, bits, bit_length(&suffix));
    prefix
}

/// Concatenate the first `a_bits` bits of `a` with the first `b_bits` bits of `b`
pub fn merge(a: &[u8], a_bits: usize, b: &[u8], b_bits: usize) -> Vec<u8> {
    let mut out = vec![0u8; bytes_for_bits(a_bits + b_bits)];
    let bits = (0..a_bits)
        .map(|i| get_bit(a, i))
        .chain((0..b_bits).map(|i| get_bit(b, i)));
    for (i, bit) in bits.enumerate() {
        if bit {
            out[i / 8] |= 1 << (7 - i % 8);
        }
    }
    out
}
