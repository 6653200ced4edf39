//! Hash functions for ReddBlock
//!
//! Murmur3 32-bit is used to derive short, stable keyword ids. Ids only have
//! to be unique within one settings record, so a 32-bit hash rendered in
//! base 36 is plenty; collisions are resolved by re-seeding.

/// Seed used for the first id attempt.
pub const ID_SEED: u32 = 0x9e3779b9; // Golden ratio

/// Murmur3 32-bit hash implementation.
/// Optimized for short strings (typical keyword lengths).
#[inline]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let len = data.len();
    let mut h = seed;
    let mut i = 0;

    // Process 4-byte chunks
    let chunks = (len >> 2) << 2;
    while i < chunks {
        let k = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        h ^= scramble(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
        i += 4;
    }

    // Tail
    let mut k: u32 = 0;
    let remainder = len & 3;
    if remainder >= 3 {
        k ^= (data[i + 2] as u32) << 16;
    }
    if remainder >= 2 {
        k ^= (data[i + 1] as u32) << 8;
    }
    if remainder >= 1 {
        k ^= data[i] as u32;
        h ^= scramble(k);
    }

    // Finalization
    h ^= len as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;

    h
}

#[inline]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(0xcc9e2d51)
        .rotate_left(15)
        .wrapping_mul(0x1b873593)
}

/// Render a value in lowercase base 36.
pub fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(7);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    // Only ASCII digits were pushed
    String::from_utf8(buf).unwrap_or_default()
}

/// Derive a keyword id from its text, creation time and a seed.
///
/// The text is lowercased first so the same keyword typed with a different
/// case at the same instant hashes identically.
pub fn keyword_id(text: &str, created_at: u64, seed: u32) -> String {
    let mut data = text.to_lowercase().into_bytes();
    data.extend_from_slice(&created_at.to_le_bytes());
    to_base36(murmur3_32(&data, seed))
}
