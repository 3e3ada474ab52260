#![allow(dead_code)]

/// Big-endian encoding of a sequence of 16-bit words.
pub fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_be_bytes()).collect()
}

/// Append `value` as a big-endian 32-bit word.
pub fn push_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_be_bytes());
}

/// Append `value` as a big-endian 24-bit word.
pub fn push_u24(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_be_bytes()[1..]);
}
