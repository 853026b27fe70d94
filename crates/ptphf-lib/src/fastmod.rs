//! Constant-divisor modular reduction via precomputed reciprocals.
//!
//! Port of Lemire's fastmod scheme: a division-free `a % d` for a divisor
//! fixed at construction time, using the identity
//! `a mod d = high64((M * a mod 2^128) * d)` with `M = floor(2^128 / d) + 1`.
//! The 32-bit family (64-bit magic) backs the additive displacement path;
//! the 64-bit family (128-bit magic) backs bucketing and XOR displacement.

/// Compute the 64-bit magic number for a 32-bit divisor `d >= 1`.
#[inline]
pub fn compute_m_u32(d: u32) -> u64 {
    (u64::MAX / d as u64).wrapping_add(1)
}

/// `a % d` for the magic `m = compute_m_u32(d)`.
#[inline]
pub fn fastmod_u32(a: u32, m: u64, d: u32) -> u32 {
    let lowbits = m.wrapping_mul(a as u64);
    ((lowbits as u128 * d as u128) >> 64) as u32
}

/// `a / d` for the magic `m = compute_m_u32(d)`.
#[inline]
pub fn fastdiv_u32(a: u32, m: u64) -> u32 {
    ((m as u128 * a as u128) >> 64) as u32
}

/// Compute the 128-bit magic number for a 64-bit divisor `d >= 1`.
/// For `d == 1` the magic wraps to 0 and the reduction yields 0, as it must.
#[inline]
pub fn compute_m_u64(d: u64) -> u128 {
    (u128::MAX / d as u128).wrapping_add(1)
}

/// `a % d` for the magic `m = compute_m_u64(d)`.
#[inline]
pub fn fastmod_u64(a: u64, m: u128, d: u64) -> u64 {
    let lowbits = m.wrapping_mul(a as u128);
    mul128_high64(lowbits, d)
}

/// High 64 bits of the 192-bit product `lowbits * d`.
#[inline]
fn mul128_high64(lowbits: u128, d: u64) -> u64 {
    let bottom_half = ((lowbits & u64::MAX as u128) * d as u128) >> 64;
    let top_half = (lowbits >> 64) * d as u128;
    (((bottom_half + top_half) >> 64) & u64::MAX as u128) as u64
}
