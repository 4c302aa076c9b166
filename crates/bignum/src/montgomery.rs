//! Montgomery modular exponentiation.
//!
//! Grounded in the odd-modulus branch of `mpiExpMod`: precompute `R^2 mod p`
//! where `R = 2^(32k)`, convert the base into Montgomery form, run a
//! left-to-right square-and-multiply ladder entirely in Montgomery space,
//! and convert the result back out with one more reduction. The reduction
//! constant `m0inv = -p[0]^-1 mod 2^32` is derived by Newton's iteration
//! rather than a generic extended-Euclid call, matching `mpiMontgomeryRed`.

use crate::Bignum;
use common::StackError;
use std::cmp::Ordering;

/// Precomputed Montgomery parameters for a fixed odd modulus `p`.
pub struct MontgomeryContext {
    pub k: usize,
    pub m0inv: u32,
    pub p_limbs: Vec<u32>,
    /// `R^2 mod p`, used to move values into Montgomery form.
    pub r2: Bignum,
}

impl MontgomeryContext {
    pub fn new(p: &Bignum) -> Result<Self, StackError> {
        let k = p.limb_count();
        if k == 0 {
            return Err(StackError::InvalidParameter("modulus is zero"));
        }
        if p.limbs[0] & 1 == 0 {
            return Err(StackError::InvalidParameter("modulus must be odd for Montgomery form"));
        }
        let m0inv = compute_m0inv(p.limbs[0]);
        let mut p_limbs = p.limbs.clone();
        p_limbs.resize(k, 0);
        let r2 = pow2_mod(64 * k as u32, p)?;
        Ok(Self { k, m0inv, p_limbs, r2 })
    }

    /// Move `a` into Montgomery form: `a * R mod p`.
    pub fn to_mont(&self, a: &Bignum, p: &Bignum) -> Result<Bignum, StackError> {
        let a = a.mod_nonneg(p)?;
        Ok(mont_mul(&a, &self.r2, &self.p_limbs, self.k, self.m0inv))
    }

    /// Move `a_mont` out of Montgomery form: `a_mont * R^-1 mod p`.
    pub fn from_mont(&self, a_mont: &Bignum) -> Bignum {
        mont_mul(a_mont, &Bignum::from_u64(1), &self.p_limbs, self.k, self.m0inv)
    }
}

/// Newton's-iteration derivation of `-p0^-1 mod 2^32`: start from the
/// 3-bit-correct approximation `2 - p0` and double the correct bit count on
/// each of 4 rounds, then negate.
fn compute_m0inv(p0: u32) -> u32 {
    let mut m = 2u32.wrapping_sub(p0);
    for _ in 0..4 {
        m = m.wrapping_mul(2u32.wrapping_sub(m.wrapping_mul(p0)));
    }
    m.wrapping_neg()
}

/// `2^bits mod p`, used to compute `R^2 mod p`.
fn pow2_mod(bits: u32, p: &Bignum) -> Result<Bignum, StackError> {
    Bignum::from_u64(1).shift_left(bits).mod_nonneg(p)
}

fn cmp_limbs(a: &[u32], b: &[u32]) -> Ordering {
    for i in (0..a.len().max(b.len())).rev() {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        if av != bv {
            return av.cmp(&bv);
        }
    }
    Ordering::Equal
}

fn sub_limbs_inplace(a: &mut [u32], b: &[u32]) {
    let mut borrow = 0i64;
    for i in 0..a.len() {
        let bv = b.get(i).copied().unwrap_or(0) as i64;
        let mut diff = a[i] as i64 - bv - borrow;
        if diff < 0 {
            diff += 1i64 << 32;
            borrow = 1;
        } else {
            borrow = 0;
        }
        a[i] = diff as u32;
    }
}

/// One Montgomery multiplication: `a * b * R^-1 mod p`, per `mpiMontgomeryMul`
/// as a plain multiply followed by `mpiMontgomeryRed`.
pub(crate) fn mont_mul(a: &Bignum, b: &Bignum, p_limbs: &[u32], k: usize, m0inv: u32) -> Bignum {
    let mut t = a.mul(b).limbs;
    t.resize(2 * k + 2, 0);

    for i in 0..k {
        let u = t[i].wrapping_mul(m0inv);
        let mut carry = 0u64;
        for j in 0..k {
            let prod = u as u64 * p_limbs[j] as u64 + t[i + j] as u64 + carry;
            t[i + j] = prod as u32;
            carry = prod >> 32;
        }
        let mut idx = i + k;
        while carry > 0 {
            let sum = t[idx] as u64 + carry;
            t[idx] = sum as u32;
            carry = sum >> 32;
            idx += 1;
        }
    }

    let mut result: Vec<u32> = t[k..2 * k].to_vec();
    if cmp_limbs(&result, p_limbs) != Ordering::Less {
        sub_limbs_inplace(&mut result, p_limbs);
    }
    while result.last() == Some(&0) {
        result.pop();
    }
    Bignum { sign: 1, limbs: result }
}

/// Montgomery-ladder modular exponentiation for odd `p`, per §4.1.
pub fn exp_mod_montgomery(a: &Bignum, e: &Bignum, p: &Bignum) -> Result<Bignum, StackError> {
    let ctx = MontgomeryContext::new(p)?;
    let base_mont = ctx.to_mont(a, p)?;
    let mut result_mont = ctx.to_mont(&Bignum::from_u64(1), p)?;

    let nbits = e.bit_length();
    for i in (0..nbits).rev() {
        result_mont = mont_mul(&result_mont, &result_mont, &ctx.p_limbs, ctx.k, ctx.m0inv);
        if e.bit(i) {
            result_mont = mont_mul(&result_mont, &base_mont, &ctx.p_limbs, ctx.k, ctx.m0inv);
        }
    }

    Ok(ctx.from_mont(&result_mont))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn m0inv_matches_definition() {
        for p0 in [3u32, 5, 0xFFFF_FFFF, 0x8000_0001, 12345679] {
            let m0inv = compute_m0inv(p0);
            // p0 * m0inv == -1 mod 2^32
            assert_eq!(p0.wrapping_mul(m0inv), u32::MAX);
        }
    }

    #[test]
    fn montgomery_matches_direct_exp_mod_small() {
        let a = Bignum::from_u64(7);
        let e = Bignum::from_u64(560);
        let p = Bignum::from_u64(561); // Carmichael number, odd
        let got = exp_mod_montgomery(&a, &e, &p).unwrap();
        assert_eq!(got, Bignum::from_u64(1));
    }

    #[test]
    fn montgomery_matches_reference_for_larger_values() {
        fn reference_pow_mod(mut base: u128, mut exp: u64, m: u128) -> u128 {
            let mut result = 1u128;
            base %= m;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result * base % m;
                }
                base = base * base % m;
                exp >>= 1;
            }
            result
        }
        let cases = [(12345u64, 6789u64, 1000000007u64), (2, 1023, 999999937)];
        for (a, e, p) in cases {
            let got = exp_mod_montgomery(&Bignum::from_u64(a), &Bignum::from_u64(e), &Bignum::from_u64(p)).unwrap();
            assert_eq!(got, Bignum::from_u64(reference_pow_mod(a as u128, e, p as u128) as u64));
        }
    }

    #[test]
    fn rejects_even_modulus() {
        let p = Bignum::from_u64(10);
        assert!(MontgomeryContext::new(&p).is_err());
    }
}
