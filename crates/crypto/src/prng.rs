/// Random byte sources implementing [`common::RandomSource`], consumed by
/// `bignum::Bignum::rand` (§4.1) and by key/IV/nonce generation throughout
/// the handshake.
use common::RandomSource;

/// OS-entropy source backed by `/dev/urandom`, same approach the legacy
/// X25519 key generator used before this spec replaced it.
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        use std::io::Read;
        if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
            let _ = f.read_exact(buf);
        }
    }
}

/// Deterministic PRNG seeded from a 64-bit value, for reproducible tests and
/// simulation. Not suitable for production key generation.
///
/// xorshift64* — small, fast, and not cryptographically secure; this crate
/// uses it only where a test needs a repeatable byte stream.
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    pub fn new(seed: u64) -> Self {
        Self { state: if seed == 0 { 0xdead_beef_cafe_babe } else { seed } }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }
}

impl RandomSource for Xorshift64 {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        let mut chunks = buf.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let bytes = self.next_u64().to_le_bytes();
            rem.copy_from_slice(&bytes[..rem.len()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_deterministic_for_same_seed() {
        let mut a = Xorshift64::new(42);
        let mut b = Xorshift64::new(42);
        let mut buf_a = [0u8; 37];
        let mut buf_b = [0u8; 37];
        a.fill_bytes(&mut buf_a);
        b.fill_bytes(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn xorshift_differs_across_seeds() {
        let mut a = Xorshift64::new(1);
        let mut b = Xorshift64::new(2);
        let mut buf_a = [0u8; 16];
        let mut buf_b = [0u8; 16];
        a.fill_bytes(&mut buf_a);
        b.fill_bytes(&mut buf_b);
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn xorshift_zero_seed_is_remapped() {
        let mut a = Xorshift64::new(0);
        let mut buf = [0u8; 8];
        a.fill_bytes(&mut buf);
        assert_ne!(buf, [0u8; 8]);
    }

    #[test]
    fn xorshift_handles_partial_final_chunk() {
        let mut a = Xorshift64::new(7);
        let mut buf = [0u8; 3];
        a.fill_bytes(&mut buf);
        assert_ne!(buf, [0u8; 3]);
    }
}
