/// HMAC per RFC 2104, generic over any [`Digest`](crate::digest::Digest).
///
/// HMAC(K, m) = H((K' ⊕ opad) || H((K' ⊕ ipad) || m))
/// where K' is the key padded/hashed to block size. TLS's PRF (§4.2) needs
/// this keyed over MD5, SHA-1, SHA-256 and SHA-384 depending on version and
/// cipher suite, so the block-size/output-size constants come from `D`
/// instead of being hardcoded to one hash.
use crate::digest::Digest;

pub struct Hmac<D: Digest> {
    inner: D,
    outer_key_pad: Vec<u8>,
}

impl<D: Digest> Hmac<D> {
    pub fn new(key: &[u8]) -> Self {
        let mut k_prime = vec![0u8; D::BLOCK_LEN];
        if key.len() > D::BLOCK_LEN {
            let hashed = crate::digest::digest::<D>(key);
            k_prime[..hashed.len()].copy_from_slice(&hashed);
        } else {
            k_prime[..key.len()].copy_from_slice(key);
        }

        let mut ipad = vec![0u8; D::BLOCK_LEN];
        let mut opad = vec![0u8; D::BLOCK_LEN];
        for i in 0..D::BLOCK_LEN {
            ipad[i] = k_prime[i] ^ 0x36;
            opad[i] = k_prime[i] ^ 0x5c;
        }

        let mut inner = D::new();
        inner.update(&ipad);

        Self { inner, outer_key_pad: opad }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Vec<u8> {
        let inner_hash = self.inner.finalize();
        let mut outer = D::new();
        outer.update(&self.outer_key_pad);
        outer.update(&inner_hash);
        outer.finalize()
    }
}

pub fn hmac<D: Digest>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<D>::new(key);
    mac.update(data);
    mac.finalize()
}

/// HMAC-SHA256 streaming authenticator, kept as a concrete alias since
/// TLS 1.2's default PRF and the key schedule's HKDF use it directly.
pub struct HmacSha256(Hmac<crate::sha256::Sha256>);

impl HmacSha256 {
    pub fn new(key: &[u8]) -> Self {
        Self(Hmac::new(key))
    }
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data)
    }
    pub fn finalize(self) -> [u8; 32] {
        self.0.finalize().try_into().unwrap()
    }
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    hmac::<crate::sha256::Sha256>(key, data).try_into().unwrap()
}
