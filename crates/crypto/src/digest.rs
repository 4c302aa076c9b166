//! A common interface over the hash algorithms the TLS cipher suite space
//! requires (§2.2/§4.2): MD5, SHA-1, SHA-256, SHA-384, SHA-512. HMAC and the
//! TLS PRF are written once against this trait instead of once per hash.

/// A Merkle–Damgård hash function exposing streaming `init`/`update`/`final`
/// plus static metadata, per §4.2.
pub trait Digest: Clone {
    /// Block size in bytes (the unit HMAC pads the key to).
    const BLOCK_LEN: usize;
    /// Output digest size in bytes.
    const OUT_LEN: usize;

    fn new() -> Self;
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// One-shot convenience: `init` + `update` + `final` in one call.
pub fn digest<D: Digest>(data: &[u8]) -> Vec<u8> {
    let mut d = D::new();
    d.update(data);
    d.finalize()
}

impl Digest for crate::sha256::Sha256 {
    const BLOCK_LEN: usize = crate::sha256::BLOCK_LEN;
    const OUT_LEN: usize = crate::sha256::OUT_LEN;
    fn new() -> Self {
        crate::sha256::Sha256::new()
    }
    fn update(&mut self, data: &[u8]) {
        crate::sha256::Sha256::update(self, data)
    }
    fn finalize(self) -> Vec<u8> {
        crate::sha256::Sha256::finalize(self).to_vec()
    }
}

impl Digest for crate::md5::Md5 {
    const BLOCK_LEN: usize = crate::md5::BLOCK_LEN;
    const OUT_LEN: usize = crate::md5::OUT_LEN;
    fn new() -> Self {
        crate::md5::Md5::new()
    }
    fn update(&mut self, data: &[u8]) {
        crate::md5::Md5::update(self, data)
    }
    fn finalize(self) -> Vec<u8> {
        crate::md5::Md5::finalize(self).to_vec()
    }
}

impl Digest for crate::sha1::Sha1 {
    const BLOCK_LEN: usize = crate::sha1::BLOCK_LEN;
    const OUT_LEN: usize = crate::sha1::OUT_LEN;
    fn new() -> Self {
        crate::sha1::Sha1::new()
    }
    fn update(&mut self, data: &[u8]) {
        crate::sha1::Sha1::update(self, data)
    }
    fn finalize(self) -> Vec<u8> {
        crate::sha1::Sha1::finalize(self).to_vec()
    }
}

impl Digest for crate::sha2_64::Sha384 {
    const BLOCK_LEN: usize = crate::sha2_64::BLOCK_LEN;
    const OUT_LEN: usize = 48;
    fn new() -> Self {
        crate::sha2_64::Sha384::new()
    }
    fn update(&mut self, data: &[u8]) {
        crate::sha2_64::Sha384::update(self, data)
    }
    fn finalize(self) -> Vec<u8> {
        crate::sha2_64::Sha384::finalize(self).to_vec()
    }
}

impl Digest for crate::sha2_64::Sha512 {
    const BLOCK_LEN: usize = crate::sha2_64::BLOCK_LEN;
    const OUT_LEN: usize = 64;
    fn new() -> Self {
        crate::sha2_64::Sha512::new()
    }
    fn update(&mut self, data: &[u8]) {
        crate::sha2_64::Sha512::update(self, data)
    }
    fn finalize(self) -> Vec<u8> {
        crate::sha2_64::Sha512::finalize(self).to_vec()
    }
}
