/// RSA encryption, decryption, and PKCS#1 v1.5 signing/verification (§4.3).
use bignum::Bignum;
use common::{RandomSource, StackError};

/// Public key: modulus and public exponent.
#[derive(Clone, Debug, PartialEq)]
pub struct RsaPublicKey {
    pub n: Bignum,
    pub e: Bignum,
}

/// Private key. CRT parameters are optional; when present `decrypt`/`sign`
/// use the CRT fast path, otherwise the plain `c^d mod n` path.
#[derive(Clone, Debug, PartialEq)]
pub struct RsaPrivateKey {
    pub n: Bignum,
    pub e: Bignum,
    pub d: Bignum,
    pub p: Option<Bignum>,
    pub q: Option<Bignum>,
    pub d_p: Option<Bignum>,
    pub d_q: Option<Bignum>,
    pub q_inv: Option<Bignum>,
}

/// DigestInfo DER prefixes for the hash algorithms §4.6 recognizes in
/// signature OIDs, keyed by output length in bytes so callers can pick the
/// matching prefix from a raw digest without re-threading the algorithm tag.
fn digest_info_prefix(hash_len: usize) -> Result<&'static [u8], StackError> {
    match hash_len {
        16 => Ok(&[
            0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05,
            0x05, 0x00, 0x04, 0x10,
        ]),
        20 => Ok(&[
            0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
            0x14,
        ]),
        32 => Ok(&[
            0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x01, 0x05, 0x00, 0x04, 0x20,
        ]),
        48 => Ok(&[
            0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x02, 0x05, 0x00, 0x04, 0x30,
        ]),
        64 => Ok(&[
            0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x03, 0x05, 0x00, 0x04, 0x40,
        ]),
        _ => Err(StackError::UnsupportedSignatureAlgo),
    }
}

fn modulus_len(n: &Bignum) -> usize {
    n.to_bytes_be().len().max(1)
}

/// `encrypt(pub, m) = m^e mod n` per §4.3.
pub fn encrypt(key: &RsaPublicKey, m: &Bignum) -> Result<Bignum, StackError> {
    m.exp_mod(&key.e, &key.n)
}

/// `decrypt(priv, c)`: CRT path when `p, q, dP, dQ, qInv` are present,
/// otherwise the plain `c^d mod n` path.
pub fn decrypt(key: &RsaPrivateKey, c: &Bignum) -> Result<Bignum, StackError> {
    if let (Some(p), Some(q), Some(d_p), Some(d_q), Some(q_inv)) =
        (&key.p, &key.q, &key.d_p, &key.d_q, &key.q_inv)
    {
        let m1 = c.exp_mod(d_p, p)?;
        let m2 = c.exp_mod(d_q, q)?;
        let h = m1.sub(&m2).mul(q_inv).rem(p)?;
        let h = h.mod_nonneg(p)?;
        Ok(m2.add(&h.mul(q)))
    } else {
        c.exp_mod(&key.d, &key.n)
    }
}

/// PKCS#1 v1.5 encryption padding (block type 02): `0x00 0x02 PS 0x00 M`
/// where `PS` is at least 8 nonzero random bytes filling the modulus length.
pub fn pkcs1_pad_encrypt(
    message: &[u8],
    modulus_len: usize,
    rng: &mut dyn RandomSource,
) -> Result<Vec<u8>, StackError> {
    if message.len() + 11 > modulus_len {
        return Err(StackError::InvalidParameter("message too long for RSA modulus"));
    }
    let ps_len = modulus_len - message.len() - 3;
    let mut ps = vec![0u8; ps_len];
    loop {
        rng.fill_bytes(&mut ps);
        if ps.iter().all(|&b| b != 0) {
            break;
        }
    }

    let mut out = Vec::with_capacity(modulus_len);
    out.push(0x00);
    out.push(0x02);
    out.extend_from_slice(&ps);
    out.push(0x00);
    out.extend_from_slice(message);
    Ok(out)
}

/// Strip PKCS#1 v1.5 encryption padding, returning the recovered message.
pub fn pkcs1_unpad_encrypt(block: &[u8]) -> Result<Vec<u8>, StackError> {
    if block.len() < 11 || block[0] != 0x00 || block[1] != 0x02 {
        return Err(StackError::DecodingFailed("invalid PKCS#1 block type 02 header"));
    }
    let sep = block[2..]
        .iter()
        .position(|&b| b == 0x00)
        .ok_or(StackError::DecodingFailed("missing PKCS#1 padding separator"))?;
    if sep < 8 {
        return Err(StackError::DecodingFailed("PKCS#1 padding string shorter than 8 bytes"));
    }
    Ok(block[2 + sep + 1..].to_vec())
}

/// PKCS#1 v1.5 signature padding (block type 01):
/// `0x00 0x01 0xFF...0xFF 0x00 T` where `T` is the DER `DigestInfo`.
pub fn pkcs1_pad_sign(digest: &[u8], modulus_len: usize) -> Result<Vec<u8>, StackError> {
    let prefix = digest_info_prefix(digest.len())?;
    let t_len = prefix.len() + digest.len();
    if t_len + 11 > modulus_len {
        return Err(StackError::InvalidParameter("digest too long for RSA modulus"));
    }
    let ps_len = modulus_len - t_len - 3;

    let mut out = Vec::with_capacity(modulus_len);
    out.push(0x00);
    out.push(0x01);
    out.extend(std::iter::repeat(0xFFu8).take(ps_len));
    out.push(0x00);
    out.extend_from_slice(prefix);
    out.extend_from_slice(digest);
    Ok(out)
}

/// Sign a precomputed digest, returning the raw signature (same byte length
/// as the modulus).
pub fn sign(key: &RsaPrivateKey, digest: &[u8]) -> Result<Vec<u8>, StackError> {
    let n_len = modulus_len(&key.n);
    let padded = pkcs1_pad_sign(digest, n_len)?;
    let m = Bignum::from_bytes_be(&padded);
    let s = decrypt(key, &m)?;
    Ok(s.to_bytes_be_padded(n_len))
}

/// Verify a signature against an expected digest. Per §4.3, the recovered
/// DigestInfo must match the expected encoding byte-exactly; any mismatch
/// fails `INVALID_SIGNATURE`.
pub fn verify(key: &RsaPublicKey, digest: &[u8], signature: &[u8]) -> Result<(), StackError> {
    let n_len = modulus_len(&key.n);
    if signature.len() != n_len {
        return Err(StackError::InvalidSignature);
    }
    let s = Bignum::from_bytes_be(signature);
    let m = encrypt(key, &s)?;
    let recovered = m.to_bytes_be_padded(n_len);

    let expected = pkcs1_pad_sign(digest, n_len)?;
    if recovered != expected {
        return Err(StackError::InvalidSignature);
    }
    Ok(())
}
