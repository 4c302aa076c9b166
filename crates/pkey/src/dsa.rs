/// DSA signing and verification (§4.4).
use bignum::Bignum;
use common::{RandomSource, StackError};

#[derive(Clone, Debug, PartialEq)]
pub struct DsaParams {
    pub p: Bignum,
    pub q: Bignum,
    pub g: Bignum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DsaPublicKey {
    pub params: DsaParams,
    pub y: Bignum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DsaPrivateKey {
    pub params: DsaParams,
    pub x: Bignum,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DsaSignature {
    pub r: Bignum,
    pub s: Bignum,
}

/// Truncate (or in practice, never need to extend) the hash input to
/// `len(q)` bits per §4.4's hash-truncation rule.
fn truncate_hash_to_q_bits(digest: &[u8], q: &Bignum) -> Bignum {
    let q_bits = q.bit_length();
    let h = Bignum::from_bytes_be(digest);
    let h_bits = h.bit_length();
    if h_bits > q_bits {
        h.shift_right(h_bits - q_bits)
    } else {
        h
    }
}

/// Sign `digest` with per-message random `k`, retrying if `r = 0` or `s = 0`.
pub fn sign(
    key: &DsaPrivateKey,
    digest: &[u8],
    rng: &mut dyn RandomSource,
) -> Result<DsaSignature, StackError> {
    let DsaParams { p, q, g } = &key.params;
    let h = truncate_hash_to_q_bits(digest, q);

    loop {
        let mut k = Bignum::rand(q.bit_length(), rng);
        k = k.mod_nonneg(q)?;
        if k.is_zero() {
            continue;
        }

        let r = g.exp_mod(&k, p)?.mod_nonneg(q)?;
        if r.is_zero() {
            continue;
        }

        let k_inv = match k.inv_mod(q) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let xr = key.x.mul(&r).rem(q)?;
        let s = k_inv.mul(&h.add(&xr)).rem(q)?.mod_nonneg(q)?;
        if s.is_zero() {
            continue;
        }

        return Ok(DsaSignature { r, s });
    }
}

/// Verify `(r, s)` over `digest`. Rejects if `r, s ∉ (0, q)`.
pub fn verify(
    key: &DsaPublicKey,
    digest: &[u8],
    sig: &DsaSignature,
) -> Result<(), StackError> {
    let DsaParams { p, q, g } = &key.params;
    let zero = Bignum::zero();

    if !(sig.r > zero && sig.r < *q && sig.s > zero && sig.s < *q) {
        return Err(StackError::InvalidSignature);
    }

    let h = truncate_hash_to_q_bits(digest, q);
    let w = sig.s.inv_mod(q).map_err(|_| StackError::InvalidSignature)?;
    let u1 = h.mul(&w).rem(q)?.mod_nonneg(q)?;
    let u2 = sig.r.mul(&w).rem(q)?.mod_nonneg(q)?;

    let v1 = g.exp_mod(&u1, p)?;
    let v2 = key.y.exp_mod(&u2, p)?;
    let v = v1.mul(&v2).rem(p)?.mod_nonneg(p)?.rem(q)?.mod_nonneg(q)?;

    if v == sig.r {
        Ok(())
    } else {
        Err(StackError::InvalidSignature)
    }
}

/// Encode `(r, s)` as ASN.1 `SEQUENCE { INTEGER r, INTEGER s }`.
pub fn encode_signature(sig: &DsaSignature) -> Vec<u8> {
    let mut body = Vec::new();
    encode_integer(&mut body, &sig.r);
    encode_integer(&mut body, &sig.s);

    let mut out = vec![0x30];
    encode_der_length(&mut out, body.len());
    out.extend(body);
    out
}

fn encode_integer(out: &mut Vec<u8>, n: &Bignum) {
    let mut bytes = n.to_bytes_be();
    if bytes.is_empty() {
        bytes.push(0);
    }
    // DER INTEGER encoding is two's complement; prepend a 0x00 if the high
    // bit is set so a positive value doesn't read as negative.
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    out.push(0x02);
    encode_der_length(out, bytes.len());
    out.extend(bytes);
}

fn encode_der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let first_nonzero = len_bytes.iter().position(|&b| b != 0).unwrap_or(len_bytes.len() - 1);
        let trimmed = &len_bytes[first_nonzero..];
        out.push(0x80 | trimmed.len() as u8);
        out.extend_from_slice(trimmed);
    }
}

/// Decode an ASN.1 `SEQUENCE { INTEGER r, INTEGER s }` signature.
pub fn decode_signature(der: &[u8]) -> Result<DsaSignature, StackError> {
    let mut pos = 0;
    if der.is_empty() || der[pos] != 0x30 {
        return Err(StackError::DecodingFailed("DSA signature is not a DER SEQUENCE"));
    }
    pos += 1;
    let (seq_len, consumed) = decode_der_length(&der[pos..])?;
    pos += consumed;
    if pos + seq_len > der.len() {
        return Err(StackError::DecodingFailed("DSA signature SEQUENCE extends past input"));
    }

    let (r, used) = decode_integer(&der[pos..pos + seq_len])?;
    pos += used;
    let remaining_len = seq_len - used;
    let (s, _) = decode_integer(&der[pos..pos + remaining_len])?;

    Ok(DsaSignature { r, s })
}

fn decode_integer(data: &[u8]) -> Result<(Bignum, usize), StackError> {
    if data.is_empty() || data[0] != 0x02 {
        return Err(StackError::DecodingFailed("expected DER INTEGER tag"));
    }
    let (len, consumed) = decode_der_length(&data[1..])?;
    let start = 1 + consumed;
    if start + len > data.len() {
        return Err(StackError::DecodingFailed("DER INTEGER value extends past input"));
    }
    Ok((Bignum::from_bytes_be(&data[start..start + len]), start + len))
}

fn decode_der_length(data: &[u8]) -> Result<(usize, usize), StackError> {
    if data.is_empty() {
        return Err(StackError::DecodingFailed("truncated DER length"));
    }
    let first = data[0];
    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 || num_bytes > 4 || data.len() < 1 + num_bytes {
        return Err(StackError::DecodingFailed("unsupported DER length form"));
    }
    let mut len = 0usize;
    for &b in &data[1..1 + num_bytes] {
        len = (len << 8) | b as usize;
    }
    Ok((len, 1 + num_bytes))
}
