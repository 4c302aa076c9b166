/// TLS pseudo-random function, per §4.2. The construction depends on the
/// negotiated protocol version:
///
/// - SSL 3.0 uses its own hash-concatenation scheme (RFC 6101 §5), not P_hash.
/// - TLS 1.0/1.1 split the secret in half and XOR `P_MD5` with `P_SHA1`
///   (RFC 2246 §5), so that breaking either hash alone doesn't break the PRF.
/// - TLS 1.2 drops the split and uses `P_SHA256` (or `P_SHA384` for suites
///   that negotiate it) directly (RFC 5246 §5).
use crate::digest::Digest;
use crate::hmac::Hmac;
use crate::md5::Md5;
use crate::sha1::Sha1;
use crate::sha256::Sha256;
use crate::sha2_64::Sha384;

/// `P_hash(secret, seed)`, expanded to `out_len` bytes.
///
/// `A(0) = seed`, `A(i) = HMAC(secret, A(i-1))`, output is the concatenation
/// of `HMAC(secret, A(i) || seed)` for `i = 1, 2, ...`.
fn p_hash<D: Digest>(secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut a = seed.to_vec();
    while out.len() < out_len {
        let mut mac = Hmac::<D>::new(secret);
        mac.update(&a);
        a = mac.finalize();

        let mut mac = Hmac::<D>::new(secret);
        mac.update(&a);
        mac.update(seed);
        out.extend(mac.finalize());
    }
    out.truncate(out_len);
    out
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// TLS 1.0/1.1 PRF: split the secret in half (overlapping by one byte if
/// the length is odd), run `P_MD5` over one half and `P_SHA1` over the
/// other, then XOR the results together.
pub fn prf_tls10(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut labeled_seed = Vec::with_capacity(label.len() + seed.len());
    labeled_seed.extend_from_slice(label);
    labeled_seed.extend_from_slice(seed);

    let half = secret.len().div_ceil(2);
    let s1 = &secret[..half];
    let s2 = &secret[secret.len() - half..];

    let mut md5_out = p_hash::<Md5>(s1, &labeled_seed, out_len);
    let sha1_out = p_hash::<Sha1>(s2, &labeled_seed, out_len);
    xor_into(&mut md5_out, &sha1_out);
    md5_out
}

/// TLS 1.2 PRF: `P_SHA256` (or `P_SHA384` for cipher suites that specify it)
/// applied directly, no splitting.
pub fn prf_tls12_sha256(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut labeled_seed = Vec::with_capacity(label.len() + seed.len());
    labeled_seed.extend_from_slice(label);
    labeled_seed.extend_from_slice(seed);
    p_hash::<Sha256>(secret, &labeled_seed, out_len)
}

pub fn prf_tls12_sha384(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut labeled_seed = Vec::with_capacity(label.len() + seed.len());
    labeled_seed.extend_from_slice(label);
    labeled_seed.extend_from_slice(seed);
    p_hash::<Sha384>(secret, &labeled_seed, out_len)
}

/// SSL 3.0's master-secret/key-block derivation (RFC 6101 §5). It is not an
/// HMAC construction at all: each output chunk `i` (0-indexed) hashes
/// `i+1` repetitions of the ASCII letter `'A' + i` together with the secret
/// and seed through SHA-1, then re-hashes that through MD5 with the secret.
pub fn ssl3_prf(secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut chunk_index = 0u8;
    while out.len() < out_len {
        let label: Vec<u8> = std::iter::repeat(b'A' + chunk_index)
            .take(chunk_index as usize + 1)
            .collect();

        let mut sha1 = Sha1::new();
        sha1.update(&label);
        sha1.update(secret);
        sha1.update(seed);
        let inner = sha1.finalize();

        let mut md5 = Md5::new();
        md5.update(secret);
        md5.update(&inner);
        out.extend(md5.finalize());

        chunk_index += 1;
    }
    out.truncate(out_len);
    out
}
