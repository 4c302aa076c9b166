/// Master secret and key block derivation (§4.9), replacing a TLS 1.3
/// HKDF-based `derive_keys`/`derive_traffic_keys` baseline with the
/// SSL 3.0–TLS 1.2 pre-master-secret → master-secret → key-block scheme
/// (RFC 6101 §6, RFC 2246 §6.3, RFC 5246 §6.3) since this version range has
/// no HKDF at all.
use crate::record::ProtocolVersion;

pub const MASTER_SECRET_LEN: usize = 48;

/// Which PRF variant derives the master secret and key block, selected by
/// protocol version (SPEC_FULL §12 tracks this as a plain version match,
/// not a negotiated parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfKind {
    Ssl3,
    Tls10Or11,
    Tls12Sha256,
    Tls12Sha384,
}

impl PrfKind {
    pub fn for_version(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::SSL3_0 => PrfKind::Ssl3,
            ProtocolVersion::TLS1_0 | ProtocolVersion::TLS1_1 => PrfKind::Tls10Or11,
            _ => PrfKind::Tls12Sha256,
        }
    }

    /// SSL 3.0 has no label at all (RFC 6101 §5.6.8/§6): it hashes the raw
    /// secret and seed through its `'A'`/`'BB'`/`'CCC'`... construction, so
    /// `label` is ignored on that branch rather than folded into the seed.
    fn prf(self, secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
        match self {
            PrfKind::Ssl3 => crypto::ssl3_prf(secret, seed, out_len),
            PrfKind::Tls10Or11 => crypto::prf_tls10(secret, label, seed, out_len),
            PrfKind::Tls12Sha256 => crypto::prf_tls12_sha256(secret, label, seed, out_len),
            PrfKind::Tls12Sha384 => crypto::prf_tls12_sha384(secret, label, seed, out_len),
        }
    }
}

/// `master_secret = PRF(pre_master_secret, "master secret",
/// client_random || server_random)[0..48]`.
pub fn derive_master_secret(
    prf: PrfKind,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> [u8; MASTER_SECRET_LEN] {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    let out = prf.prf(pre_master_secret, b"master secret", &seed, MASTER_SECRET_LEN);
    let mut master = [0u8; MASTER_SECRET_LEN];
    master.copy_from_slice(&out);
    master
}

/// One direction's worth of bulk-cipher material sliced out of the key
/// block.
#[derive(Debug, Clone)]
pub struct DirectionKeys {
    pub mac_key: Vec<u8>,
    pub enc_key: Vec<u8>,
    pub iv: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct KeyBlock {
    pub client: DirectionKeys,
    pub server: DirectionKeys,
}

/// Expands the master secret into client/server MAC, encryption, and IV
/// material (RFC 5246 §6.3's `key_block`), then slices it in the fixed
/// order `client_write_MAC_key || server_write_MAC_key ||
/// client_write_key || server_write_key || client_write_IV ||
/// server_write_IV`. AEAD suites pass `mac_key_len = 0`; exportable/
/// implicit-IV suites pass `iv_len = 0` (TLS 1.1+ CBC) or the 4-byte GCM
/// fixed IV length.
pub fn derive_key_block(
    prf: PrfKind,
    master_secret: &[u8; MASTER_SECRET_LEN],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    mac_key_len: usize,
    enc_key_len: usize,
    iv_len: usize,
) -> KeyBlock {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let total = 2 * (mac_key_len + enc_key_len + iv_len);
    let block = prf.prf(master_secret, b"key expansion", &seed, total);

    let mut offset = 0;
    let mut take = |len: usize| {
        let slice = block[offset..offset + len].to_vec();
        offset += len;
        slice
    };

    let client_mac = take(mac_key_len);
    let server_mac = take(mac_key_len);
    let client_enc = take(enc_key_len);
    let server_enc = take(enc_key_len);
    let client_iv = take(iv_len);
    let server_iv = take(iv_len);

    KeyBlock {
        client: DirectionKeys { mac_key: client_mac, enc_key: client_enc, iv: client_iv },
        server: DirectionKeys { mac_key: server_mac, enc_key: server_enc, iv: server_iv },
    }
}

/// TLS 1.2's `Finished.verify_data = PRF(master_secret, label, Hash(handshake_messages))[0..12]`.
/// SSL 3.0 uses a different (non-PRF) construction entirely (RFC 6101 §5.6.8),
/// handled separately by callers that still negotiate SSL 3.0.
pub fn compute_finished_tls(prf: PrfKind, master_secret: &[u8], label: &[u8], handshake_hash: &[u8]) -> [u8; 12] {
    let out = prf.prf(master_secret, label, handshake_hash, 12);
    let mut verify_data = [0u8; 12];
    verify_data.copy_from_slice(&out);
    verify_data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_secret_is_deterministic_and_right_length() {
        let pms = [0x11u8; 48];
        let cr = [0xAAu8; 32];
        let sr = [0xBBu8; 32];
        let a = derive_master_secret(PrfKind::Tls12Sha256, &pms, &cr, &sr);
        let b = derive_master_secret(PrfKind::Tls12Sha256, &pms, &cr, &sr);
        assert_eq!(a, b);
        assert_eq!(a.len(), MASTER_SECRET_LEN);
    }

    #[test]
    fn different_prf_kinds_produce_different_master_secrets() {
        let pms = [0x11u8; 48];
        let cr = [0xAAu8; 32];
        let sr = [0xBBu8; 32];
        let tls12 = derive_master_secret(PrfKind::Tls12Sha256, &pms, &cr, &sr);
        let tls10 = derive_master_secret(PrfKind::Tls10Or11, &pms, &cr, &sr);
        assert_ne!(tls12, tls10);
    }

    #[test]
    fn key_block_slices_are_disjoint_and_correctly_sized() {
        let ms = [0x22u8; 48];
        let cr = [0xCCu8; 32];
        let sr = [0xDDu8; 32];
        let block = derive_key_block(PrfKind::Tls12Sha256, &ms, &cr, &sr, 20, 16, 0);
        assert_eq!(block.client.mac_key.len(), 20);
        assert_eq!(block.server.mac_key.len(), 20);
        assert_eq!(block.client.enc_key.len(), 16);
        assert_eq!(block.server.enc_key.len(), 16);
        assert!(block.client.iv.is_empty());
        assert_ne!(block.client.mac_key, block.server.mac_key);
        assert_ne!(block.client.enc_key, block.server.enc_key);
    }

    #[test]
    fn gcm_key_block_carries_fixed_ivs_and_no_mac_keys() {
        let ms = [0x33u8; 48];
        let cr = [0xEEu8; 32];
        let sr = [0xFFu8; 32];
        let block = derive_key_block(PrfKind::Tls12Sha256, &ms, &cr, &sr, 0, 16, 4);
        assert!(block.client.mac_key.is_empty());
        assert_eq!(block.client.iv.len(), 4);
        assert_eq!(block.server.iv.len(), 4);
    }

    #[test]
    fn finished_verify_data_is_twelve_bytes() {
        let ms = [0x44u8; 48];
        let hash = crypto::sha256::sha256(b"transcript");
        let vd = compute_finished_tls(PrfKind::Tls12Sha256, &ms, b"client finished", &hash);
        assert_eq!(vd.len(), 12);
    }

    #[test]
    fn prf_kind_selects_by_protocol_version() {
        assert_eq!(PrfKind::for_version(ProtocolVersion::SSL3_0), PrfKind::Ssl3);
        assert_eq!(PrfKind::for_version(ProtocolVersion::TLS1_0), PrfKind::Tls10Or11);
        assert_eq!(PrfKind::for_version(ProtocolVersion::TLS1_1), PrfKind::Tls10Or11);
        assert_eq!(PrfKind::for_version(ProtocolVersion::TLS1_2), PrfKind::Tls12Sha256);
    }
}
