/// Record layer framing (§4.8): `ContentType(1) || Version(2) || Length(2) ||
/// Fragment`. Generalized from a TLS 1.3-only `read_record`/`write_record`
/// baseline down to SSL 3.0 through TLS 1.2, where the
/// MAC (or AEAD additional data) covers the 8-byte sequence number the
/// record header itself never carries.
use std::io::{self, Read, Write};

use crypto::digest::Digest;
use crypto::{AesGcm, AesKeySchedule, Rc4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// `{major, minor}` as they appear on the wire: SSL 3.0 is `{3,0}`, TLS 1.0
/// is `{3,1}`, up through TLS 1.2's `{3,3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const SSL3_0: Self = Self { major: 3, minor: 0 };
    pub const TLS1_0: Self = Self { major: 3, minor: 1 };
    pub const TLS1_1: Self = Self { major: 3, minor: 2 };
    pub const TLS1_2: Self = Self { major: 3, minor: 3 };

    pub fn bytes(self) -> [u8; 2] {
        [self.major, self.minor]
    }
}

#[derive(Debug, Clone)]
pub struct TlsRecord {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub payload: Vec<u8>,
}

impl TlsRecord {
    pub const MAX_PAYLOAD: usize = 16384;
    pub const MAX_CIPHERTEXT: usize = 16384 + 2048;

    pub fn new(content_type: ContentType, version: ProtocolVersion, payload: Vec<u8>) -> Self {
        Self { content_type, version, payload }
    }
}

pub fn read_record<R: Read>(stream: &mut R) -> io::Result<TlsRecord> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header)?;

    let content_type = ContentType::from_u8(header[0])
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("unknown TLS content type: {}", header[0])))?;
    let version = ProtocolVersion { major: header[1], minor: header[2] };
    let length = u16::from_be_bytes([header[3], header[4]]) as usize;

    if length > TlsRecord::MAX_CIPHERTEXT {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "TLS record too large"));
    }

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload)?;

    Ok(TlsRecord { content_type, version, payload })
}

pub fn write_record<W: Write>(stream: &mut W, record: &TlsRecord) -> io::Result<()> {
    let length = record.payload.len() as u16;
    let mut header = [0u8; 5];
    header[0] = record.content_type as u8;
    header[1] = record.version.major;
    header[2] = record.version.minor;
    header[3..5].copy_from_slice(&length.to_be_bytes());

    stream.write_all(&header)?;
    stream.write_all(&record.payload)?;
    stream.flush()
}

/// Input to both the MAC and the AEAD additional-authenticated-data
/// computation: `seq(8) || type(1) || version(2) || length(2)`.
fn mac_header(seq: u64, content_type: ContentType, version: ProtocolVersion, fragment_len: u16) -> [u8; 13] {
    let mut buf = [0u8; 13];
    buf[0..8].copy_from_slice(&seq.to_be_bytes());
    buf[8] = content_type as u8;
    buf[9] = version.major;
    buf[10] = version.minor;
    buf[11..13].copy_from_slice(&fragment_len.to_be_bytes());
    buf
}

/// MAC-then-pad-then-encrypt for a CBC cipher suite (§4.8). `version >=
/// TLS1_1` sends an explicit per-record IV; SSL 3.0/TLS 1.0 chain the
/// previous record's last ciphertext block instead, so the caller supplies
/// whichever IV applies.
pub fn cbc_protect<D: Digest>(
    mac_key: &[u8],
    enc: &AesKeySchedule,
    iv: &[u8; 16],
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
) -> Vec<u8> {
    let mut mac_input = mac_header(seq, content_type, version, fragment.len() as u16).to_vec();
    mac_input.extend_from_slice(fragment);
    let mac = crypto::hmac::hmac::<D>(mac_key, &mac_input);

    let mut plaintext = fragment.to_vec();
    plaintext.extend_from_slice(&mac);

    let ciphertext = crypto::aes::cbc_encrypt(enc, iv, &plaintext);

    if version.minor >= ProtocolVersion::TLS1_1.minor {
        let mut out = iv.to_vec();
        out.extend_from_slice(&ciphertext);
        out
    } else {
        ciphertext
    }
}

/// Inverse of [`cbc_protect`]. Returns the plaintext fragment once the MAC
/// has verified. `explicit_iv` is `None` for SSL 3.0/TLS 1.0 (caller tracks
/// the running IV itself).
pub fn cbc_unprotect<D: Digest>(
    mac_key: &[u8],
    dec: &AesKeySchedule,
    iv: &[u8; 16],
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    record: &[u8],
) -> Result<Vec<u8>, &'static str> {
    let ciphertext = if version.minor >= ProtocolVersion::TLS1_1.minor {
        if record.len() < 16 {
            return Err("record shorter than the explicit IV");
        }
        &record[16..]
    } else {
        record
    };

    let plaintext = crypto::aes::cbc_decrypt(dec, iv, ciphertext)?;
    if plaintext.len() < D::OUT_LEN {
        return Err("decrypted record shorter than the MAC");
    }
    let (fragment, mac) = plaintext.split_at(plaintext.len() - D::OUT_LEN);

    let mut mac_input = mac_header(seq, content_type, version, fragment.len() as u16).to_vec();
    mac_input.extend_from_slice(fragment);
    let expected = crypto::hmac::hmac::<D>(mac_key, &mac_input);

    if !crypto::constant_time::ct_eq(&expected, mac) {
        return Err("MAC verification failed");
    }
    Ok(fragment.to_vec())
}

/// MAC-then-encrypt for a stream cipher suite (RC4): no padding, no block
/// alignment, the MAC is simply appended before encryption.
pub fn stream_protect<D: Digest>(
    mac_key: &[u8],
    cipher: &mut Rc4,
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
) -> Vec<u8> {
    let mut mac_input = mac_header(seq, content_type, version, fragment.len() as u16).to_vec();
    mac_input.extend_from_slice(fragment);
    let mac = crypto::hmac::hmac::<D>(mac_key, &mac_input);

    let mut plaintext = fragment.to_vec();
    plaintext.extend_from_slice(&mac);
    cipher.apply_keystream(&mut plaintext);
    plaintext
}

pub fn stream_unprotect<D: Digest>(
    mac_key: &[u8],
    cipher: &mut Rc4,
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    record: &[u8],
) -> Result<Vec<u8>, &'static str> {
    let mut plaintext = record.to_vec();
    cipher.apply_keystream(&mut plaintext);
    if plaintext.len() < D::OUT_LEN {
        return Err("decrypted record shorter than the MAC");
    }
    let (fragment, mac) = plaintext.split_at(plaintext.len() - D::OUT_LEN);

    let mut mac_input = mac_header(seq, content_type, version, fragment.len() as u16).to_vec();
    mac_input.extend_from_slice(fragment);
    let expected = crypto::hmac::hmac::<D>(mac_key, &mac_input);
    if !crypto::constant_time::ct_eq(&expected, mac) {
        return Err("MAC verification failed");
    }
    Ok(fragment.to_vec())
}

/// TLS 1.2 AEAD record protection (RFC 5246 §6.2.3.3): an explicit 8-byte
/// nonce is sent with the record, the AAD is the same 13-byte MAC header
/// used by the block/stream ciphers, and the tag authenticates it.
pub fn gcm_protect(
    gcm: &AesGcm,
    fixed_iv: &[u8; 4],
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    fragment: &[u8],
) -> Vec<u8> {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(fixed_iv);
    nonce[4..12].copy_from_slice(&seq.to_be_bytes());

    let aad = mac_header(seq, content_type, version, fragment.len() as u16);
    let (ciphertext, tag) = gcm.seal(&nonce, &aad, fragment);

    let mut out = seq.to_be_bytes().to_vec(); // explicit nonce re-sends the seq number
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    out
}

pub fn gcm_unprotect(
    gcm: &AesGcm,
    fixed_iv: &[u8; 4],
    seq: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    record: &[u8],
) -> Result<Vec<u8>, &'static str> {
    if record.len() < 8 + 16 {
        return Err("record too short for explicit nonce and tag");
    }
    let explicit_nonce: [u8; 8] = record[..8].try_into().unwrap();
    let ciphertext = &record[8..record.len() - 16];
    let tag: [u8; 16] = record[record.len() - 16..].try_into().unwrap();

    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(fixed_iv);
    nonce[4..12].copy_from_slice(&explicit_nonce);

    let aad = mac_header(seq, content_type, version, ciphertext.len() as u16);
    gcm.open(&nonce, &aad, ciphertext, &tag).map_err(|_| "AEAD decryption failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto::sha1::Sha1;

    #[test]
    fn content_type_roundtrip() {
        assert_eq!(ContentType::from_u8(22), Some(ContentType::Handshake));
        assert_eq!(ContentType::from_u8(99), None);
    }

    #[test]
    fn read_write_record_roundtrip() {
        let record = TlsRecord::new(ContentType::Handshake, ProtocolVersion::TLS1_2, vec![1, 2, 3, 4, 5]);
        let mut buf = Vec::new();
        write_record(&mut buf, &record).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let parsed = read_record(&mut cursor).unwrap();
        assert_eq!(parsed.content_type, ContentType::Handshake);
        assert_eq!(parsed.version, ProtocolVersion::TLS1_2);
        assert_eq!(parsed.payload, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn cbc_protect_unprotect_roundtrip_tls12_explicit_iv() {
        let mac_key = [0x11u8; 20];
        let enc_key = [0x22u8; 16];
        let sched = AesKeySchedule::new(&enc_key).unwrap();
        let iv = [0x33u8; 16];

        let protected = cbc_protect::<Sha1>(
            &mac_key,
            &sched,
            &iv,
            7,
            ContentType::ApplicationData,
            ProtocolVersion::TLS1_2,
            b"hello cbc",
        );
        let plaintext = cbc_unprotect::<Sha1>(
            &mac_key,
            &sched,
            &iv,
            7,
            ContentType::ApplicationData,
            ProtocolVersion::TLS1_2,
            &protected,
        )
        .unwrap();
        assert_eq!(plaintext, b"hello cbc");
    }

    #[test]
    fn cbc_unprotect_rejects_tampered_mac() {
        let mac_key = [0x11u8; 20];
        let enc_key = [0x22u8; 16];
        let sched = AesKeySchedule::new(&enc_key).unwrap();
        let iv = [0x33u8; 16];

        let mut protected =
            cbc_protect::<Sha1>(&mac_key, &sched, &iv, 1, ContentType::ApplicationData, ProtocolVersion::TLS1_2, b"data");
        let last = protected.len() - 1;
        protected[last] ^= 0xFF;

        let result =
            cbc_unprotect::<Sha1>(&mac_key, &sched, &iv, 1, ContentType::ApplicationData, ProtocolVersion::TLS1_2, &protected);
        assert!(result.is_err());
    }

    #[test]
    fn gcm_protect_unprotect_roundtrip() {
        let key = [0x44u8; 16];
        let gcm = AesGcm::new(&key);
        let fixed_iv = [0x55u8; 4];

        let protected = gcm_protect(&gcm, &fixed_iv, 3, ContentType::ApplicationData, ProtocolVersion::TLS1_2, b"hello gcm");
        let plaintext = gcm_unprotect(&gcm, &fixed_iv, 3, ContentType::ApplicationData, ProtocolVersion::TLS1_2, &protected).unwrap();
        assert_eq!(plaintext, b"hello gcm");
    }

    #[test]
    fn gcm_unprotect_rejects_wrong_sequence_number() {
        let key = [0x44u8; 16];
        let gcm = AesGcm::new(&key);
        let fixed_iv = [0x55u8; 4];

        let protected = gcm_protect(&gcm, &fixed_iv, 3, ContentType::ApplicationData, ProtocolVersion::TLS1_2, b"hello gcm");
        let result = gcm_unprotect(&gcm, &fixed_iv, 4, ContentType::ApplicationData, ProtocolVersion::TLS1_2, &protected);
        assert!(result.is_err());
    }

    #[test]
    fn stream_protect_unprotect_roundtrip() {
        let mac_key = [0x66u8; 20];
        let mut enc = Rc4::new(&[0x77u8; 16]).unwrap();
        let mut dec = Rc4::new(&[0x77u8; 16]).unwrap();

        let protected = stream_protect::<Sha1>(
            &mac_key,
            &mut enc,
            2,
            ContentType::ApplicationData,
            ProtocolVersion::TLS1_0,
            b"hello rc4",
        );
        let plaintext = stream_unprotect::<Sha1>(
            &mac_key,
            &mut dec,
            2,
            ContentType::ApplicationData,
            ProtocolVersion::TLS1_0,
            &protected,
        )
        .unwrap();
        assert_eq!(plaintext, b"hello rc4");
    }
}
