/// Handshake message types (§4.9), extended from a TLS 1.3-only
/// `HandshakeType`/`Extension`/`build_client_hello`/`parse_server_hello`
/// baseline with the message set and key-exchange selection the SSL
/// 3.0–TLS 1.2 handshake actually uses: ServerKeyExchange, CertificateRequest,
/// ServerHelloDone, ClientKeyExchange, and a `CipherSuite` table keyed by
/// key-exchange method (RSA / DHE_RSA / DHE_DSS / DH_anon) rather than by
/// AEAD-only TLS 1.3 suites.
use common::{BufWriter, Cursor, Endian, ParseError, StackError, U24};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::HelloRequest,
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            11 => Self::Certificate,
            12 => Self::ServerKeyExchange,
            13 => Self::CertificateRequest,
            14 => Self::ServerHelloDone,
            15 => Self::CertificateVerify,
            16 => Self::ClientKeyExchange,
            20 => Self::Finished,
            _ => return None,
        })
    }
}

/// A parsed-but-unprocessed handshake message: `type(1) || length(3) || body`.
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub msg_type: HandshakeType,
    pub body: Vec<u8>,
}

pub fn wrap_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut w = BufWriter::new(Endian::Big);
    w.u8(msg_type as u8);
    w.u24_be(U24::from(body.len() as u32));
    w.bytes(body);
    w.finish()
}

/// Reassembles handshake messages out of a byte stream that may have split
/// or coalesced them across record boundaries (§4.8's reassembly contract).
pub fn read_handshake_message(data: &[u8]) -> Result<(HandshakeMessage, usize), StackError> {
    let mut c = Cursor::new(data, Endian::Big);
    let raw_type = c.u8()?;
    let msg_type = HandshakeType::from_u8(raw_type)
        .ok_or(StackError::DecodingFailed("unknown handshake message type"))?;
    let len: u32 = c.u24_be()?.into();
    let body = c.bytes(len as usize)?.to_vec();
    Ok((HandshakeMessage { msg_type, body }, 4 + len as usize))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeMethod {
    Rsa,
    DheRsa,
    DheDss,
    DhAnon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    Rc4_128,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgo {
    Md5,
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub key_exchange: KeyExchangeMethod,
    pub bulk: BulkCipher,
    pub mac: MacAlgo,
    pub mac_key_len: usize,
    pub enc_key_len: usize,
    pub fixed_iv_len: usize,
    pub aead: bool,
}

pub mod cipher_suite {
    pub const TLS_RSA_WITH_RC4_128_MD5: u16 = 0x0004;
    pub const TLS_RSA_WITH_RC4_128_SHA: u16 = 0x0005;
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: u16 = 0x002F;
    pub const TLS_DHE_DSS_WITH_AES_128_CBC_SHA: u16 = 0x0032;
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: u16 = 0x0033;
    pub const TLS_DH_ANON_WITH_AES_128_CBC_SHA: u16 = 0x0034;
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: u16 = 0x0035;
    pub const TLS_RSA_WITH_AES_128_GCM_SHA256: u16 = 0x009C;
    pub const TLS_DHE_RSA_WITH_AES_128_GCM_SHA256: u16 = 0x009E;
}

/// §4.4/§4.9's cipher suite table: bulk cipher, MAC, and key-exchange method
/// selection by suite identifier, used both to size the key block
/// ([`crate::key_schedule::derive_key_block`]) and to pick which
/// `ServerKeyExchange`/`ClientKeyExchange` shape the handshake builds.
pub fn cipher_spec(suite: u16) -> Option<CipherSpec> {
    use cipher_suite::*;
    Some(match suite {
        TLS_RSA_WITH_RC4_128_MD5 => CipherSpec {
            key_exchange: KeyExchangeMethod::Rsa,
            bulk: BulkCipher::Rc4_128,
            mac: MacAlgo::Md5,
            mac_key_len: 16,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_RSA_WITH_RC4_128_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::Rsa,
            bulk: BulkCipher::Rc4_128,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_RSA_WITH_AES_128_CBC_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::Rsa,
            bulk: BulkCipher::Aes128Cbc,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_RSA_WITH_AES_256_CBC_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::Rsa,
            bulk: BulkCipher::Aes256Cbc,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 32,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_DHE_RSA_WITH_AES_128_CBC_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::DheRsa,
            bulk: BulkCipher::Aes128Cbc,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_DHE_DSS_WITH_AES_128_CBC_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::DheDss,
            bulk: BulkCipher::Aes128Cbc,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_DH_ANON_WITH_AES_128_CBC_SHA => CipherSpec {
            key_exchange: KeyExchangeMethod::DhAnon,
            bulk: BulkCipher::Aes128Cbc,
            mac: MacAlgo::Sha1,
            mac_key_len: 20,
            enc_key_len: 16,
            fixed_iv_len: 0,
            aead: false,
        },
        TLS_RSA_WITH_AES_128_GCM_SHA256 => CipherSpec {
            key_exchange: KeyExchangeMethod::Rsa,
            bulk: BulkCipher::Aes128Gcm,
            mac: MacAlgo::Sha256,
            mac_key_len: 0,
            enc_key_len: 16,
            fixed_iv_len: 4,
            aead: true,
        },
        TLS_DHE_RSA_WITH_AES_128_GCM_SHA256 => CipherSpec {
            key_exchange: KeyExchangeMethod::DheRsa,
            bulk: BulkCipher::Aes128Gcm,
            mac: MacAlgo::Sha256,
            mac_key_len: 0,
            enc_key_len: 16,
            fixed_iv_len: 4,
            aead: true,
        },
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub typ: u16,
    pub data: Vec<u8>,
}

pub const EXT_SERVER_NAME: u16 = 0x0000;
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;

fn encode_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut w = BufWriter::new(Endian::Big);
    for ext in extensions {
        w.u16(ext.typ);
        w.u16(ext.data.len() as u16);
        w.bytes(&ext.data);
    }
    w.finish()
}

fn decode_extensions(data: &[u8]) -> Result<Vec<Extension>, StackError> {
    let mut c = Cursor::new(data, Endian::Big);
    let mut extensions = Vec::new();
    while !c.is_empty() {
        let typ = c.u16()?;
        let len = c.u16()? as usize;
        let body = c.bytes(len)?.to_vec();
        extensions.push(Extension { typ, data: body });
    }
    Ok(extensions)
}

fn sni_extension(hostname: &str) -> Extension {
    let mut w = BufWriter::new(Endian::Big);
    let name = hostname.as_bytes();
    w.u16((name.len() + 3) as u16);
    w.u8(0x00);
    w.u16(name.len() as u16);
    w.bytes(name);
    Extension { typ: EXT_SERVER_NAME, data: w.finish() }
}

#[derive(Debug, Clone)]
pub struct ClientHello {
    pub version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<Extension>,
}

pub fn build_client_hello(
    version: (u8, u8),
    random: &[u8; 32],
    session_id: &[u8],
    cipher_suites: &[u16],
    hostname: Option<&str>,
) -> Vec<u8> {
    let mut extensions = Vec::new();
    if let Some(host) = hostname {
        extensions.push(sni_extension(host));
    }

    let mut body = BufWriter::new(Endian::Big);
    body.u8(version.0);
    body.u8(version.1);
    body.bytes(random);
    body.u8(session_id.len() as u8);
    body.bytes(session_id);

    body.u16((cipher_suites.len() * 2) as u16);
    for suite in cipher_suites {
        body.u16(*suite);
    }

    body.u8(1); // one compression method
    body.u8(0); // null

    let ext_bytes = encode_extensions(&extensions);
    body.u16(ext_bytes.len() as u16);
    body.bytes(&ext_bytes);

    wrap_handshake(HandshakeType::ClientHello, &body.finish())
}

pub fn parse_client_hello(body: &[u8]) -> Result<ClientHello, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let major = c.u8()?;
    let minor = c.u8()?;
    let mut random = [0u8; 32];
    random.copy_from_slice(c.bytes(32)?);
    let sid_len = c.u8()? as usize;
    let session_id = c.bytes(sid_len)?.to_vec();

    let suites_len = c.u16()? as usize;
    let suites_bytes = c.bytes(suites_len)?;
    let mut cursor = Cursor::new(suites_bytes, Endian::Big);
    let mut cipher_suites = Vec::new();
    while !cursor.is_empty() {
        cipher_suites.push(cursor.u16()?);
    }

    let compression_len = c.u8()? as usize;
    c.skip(compression_len)?;

    let extensions = if !c.is_empty() {
        let ext_len = c.u16()? as usize;
        decode_extensions(c.bytes(ext_len)?)?
    } else {
        Vec::new()
    };

    Ok(ClientHello { version: (major, minor), random, session_id, cipher_suites, extensions })
}

#[derive(Debug, Clone)]
pub struct ServerHello {
    pub version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub extensions: Vec<Extension>,
}

pub fn build_server_hello(version: (u8, u8), random: &[u8; 32], session_id: &[u8], cipher_suite: u16) -> Vec<u8> {
    let mut body = BufWriter::new(Endian::Big);
    body.u8(version.0);
    body.u8(version.1);
    body.bytes(random);
    body.u8(session_id.len() as u8);
    body.bytes(session_id);
    body.u16(cipher_suite);
    body.u8(0); // null compression
    body.u16(0); // no extensions
    wrap_handshake(HandshakeType::ServerHello, &body.finish())
}

pub fn parse_server_hello(body: &[u8]) -> Result<ServerHello, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let major = c.u8()?;
    let minor = c.u8()?;
    let mut random = [0u8; 32];
    random.copy_from_slice(c.bytes(32)?);
    let sid_len = c.u8()? as usize;
    let session_id = c.bytes(sid_len)?.to_vec();
    let cipher_suite = c.u16()?;
    c.u8()?; // compression method

    let extensions = if !c.is_empty() {
        let ext_len = c.u16()? as usize;
        decode_extensions(c.bytes(ext_len)?)?
    } else {
        Vec::new()
    };

    Ok(ServerHello { version: (major, minor), random, session_id, cipher_suite, extensions })
}

/// `Certificate`: a chain of DER-encoded certificates, leaf first.
pub fn build_certificate_message(chain: &[Vec<u8>]) -> Vec<u8> {
    let mut list = BufWriter::new(Endian::Big);
    for cert in chain {
        list.u24_be(U24::from(cert.len() as u32));
        list.bytes(cert);
    }
    let list_bytes = list.finish();

    let mut body = BufWriter::new(Endian::Big);
    body.u24_be(U24::from(list_bytes.len() as u32));
    body.bytes(&list_bytes);
    wrap_handshake(HandshakeType::Certificate, &body.finish())
}

pub fn parse_certificate_message(body: &[u8]) -> Result<Vec<Vec<u8>>, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let total_len: u32 = c.u24_be()?.into();
    let list_bytes = c.bytes(total_len as usize)?;
    let mut cursor = Cursor::new(list_bytes, Endian::Big);
    let mut chain = Vec::new();
    while !cursor.is_empty() {
        let len: u32 = cursor.u24_be()?.into();
        chain.push(cursor.bytes(len as usize)?.to_vec());
    }
    Ok(chain)
}

/// `ServerKeyExchange` for the Diffie-Hellman key-exchange methods:
/// `dh_p || dh_g || dh_Ys`, optionally followed by a signature over
/// `client_random || server_random || params` for DHE_RSA/DHE_DSS (absent
/// for DH_anon).
#[derive(Debug, Clone)]
pub struct ServerKeyExchangeDh {
    pub p: Vec<u8>,
    pub g: Vec<u8>,
    pub ys: Vec<u8>,
    pub signature: Option<(u16, Vec<u8>)>,
}

pub fn build_server_key_exchange_dh(p: &[u8], g: &[u8], ys: &[u8], signature: Option<(u16, &[u8])>) -> Vec<u8> {
    let mut body = BufWriter::new(Endian::Big);
    body.u16(p.len() as u16);
    body.bytes(p);
    body.u16(g.len() as u16);
    body.bytes(g);
    body.u16(ys.len() as u16);
    body.bytes(ys);
    if let Some((sig_alg, sig)) = signature {
        body.u16(sig_alg);
        body.u16(sig.len() as u16);
        body.bytes(sig);
    }
    wrap_handshake(HandshakeType::ServerKeyExchange, &body.finish())
}

pub fn parse_server_key_exchange_dh(body: &[u8], signed: bool) -> Result<ServerKeyExchangeDh, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let p_len = c.u16()? as usize;
    let p = c.bytes(p_len)?.to_vec();
    let g_len = c.u16()? as usize;
    let g = c.bytes(g_len)?.to_vec();
    let ys_len = c.u16()? as usize;
    let ys = c.bytes(ys_len)?.to_vec();

    let signature = if signed {
        let sig_alg = c.u16()?;
        let sig_len = c.u16()? as usize;
        Some((sig_alg, c.bytes(sig_len)?.to_vec()))
    } else {
        None
    };

    Ok(ServerKeyExchangeDh { p, g, ys, signature })
}

/// `ClientKeyExchange` for RSA key exchange: the RSA-encrypted pre-master
/// secret, length-prefixed.
pub fn build_client_key_exchange_rsa(encrypted_pre_master_secret: &[u8]) -> Vec<u8> {
    let mut body = BufWriter::new(Endian::Big);
    body.u16(encrypted_pre_master_secret.len() as u16);
    body.bytes(encrypted_pre_master_secret);
    wrap_handshake(HandshakeType::ClientKeyExchange, &body.finish())
}

pub fn parse_client_key_exchange_rsa(body: &[u8]) -> Result<Vec<u8>, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let len = c.u16()? as usize;
    Ok(c.bytes(len)?.to_vec())
}

/// `ClientKeyExchange` for the DH family: the client's DH public value.
pub fn build_client_key_exchange_dh(yc: &[u8]) -> Vec<u8> {
    let mut body = BufWriter::new(Endian::Big);
    body.u16(yc.len() as u16);
    body.bytes(yc);
    wrap_handshake(HandshakeType::ClientKeyExchange, &body.finish())
}

pub fn parse_client_key_exchange_dh(body: &[u8]) -> Result<Vec<u8>, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let len = c.u16()? as usize;
    Ok(c.bytes(len)?.to_vec())
}

pub fn build_server_hello_done() -> Vec<u8> {
    wrap_handshake(HandshakeType::ServerHelloDone, &[])
}

#[derive(Debug, Clone)]
pub struct CertificateVerifyMsg {
    pub signature_algorithm: u16,
    pub signature: Vec<u8>,
}

pub fn build_certificate_verify(signature_algorithm: u16, signature: &[u8]) -> Vec<u8> {
    let mut body = BufWriter::new(Endian::Big);
    body.u16(signature_algorithm);
    body.u16(signature.len() as u16);
    body.bytes(signature);
    wrap_handshake(HandshakeType::CertificateVerify, &body.finish())
}

pub fn parse_certificate_verify(body: &[u8]) -> Result<CertificateVerifyMsg, StackError> {
    let mut c = Cursor::new(body, Endian::Big);
    let signature_algorithm = c.u16()?;
    let len = c.u16()? as usize;
    let signature = c.bytes(len)?.to_vec();
    Ok(CertificateVerifyMsg { signature_algorithm, signature })
}

pub fn build_finished(verify_data: &[u8; 12]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

pub fn parse_finished(body: &[u8]) -> Result<[u8; 12], StackError> {
    if body.len() != 12 {
        return Err(StackError::Parse(ParseError::UnexpectedEof));
    }
    let mut out = [0u8; 12];
    out.copy_from_slice(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_hello_roundtrip() {
        let random = [0xAAu8; 32];
        let msg = build_client_hello((3, 3), &random, &[0xBB; 32], &[cipher_suite::TLS_RSA_WITH_AES_128_CBC_SHA], Some("example.com"));
        let (parsed, consumed) = read_handshake_message(&msg).unwrap();
        assert_eq!(consumed, msg.len());
        assert_eq!(parsed.msg_type, HandshakeType::ClientHello);

        let hello = parse_client_hello(&parsed.body).unwrap();
        assert_eq!(hello.version, (3, 3));
        assert_eq!(hello.random, random);
        assert_eq!(hello.cipher_suites, vec![cipher_suite::TLS_RSA_WITH_AES_128_CBC_SHA]);
        assert_eq!(hello.extensions.len(), 1);
        assert_eq!(hello.extensions[0].typ, EXT_SERVER_NAME);
    }

    #[test]
    fn server_hello_roundtrip() {
        let random = [0x11u8; 32];
        let msg = build_server_hello((3, 3), &random, &[], cipher_suite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        let (parsed, _) = read_handshake_message(&msg).unwrap();
        let hello = parse_server_hello(&parsed.body).unwrap();
        assert_eq!(hello.cipher_suite, cipher_suite::TLS_RSA_WITH_AES_128_GCM_SHA256);
        assert_eq!(hello.random, random);
    }

    #[test]
    fn certificate_message_roundtrip_with_chain() {
        let chain = vec![vec![1, 2, 3], vec![4, 5, 6, 7]];
        let msg = build_certificate_message(&chain);
        let (parsed, _) = read_handshake_message(&msg).unwrap();
        let decoded = parse_certificate_message(&parsed.body).unwrap();
        assert_eq!(decoded, chain);
    }

    #[test]
    fn server_key_exchange_dh_roundtrip_with_signature() {
        let msg = build_server_key_exchange_dh(&[1, 2], &[3], &[4, 5, 6], Some((0x0401, &[9, 9, 9])));
        let (parsed, _) = read_handshake_message(&msg).unwrap();
        let decoded = parse_server_key_exchange_dh(&parsed.body, true).unwrap();
        assert_eq!(decoded.p, vec![1, 2]);
        assert_eq!(decoded.g, vec![3]);
        assert_eq!(decoded.ys, vec![4, 5, 6]);
        assert_eq!(decoded.signature, Some((0x0401, vec![9, 9, 9])));
    }

    #[test]
    fn client_key_exchange_rsa_roundtrip() {
        let msg = build_client_key_exchange_rsa(&[0xAA; 48]);
        let (parsed, _) = read_handshake_message(&msg).unwrap();
        let decoded = parse_client_key_exchange_rsa(&parsed.body).unwrap();
        assert_eq!(decoded, vec![0xAA; 48]);
    }

    #[test]
    fn finished_message_roundtrip() {
        let verify_data = [0x07u8; 12];
        let msg = build_finished(&verify_data);
        let (parsed, _) = read_handshake_message(&msg).unwrap();
        assert_eq!(parse_finished(&parsed.body).unwrap(), verify_data);
    }

    #[test]
    fn cipher_spec_rejects_unknown_suite() {
        assert!(cipher_spec(0xFFFF).is_none());
    }

    #[test]
    fn cipher_spec_distinguishes_key_exchange_methods() {
        assert_eq!(cipher_spec(cipher_suite::TLS_RSA_WITH_AES_128_CBC_SHA).unwrap().key_exchange, KeyExchangeMethod::Rsa);
        assert_eq!(cipher_spec(cipher_suite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA).unwrap().key_exchange, KeyExchangeMethod::DheRsa);
        assert_eq!(cipher_spec(cipher_suite::TLS_DHE_DSS_WITH_AES_128_CBC_SHA).unwrap().key_exchange, KeyExchangeMethod::DheDss);
        assert_eq!(cipher_spec(cipher_suite::TLS_DH_ANON_WITH_AES_128_CBC_SHA).unwrap().key_exchange, KeyExchangeMethod::DhAnon);
    }
}
