//! TLS client handshake engine (§4.9): negotiates SSL 3.0 through TLS 1.2
//! with RSA, DHE_RSA, DHE_DSS, and DH_anon key exchange over a `Read + Write`
//! stream (normally a `socket::Socket`, but any stream works for testing).
//!
//! **Zero external crate dependencies** (uses sibling `crypto`, `common`,
//! `bignum`, `pkey`, and `x509` crates).
use std::io::{self, Read, Write};

use common::{RandomSource, StackError};
use crypto::prng::OsRandom;
use crypto::sha256::sha256;
use pkey::rsa::{self, RsaPublicKey};
use pkey::dh::{self, DhKeyPair, DhParams};
use pkey::dsa::{self, DsaPublicKey};
use x509::{cert, SubjectPublicKey, X509Certificate};

use crate::handshake::{
    self, cipher_spec, CipherSpec, HandshakeMessage, HandshakeType, KeyExchangeMethod,
};
use crate::key_schedule::{self, PrfKind};
use crate::record::{self, ContentType, ProtocolVersion, TlsRecord};
use crate::session::CipherState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsClientState {
    Start,
    HelloSent,
    HelloReceived,
    KeysExchanged,
    Connected,
    Closed,
}

pub struct TlsClient<S: Read + Write> {
    stream: S,
    state: TlsClientState,
    version: ProtocolVersion,
    cipher_spec: Option<CipherSpec>,
    transcript: Vec<u8>,
    hs_buffer: Vec<u8>,
    client_write: Option<CipherState>,
    server_write: Option<CipherState>,
    client_seq: u64,
    server_seq: u64,
    read_buf: Vec<u8>,
    read_pos: usize,
}

/// Cipher suites offered by default, in preference order: AEAD first, then
/// CBC, covering RSA and DHE_RSA key exchange. DHE_DSS and DH_anon are
/// supported by the handshake engine but not offered unless the caller asks
/// for them via [`TlsClient::connect_with_suites`].
pub fn default_cipher_suites() -> Vec<u16> {
    use handshake::cipher_suite::*;
    vec![
        TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
        TLS_RSA_WITH_AES_128_GCM_SHA256,
        TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
        TLS_RSA_WITH_AES_128_CBC_SHA,
        TLS_RSA_WITH_AES_256_CBC_SHA,
        TLS_RSA_WITH_RC4_128_SHA,
    ]
}

fn io_err(e: StackError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{e:?}"))
}

impl<S: Read + Write> TlsClient<S> {
    pub fn connect(hostname: &str, stream: S) -> io::Result<Self> {
        Self::connect_with_suites(hostname, stream, &default_cipher_suites())
    }

    pub fn connect_with_suites(hostname: &str, stream: S, cipher_suites: &[u16]) -> io::Result<Self> {
        let mut client = TlsClient {
            stream,
            state: TlsClientState::Start,
            version: ProtocolVersion::TLS1_2,
            cipher_spec: None,
            transcript: Vec::new(),
            hs_buffer: Vec::new(),
            client_write: None,
            server_write: None,
            client_seq: 0,
            server_seq: 0,
            read_buf: Vec::new(),
            read_pos: 0,
        };
        client.do_handshake(hostname, cipher_suites).map_err(io_err)?;
        Ok(client)
    }

    pub fn state(&self) -> TlsClientState {
        self.state
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    fn write_plaintext_handshake(&mut self, body: &[u8]) -> Result<(), StackError> {
        self.transcript.extend_from_slice(body);
        let record = TlsRecord::new(ContentType::Handshake, self.version, body.to_vec());
        record::write_record(&mut self.stream, &record).map_err(|e| StackError::Io(e.to_string()))
    }

    fn next_handshake_message(&mut self) -> Result<HandshakeMessage, StackError> {
        loop {
            match handshake::read_handshake_message(&self.hs_buffer) {
                Ok((msg, consumed)) => {
                    self.transcript.extend_from_slice(&self.hs_buffer[..consumed]);
                    self.hs_buffer.drain(..consumed);
                    return Ok(msg);
                }
                Err(_) => {
                    let record = record::read_record(&mut self.stream)
                        .map_err(|e| StackError::Io(e.to_string()))?;
                    if record.content_type != ContentType::Handshake {
                        return Err(StackError::UnexpectedMessage);
                    }
                    self.hs_buffer.extend_from_slice(&record.payload);
                }
            }
        }
    }

    fn do_handshake(&mut self, hostname: &str, cipher_suites: &[u16]) -> Result<(), StackError> {
        let mut rng = OsRandom;
        let mut client_random = [0u8; 32];
        rng.fill_bytes(&mut client_random);

        let client_hello = handshake::build_client_hello(
            (self.version.major, self.version.minor),
            &client_random,
            &[],
            cipher_suites,
            Some(hostname),
        );
        self.write_plaintext_handshake(&client_hello)?;
        self.state = TlsClientState::HelloSent;

        let sh_msg = self.next_handshake_message()?;
        if sh_msg.msg_type != HandshakeType::ServerHello {
            return Err(StackError::UnexpectedMessage);
        }
        let server_hello = handshake::parse_server_hello(&sh_msg.body)?;
        self.version = ProtocolVersion { major: server_hello.version.0, minor: server_hello.version.1 };
        let server_random = server_hello.random;
        let spec = cipher_spec(server_hello.cipher_suite).ok_or(StackError::UnsupportedKeyExchMethod)?;
        self.cipher_spec = Some(spec);
        self.state = TlsClientState::HelloReceived;

        let cert_chain = if spec.key_exchange != KeyExchangeMethod::DhAnon {
            let cert_msg = self.next_handshake_message()?;
            if cert_msg.msg_type != HandshakeType::Certificate {
                return Err(StackError::UnexpectedMessage);
            }
            handshake::parse_certificate_message(&cert_msg.body)?
        } else {
            Vec::new()
        };

        let leaf_der = cert_chain.first();
        let leaf = leaf_der.map(|der| cert::parse_certificate(der)).transpose()?;

        let mut pre_master_secret = Vec::new();
        let mut client_dh: Option<DhKeyPair> = None;

        let mut msg = self.next_handshake_message()?;

        if msg.msg_type == HandshakeType::ServerKeyExchange {
            let signed = spec.key_exchange != KeyExchangeMethod::DhAnon;
            let ske = handshake::parse_server_key_exchange_dh(&msg.body, signed)?;

            if let Some((_, signature)) = &ske.signature {
                let mut signed_params = Vec::new();
                signed_params.extend_from_slice(&client_random);
                signed_params.extend_from_slice(&server_random);
                signed_params.extend_from_slice(&msg.body[..msg.body.len() - 4 - signature.len()]);
                let digest = sha256(&signed_params);
                verify_server_signature(spec.key_exchange, leaf.as_ref(), &digest, signature)?;
            }

            let params = DhParams { p: bignum::Bignum::from_bytes_be(&ske.p), g: bignum::Bignum::from_bytes_be(&ske.g) };
            let pair = dh::generate_key_pair(&params, &mut rng)?;
            let server_y = bignum::Bignum::from_bytes_be(&ske.ys);
            pre_master_secret = dh::compute_shared_secret_tls_premaster(&pair, &server_y)?;
            client_dh = Some(pair);

            msg = self.next_handshake_message()?;
        }

        if msg.msg_type == HandshakeType::CertificateRequest {
            return Err(StackError::HandshakeFailed("client certificate authentication not supported"));
        }

        if msg.msg_type != HandshakeType::ServerHelloDone {
            return Err(StackError::UnexpectedMessage);
        }

        if spec.key_exchange == KeyExchangeMethod::Rsa {
            let leaf = leaf.as_ref().ok_or(StackError::BadCertificate("missing leaf certificate"))?;
            let rsa_pub = rsa_public_key_from_cert(leaf)?;
            let mut pms = vec![self.version.major, self.version.minor];
            let mut secret_bytes = [0u8; 46];
            rng.fill_bytes(&mut secret_bytes);
            pms.extend_from_slice(&secret_bytes);

            let n_len = rsa_pub.n.to_bytes_be().len().max(1);
            let padded = rsa::pkcs1_pad_encrypt(&pms, n_len, &mut rng)?;
            let m = bignum::Bignum::from_bytes_be(&padded);
            let c = rsa::encrypt(&rsa_pub, &m)?;
            let encrypted = c.to_bytes_be_padded(n_len);

            pre_master_secret = pms;
            let cke = handshake::build_client_key_exchange_rsa(&encrypted);
            self.write_plaintext_handshake(&cke)?;
        } else {
            let pair = client_dh.ok_or(StackError::UnexpectedMessage)?;
            let yc = pair.ya.to_bytes_be();
            let cke = handshake::build_client_key_exchange_dh(&yc);
            self.write_plaintext_handshake(&cke)?;
        }

        self.state = TlsClientState::KeysExchanged;

        let prf = PrfKind::for_version(self.version);
        let master_secret = key_schedule::derive_master_secret(prf, &pre_master_secret, &client_random, &server_random);
        let key_block = key_schedule::derive_key_block(
            prf,
            &master_secret,
            &client_random,
            &server_random,
            spec.mac_key_len,
            spec.enc_key_len,
            spec.fixed_iv_len,
        );

        self.client_write = Some(CipherState::new(&spec, &key_block.client)?);
        self.server_write = Some(CipherState::new(&spec, &key_block.server)?);

        let ccs = TlsRecord::new(ContentType::ChangeCipherSpec, self.version, vec![1]);
        record::write_record(&mut self.stream, &ccs).map_err(|e| StackError::Io(e.to_string()))?;

        let client_finished_hash = sha256(&self.transcript);
        let verify_data = key_schedule::compute_finished_tls(prf, &master_secret, b"client finished", &client_finished_hash);
        let finished_body = handshake::build_finished(&verify_data);
        self.transcript.extend_from_slice(&finished_body);

        let protected = self.client_write.as_mut().unwrap().protect(
            self.client_seq,
            ContentType::Handshake,
            self.version,
            &finished_body,
        );
        self.client_seq += 1;
        let finished_record = TlsRecord::new(ContentType::Handshake, self.version, protected);
        record::write_record(&mut self.stream, &finished_record).map_err(|e| StackError::Io(e.to_string()))?;

        self.expect_change_cipher_spec()?;

        let server_finished_hash = sha256(&self.transcript);
        let expected_verify_data =
            key_schedule::compute_finished_tls(prf, &master_secret, b"server finished", &server_finished_hash);

        let server_finished = self.read_encrypted_handshake_message()?;
        if server_finished.msg_type != HandshakeType::Finished {
            return Err(StackError::UnexpectedMessage);
        }
        let actual = handshake::parse_finished(&server_finished.body)?;
        if !crypto::constant_time::ct_eq(&actual, &expected_verify_data) {
            return Err(StackError::HandshakeFailed("server Finished verify_data mismatch"));
        }

        self.state = TlsClientState::Connected;
        Ok(())
    }

    fn expect_change_cipher_spec(&mut self) -> Result<(), StackError> {
        let record = record::read_record(&mut self.stream).map_err(|e| StackError::Io(e.to_string()))?;
        if record.content_type != ContentType::ChangeCipherSpec {
            return Err(StackError::UnexpectedMessage);
        }
        self.server_seq = 0;
        Ok(())
    }

    fn read_encrypted_handshake_message(&mut self) -> Result<HandshakeMessage, StackError> {
        loop {
            if let Ok((msg, consumed)) = handshake::read_handshake_message(&self.hs_buffer) {
                self.transcript.extend_from_slice(&self.hs_buffer[..consumed]);
                self.hs_buffer.drain(..consumed);
                return Ok(msg);
            }
            let record = record::read_record(&mut self.stream).map_err(|e| StackError::Io(e.to_string()))?;
            if record.content_type != ContentType::Handshake {
                return Err(StackError::UnexpectedMessage);
            }
            let plaintext = self.server_write.as_mut().unwrap().unprotect(
                self.server_seq,
                ContentType::Handshake,
                self.version,
                &record.payload,
            )?;
            self.server_seq += 1;
            self.hs_buffer.extend_from_slice(&plaintext);
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos < self.read_buf.len() {
            let available = &self.read_buf[self.read_pos..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.read_pos += n;
            if self.read_pos >= self.read_buf.len() {
                self.read_buf.clear();
                self.read_pos = 0;
            }
            return Ok(n);
        }

        loop {
            let record = record::read_record(&mut self.stream)?;
            match record.content_type {
                ContentType::ApplicationData => {
                    let plaintext = self
                        .server_write
                        .as_mut()
                        .unwrap()
                        .unprotect(self.server_seq, ContentType::ApplicationData, self.version, &record.payload)
                        .map_err(io_err)?;
                    self.server_seq += 1;
                    let n = plaintext.len().min(buf.len());
                    buf[..n].copy_from_slice(&plaintext[..n]);
                    if plaintext.len() > n {
                        self.read_buf = plaintext[n..].to_vec();
                        self.read_pos = 0;
                    }
                    return Ok(n);
                }
                ContentType::Alert => return Ok(0),
                _ => continue,
            }
        }
    }

    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut total = 0;
        for chunk in data.chunks(TlsRecord::MAX_PAYLOAD) {
            let protected = self.client_write.as_mut().unwrap().protect(
                self.client_seq,
                ContentType::ApplicationData,
                self.version,
                chunk,
            );
            self.client_seq += 1;
            let record = TlsRecord::new(ContentType::ApplicationData, self.version, protected);
            record::write_record(&mut self.stream, &record)?;
            total += chunk.len();
        }
        Ok(total)
    }
}

fn verify_server_signature(
    method: KeyExchangeMethod,
    leaf: Option<&X509Certificate<'_>>,
    digest: &[u8],
    signature: &[u8],
) -> Result<(), StackError> {
    let leaf = leaf.ok_or(StackError::BadCertificate("missing leaf certificate for signed key exchange"))?;
    match method {
        KeyExchangeMethod::DheRsa => {
            let rsa_pub = rsa_public_key_from_cert(leaf)?;
            rsa::verify(&rsa_pub, digest, signature)
        }
        KeyExchangeMethod::DheDss => {
            let dsa_pub = dsa_public_key_from_cert(leaf)?;
            let sig = dsa::decode_signature(signature)?;
            dsa::verify(&dsa_pub, digest, &sig)
        }
        _ => Ok(()),
    }
}

fn rsa_public_key_from_cert(cert: &X509Certificate<'_>) -> Result<RsaPublicKey, StackError> {
    match &cert.public_key {
        SubjectPublicKey::Rsa { n, e } => Ok(RsaPublicKey {
            n: bignum::Bignum::from_bytes_be(n),
            e: bignum::Bignum::from_bytes_be(e),
        }),
        _ => Err(StackError::BadCertificate("certificate does not carry an RSA public key")),
    }
}

fn dsa_public_key_from_cert(cert: &X509Certificate<'_>) -> Result<DsaPublicKey, StackError> {
    match &cert.public_key {
        SubjectPublicKey::Dsa { p, q, g, y } => Ok(DsaPublicKey {
            params: pkey::dsa::DsaParams {
                p: bignum::Bignum::from_bytes_be(p),
                q: bignum::Bignum::from_bytes_be(q),
                g: bignum::Bignum::from_bytes_be(g),
            },
            y: bignum::Bignum::from_bytes_be(y),
        }),
        _ => Err(StackError::BadCertificate("certificate does not carry a DSA public key")),
    }
}
