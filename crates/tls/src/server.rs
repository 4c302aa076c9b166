//! TLS server handshake engine (§4.9): the accept-side counterpart to
//! [`crate::client`], negotiating RSA or DHE_RSA key exchange against a
//! configured certificate chain and private key. Built on the same
//! record/key-schedule/handshake primitives `client.rs` uses and on the
//! message sequencing `cyclone_ssl/tls_client.c` drives from the other
//! side, run in reverse: ServerHello/Certificate/ServerKeyExchange/
//! ServerHelloDone out, then ClientKeyExchange/ChangeCipherSpec/Finished in.
use std::io::{self, Read, Write};

use common::{RandomSource, StackError};
use crypto::prng::OsRandom;
use crypto::sha256::sha256;
use pkey::dh::{self, DhKeyPair, DhParams};
use pkey::dsa::DsaPrivateKey;
use pkey::rsa::{self, RsaPrivateKey};

use crate::handshake::{self, cipher_spec, CipherSpec, HandshakeMessage, HandshakeType, KeyExchangeMethod};
use crate::key_schedule::{self, PrfKind};
use crate::record::{self, ContentType, ProtocolVersion, TlsRecord};
use crate::session::CipherState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsServerState {
    Start,
    HelloSent,
    KeysExchanged,
    Connected,
}

/// Server identity: the certificate chain to present (leaf first, DER
/// encoded) and the private key matching the leaf's public key. DHE suites
/// additionally need a DH group; RSA-only deployments can pass `None`.
pub struct ServerIdentity {
    pub cert_chain: Vec<Vec<u8>>,
    pub rsa_key: Option<RsaPrivateKey>,
    pub dsa_key: Option<DsaPrivateKey>,
    pub dh_params: Option<DhParams>,
}

pub struct TlsServer<S: Read + Write> {
    stream: S,
    state: TlsServerState,
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

fn io_err(e: StackError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{e:?}"))
}

impl<S: Read + Write> TlsServer<S> {
    /// Accepts a connection, offering `supported_suites` in priority order
    /// against whatever the client sent in its `ClientHello`.
    pub fn accept(stream: S, identity: &ServerIdentity, supported_suites: &[u16]) -> io::Result<Self> {
        let mut server = TlsServer {
            stream,
            state: TlsServerState::Start,
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
        server.do_handshake(identity, supported_suites).map_err(io_err)?;
        Ok(server)
    }

    pub fn state(&self) -> TlsServerState {
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
                    let record = record::read_record(&mut self.stream).map_err(|e| StackError::Io(e.to_string()))?;
                    if record.content_type != ContentType::Handshake {
                        return Err(StackError::UnexpectedMessage);
                    }
                    self.hs_buffer.extend_from_slice(&record.payload);
                }
            }
        }
    }

    fn select_cipher_suite(offered: &[u16], supported: &[u16]) -> Option<u16> {
        supported.iter().copied().find(|s| offered.contains(s))
    }

    fn do_handshake(&mut self, identity: &ServerIdentity, supported_suites: &[u16]) -> Result<(), StackError> {
        let mut rng = OsRandom;

        let ch_msg = self.next_handshake_message()?;
        if ch_msg.msg_type != HandshakeType::ClientHello {
            return Err(StackError::UnexpectedMessage);
        }
        let client_hello = handshake::parse_client_hello(&ch_msg.body)?;
        let client_random = client_hello.random;

        let suite = Self::select_cipher_suite(&client_hello.cipher_suites, supported_suites)
            .ok_or(StackError::HandshakeFailed("no common cipher suite"))?;
        let spec = cipher_spec(suite).ok_or(StackError::UnsupportedKeyExchMethod)?;
        self.cipher_spec = Some(spec);

        let mut server_random = [0u8; 32];
        rng.fill_bytes(&mut server_random);

        let server_hello = handshake::build_server_hello((self.version.major, self.version.minor), &server_random, &[], suite);
        self.write_plaintext_handshake(&server_hello)?;
        self.state = TlsServerState::HelloSent;

        if spec.key_exchange != KeyExchangeMethod::DhAnon {
            let cert_msg = handshake::build_certificate_message(&identity.cert_chain);
            self.write_plaintext_handshake(&cert_msg)?;
        }

        let mut server_dh: Option<DhKeyPair> = None;

        if spec.key_exchange != KeyExchangeMethod::Rsa {
            let params = identity
                .dh_params
                .clone()
                .ok_or(StackError::HandshakeFailed("no DH group configured"))?;
            let pair = dh::generate_key_pair(&params, &mut rng)?;
            let p_bytes = pair.params.p.to_bytes_be();
            let g_bytes = pair.params.g.to_bytes_be();
            let ys_bytes = pair.ya.to_bytes_be();

            let signature = if spec.key_exchange != KeyExchangeMethod::DhAnon {
                let mut params_buf = Vec::new();
                encode_dh_param(&mut params_buf, &p_bytes);
                encode_dh_param(&mut params_buf, &g_bytes);
                encode_dh_param(&mut params_buf, &ys_bytes);

                let mut signed_input = Vec::new();
                signed_input.extend_from_slice(&client_random);
                signed_input.extend_from_slice(&server_random);
                signed_input.extend_from_slice(&params_buf);
                let digest = sha256(&signed_input);

                Some(sign_key_exchange(spec.key_exchange, identity, &digest)?)
            } else {
                None
            };

            let ske = handshake::build_server_key_exchange_dh(
                &p_bytes,
                &g_bytes,
                &ys_bytes,
                signature.as_ref().map(|(alg, sig)| (*alg, sig.as_slice())),
            );
            self.write_plaintext_handshake(&ske)?;
            server_dh = Some(pair);
        }

        let shd = handshake::build_server_hello_done();
        self.write_plaintext_handshake(&shd)?;

        let cke_msg = self.next_handshake_message()?;
        if cke_msg.msg_type != HandshakeType::ClientKeyExchange {
            return Err(StackError::UnexpectedMessage);
        }

        let pre_master_secret = if spec.key_exchange == KeyExchangeMethod::Rsa {
            let rsa_key = identity
                .rsa_key
                .as_ref()
                .ok_or(StackError::HandshakeFailed("no RSA private key configured"))?;
            let encrypted = handshake::parse_client_key_exchange_rsa(&cke_msg.body)?;
            let n_len = rsa_key.n.to_bytes_be().len().max(1);
            let c = bignum::Bignum::from_bytes_be(&encrypted);
            let m = rsa::decrypt(rsa_key, &c)?;
            let padded = m.to_bytes_be_padded(n_len);
            rsa::pkcs1_unpad_encrypt(&padded)?
        } else {
            let pair = server_dh.ok_or(StackError::UnexpectedMessage)?;
            let yc = handshake::parse_client_key_exchange_dh(&cke_msg.body)?;
            let yc = bignum::Bignum::from_bytes_be(&yc);
            dh::compute_shared_secret_tls_premaster(&pair, &yc)?
        };

        self.state = TlsServerState::KeysExchanged;

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

        self.expect_change_cipher_spec()?;

        let client_finished_hash = sha256(&self.transcript);
        let expected_verify_data =
            key_schedule::compute_finished_tls(prf, &master_secret, b"client finished", &client_finished_hash);

        let client_finished = self.read_encrypted_handshake_message()?;
        if client_finished.msg_type != HandshakeType::Finished {
            return Err(StackError::UnexpectedMessage);
        }
        let actual = handshake::parse_finished(&client_finished.body)?;
        if !crypto::constant_time::ct_eq(&actual, &expected_verify_data) {
            return Err(StackError::HandshakeFailed("client Finished verify_data mismatch"));
        }

        let ccs = TlsRecord::new(ContentType::ChangeCipherSpec, self.version, vec![1]);
        record::write_record(&mut self.stream, &ccs).map_err(|e| StackError::Io(e.to_string()))?;

        let server_finished_hash = sha256(&self.transcript);
        let verify_data = key_schedule::compute_finished_tls(prf, &master_secret, b"server finished", &server_finished_hash);
        let finished_body = handshake::build_finished(&verify_data);
        self.transcript.extend_from_slice(&finished_body);

        let protected = self.server_write.as_mut().unwrap().protect(
            self.server_seq,
            ContentType::Handshake,
            self.version,
            &finished_body,
        );
        self.server_seq += 1;
        let finished_record = TlsRecord::new(ContentType::Handshake, self.version, protected);
        record::write_record(&mut self.stream, &finished_record).map_err(|e| StackError::Io(e.to_string()))?;

        self.state = TlsServerState::Connected;
        Ok(())
    }

    fn expect_change_cipher_spec(&mut self) -> Result<(), StackError> {
        let record = record::read_record(&mut self.stream).map_err(|e| StackError::Io(e.to_string()))?;
        if record.content_type != ContentType::ChangeCipherSpec {
            return Err(StackError::UnexpectedMessage);
        }
        self.client_seq = 0;
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
            let plaintext = self.client_write.as_mut().unwrap().unprotect(
                self.client_seq,
                ContentType::Handshake,
                self.version,
                &record.payload,
            )?;
            self.client_seq += 1;
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
                        .client_write
                        .as_mut()
                        .unwrap()
                        .unprotect(self.client_seq, ContentType::ApplicationData, self.version, &record.payload)
                        .map_err(io_err)?;
                    self.client_seq += 1;
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
            let protected = self.server_write.as_mut().unwrap().protect(
                self.server_seq,
                ContentType::ApplicationData,
                self.version,
                chunk,
            );
            self.server_seq += 1;
            let record = TlsRecord::new(ContentType::ApplicationData, self.version, protected);
            record::write_record(&mut self.stream, &record)?;
            total += chunk.len();
        }
        Ok(total)
    }
}

fn encode_dh_param(buf: &mut Vec<u8>, value: &[u8]) {
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}

fn sign_key_exchange(method: KeyExchangeMethod, identity: &ServerIdentity, digest: &[u8]) -> Result<(u16, Vec<u8>), StackError> {
    match method {
        KeyExchangeMethod::DheRsa => {
            let key = identity.rsa_key.as_ref().ok_or(StackError::HandshakeFailed("no RSA private key configured"))?;
            let sig = rsa::sign(key, digest)?;
            Ok((0x0401, sig)) // rsa_pkcs1_sha256
        }
        KeyExchangeMethod::DheDss => {
            let key = identity.dsa_key.as_ref().ok_or(StackError::HandshakeFailed("no DSA private key configured"))?;
            let mut rng = OsRandom;
            let sig = pkey::dsa::sign(key, digest, &mut rng)?;
            Ok((0x0402, pkey::dsa::encode_signature(&sig))) // dsa_sha256 (non-standard point, SHA-256 throughout)
        }
        _ => Err(StackError::UnsupportedKeyExchMethod),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_cipher_suite_prefers_first_supported_match() {
        let offered = vec![0x0005, 0x002f, 0x009c];
        let supported = vec![0x009c, 0x002f];
        assert_eq!(TlsServer::<std::io::Cursor<Vec<u8>>>::select_cipher_suite(&offered, &supported), Some(0x009c));
    }

    #[test]
    fn select_cipher_suite_returns_none_without_overlap() {
        let offered = vec![0x0005];
        let supported = vec![0x002f];
        assert_eq!(TlsServer::<std::io::Cursor<Vec<u8>>>::select_cipher_suite(&offered, &supported), None);
    }
}
