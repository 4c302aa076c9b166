//! Builds the server-side key material for the loopback demo: a toy RSA
//! keypair, a minimal self-signed X.509 certificate wrapping its public
//! key, and a DH group for the DHE_RSA suite. None of this is wire
//! protocol — it is demo scaffolding standing in for a provisioned
//! certificate and private key a real deployment would load from PEM.

use bignum::Bignum;
use pkey::dh::DhParams;
use pkey::rsa::{self, RsaPrivateKey, RsaPublicKey};
use tls::server::ServerIdentity;

// 1024-bit RSA keypair (randomly generated for this demo, not reused
// anywhere else). `p`/`q`/`d_p`/`d_q`/`q_inv` populate the CRT fast path.
const RSA_N: &str = "81650709898014510564557380686853744320568514856501571014455368959900641888968157183192684931121672402974503288657368089932104644282245532518230923356515051692911086116941521893320546108917625957818306208981591646113720678833280244240459250895700923575399264337690201378584929310573111116717944568563354634119";
const RSA_E: &str = "65537";
const RSA_D: &str = "67719369768322912579710948429649438829127082793309777568254903029058385185084214774744623486444580976603737221035006828635115246959144543082967512077809094479669836015729508064433492144455198295225725418142437734792765260793639924598503863341026337028632051638197494883812802630253481987390321076967690678233";
const RSA_P: &str = "7134710482102234855036659074346617413930703723975290319034425833501813425007344042749459087284927340727253728890736078275439303109109952659397155740966613";
const RSA_Q: &str = "11444151812864621766295190074932732364898530121434706801232327875091717072057089367514374138373265932536380943203344181943247060224635638443621941482787563";
const RSA_DP: &str = "4375952859279207657247868351502763836769436606633058725054668062368416198965396663600061911172390243494097851389169894904550989941159706075913271467474769";
const RSA_DQ: &str = "6886013741680325537209279115841392924262762055154435326606277635936444619367674170599231423052800231680419398420444549960327823563762176577899318559473957";
const RSA_QINV: &str = "1264029253063948251204439528204161384563392208811054906797862896737650871594570308235516010359520480400759539977481007901528297521526207520212211649776944";

/// A 256-bit safe-prime DH group (`p = 2q + 1`, `q` prime, `g = 5` a
/// primitive root) used for `DHE_RSA` key exchange in the demo. Deliberately
/// small compared to real deployments (RFC 3526's 2048-bit+ groups) since
/// this only needs to be *correct*, not secure, for the loopback walkthrough.
const DH_P: &str = "66103843413863591765925149621388866605426969108945543835040935222626668199967";
const DH_G: &str = "5";

fn rsa_keypair() -> (RsaPublicKey, RsaPrivateKey) {
    let n = Bignum::from_decimal(RSA_N).expect("valid decimal literal");
    let e = Bignum::from_decimal(RSA_E).expect("valid decimal literal");
    let d = Bignum::from_decimal(RSA_D).expect("valid decimal literal");
    let p = Bignum::from_decimal(RSA_P).expect("valid decimal literal");
    let q = Bignum::from_decimal(RSA_Q).expect("valid decimal literal");
    let d_p = Bignum::from_decimal(RSA_DP).expect("valid decimal literal");
    let d_q = Bignum::from_decimal(RSA_DQ).expect("valid decimal literal");
    let q_inv = Bignum::from_decimal(RSA_QINV).expect("valid decimal literal");

    let public = RsaPublicKey { n: n.clone(), e: e.clone() };
    let private = RsaPrivateKey {
        n,
        e,
        d,
        p: Some(p),
        q: Some(q),
        d_p: Some(d_p),
        d_q: Some(d_q),
        q_inv: Some(q_inv),
    };
    (public, private)
}

pub fn dh_group() -> DhParams {
    DhParams {
        p: Bignum::from_decimal(DH_P).expect("valid decimal literal"),
        g: Bignum::from_decimal(DH_G).expect("valid decimal literal"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Minimal DER encoder — just enough ASN.1 to build one self-signed
// certificate, mirroring the shape `x509::cert::parse_certificate` expects.
// ─────────────────────────────────────────────────────────────────────────────

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_BOOLEAN: u8 = 0x01;
const TAG_NULL: u8 = 0x05;

const OID_RSA_ENCRYPTION: [u8; 9] = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
const OID_SHA256_WITH_RSA: [u8; 9] = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
const OID_COMMON_NAME: [u8; 3] = [0x55, 0x04, 0x03];
const OID_BASIC_CONSTRAINTS: [u8; 3] = [0x55, 0x1D, 0x13];

fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    match value.len() {
        n if n < 128 => out.push(n as u8),
        n if n < 256 => {
            out.push(0x81);
            out.push(n as u8);
        }
        n => {
            out.push(0x82);
            out.push((n >> 8) as u8);
            out.push((n & 0xFF) as u8);
        }
    }
    out.extend_from_slice(value);
    out
}

fn der_seq(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut value = Vec::new();
    for part in parts {
        value.extend_from_slice(part);
    }
    der_tlv(TAG_SEQUENCE, &value)
}

/// INTEGER encoding of a big-endian magnitude: prepend a zero byte when the
/// top bit is set, so the value reads as non-negative two's complement.
fn der_integer(magnitude: &[u8]) -> Vec<u8> {
    let bytes = if magnitude.is_empty() {
        vec![0]
    } else if magnitude[0] & 0x80 != 0 {
        let mut padded = vec![0u8];
        padded.extend_from_slice(magnitude);
        padded
    } else {
        magnitude.to_vec()
    };
    der_tlv(TAG_INTEGER, &bytes)
}

fn der_algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    der_seq(&[der_tlv(TAG_OID, oid), der_tlv(TAG_NULL, &[])])
}

fn der_name(common_name: &str) -> Vec<u8> {
    let atv = der_seq(&[
        der_tlv(TAG_OID, &OID_COMMON_NAME),
        der_tlv(TAG_PRINTABLE_STRING, common_name.as_bytes()),
    ]);
    let rdn = der_tlv(TAG_SET, &atv);
    der_seq(&[rdn])
}

fn der_rsa_spki(n: &Bignum, e: &Bignum) -> Vec<u8> {
    let rsa_public_key = der_seq(&[der_integer(&n.to_bytes_be()), der_integer(&e.to_bytes_be())]);
    let mut bit_string_value = vec![0u8];
    bit_string_value.extend_from_slice(&rsa_public_key);
    der_seq(&[
        der_algorithm_identifier(&OID_RSA_ENCRYPTION),
        der_tlv(TAG_BIT_STRING, &bit_string_value),
    ])
}

fn der_basic_constraints_extension() -> Vec<u8> {
    let constraints = der_seq(&[der_tlv(TAG_BOOLEAN, &[0xFF])]);
    let octet_string = der_tlv(TAG_OCTET_STRING, &constraints);
    let extension = der_seq(&[der_tlv(TAG_OID, &OID_BASIC_CONSTRAINTS), octet_string]);
    der_tlv(0xA3, &der_seq(&[extension]))
}

/// Build a self-signed, CA-flagged v3 certificate around `n`/`e`, signed by
/// `private` (so the same keypair both issues and holds the leaf identity —
/// fine for a loopback demo, never for a real deployment).
fn build_self_signed_certificate(public: &RsaPublicKey, private: &RsaPrivateKey, common_name: &str) -> Vec<u8> {
    let version = der_tlv(0xA0, &der_integer(&[0x02]));
    let serial = der_integer(&[0x01]);
    let signature_alg = der_algorithm_identifier(&OID_SHA256_WITH_RSA);
    let name = der_name(common_name);
    let validity = der_seq(&[
        der_tlv(TAG_UTC_TIME, b"240101000000Z"),
        der_tlv(TAG_UTC_TIME, b"340101000000Z"),
    ]);
    let spki = der_rsa_spki(&public.n, &public.e);
    let extensions = der_basic_constraints_extension();

    let tbs = der_seq(&[
        version,
        serial,
        signature_alg.clone(),
        name.clone(),
        validity,
        name,
        spki,
        extensions,
    ]);

    let digest = crypto::sha256::sha256(&tbs);
    let signature = rsa::sign(private, &digest).expect("demo key signs its own TBS");
    let mut signature_bits = vec![0u8];
    signature_bits.extend_from_slice(&signature);

    der_seq(&[tbs, signature_alg, der_tlv(TAG_BIT_STRING, &signature_bits)])
}

/// Assemble the `ServerIdentity` the demo's `TlsServer::accept` presents:
/// one self-signed RSA certificate plus the matching private key and DH
/// group for `DHE_RSA`.
pub fn build_server_identity(hostname: &str) -> ServerIdentity {
    let (public, private) = rsa_keypair();
    let cert_der = build_self_signed_certificate(&public, &private, hostname);
    ServerIdentity {
        cert_chain: vec![cert_der],
        rsa_key: Some(private),
        dsa_key: None,
        dh_params: Some(dh_group()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_identity_certificate_parses_and_matches_public_key() {
        let identity = build_server_identity("netstack.demo.local");
        let cert = x509::cert::parse_certificate(&identity.cert_chain[0]).unwrap();
        assert_eq!(cert.subject.common_name(), Some(b"netstack.demo.local".as_slice()));
        match cert.public_key {
            x509::SubjectPublicKey::Rsa { n, .. } => {
                assert_eq!(Bignum::from_bytes_be(n), identity.rsa_key.as_ref().unwrap().n);
            }
            _ => panic!("expected RSA public key"),
        }
    }

    #[test]
    fn self_signed_certificate_validates_against_itself() {
        let identity = build_server_identity("netstack.demo.local");
        let cert = x509::cert::parse_certificate(&identity.cert_chain[0]).unwrap();
        x509::validate::validate(&cert, &cert).unwrap();
    }
}
