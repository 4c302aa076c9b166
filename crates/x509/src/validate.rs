/// Certificate validation against an issuer (§4.6): byte-exact name
/// comparison, issuer CA check, and real signature verification — the
/// parts a browser satisfied with hostname matching never needed.
use crate::cert::{
    classify_signature_oid, SignatureAlgorithm, SignatureHash, SubjectPublicKey, X509Certificate,
};
use common::StackError;
use pkey::dsa::{self, DsaParams, DsaPublicKey};
use pkey::rsa::{self, RsaPublicKey};

fn hash_tbs(hash: SignatureHash, tbs: &[u8]) -> Vec<u8> {
    match hash {
        SignatureHash::Md5 => crypto::md5(tbs).to_vec(),
        SignatureHash::Sha1 => crypto::sha1(tbs).to_vec(),
        SignatureHash::Sha256 => crypto::digest::digest::<crypto::Sha256>(tbs),
        SignatureHash::Sha384 => crypto::sha384(tbs).to_vec(),
        SignatureHash::Sha512 => crypto::sha512(tbs).to_vec(),
    }
}

/// Validate `cert` as having been issued by `issuer_cert`, per §4.6's
/// five-step algorithm:
/// 1. `cert.issuer` byte-exact matches `issuer_cert.subject`.
/// 2. if `issuer_cert` is v3, its BasicConstraints must say `ca = true`.
/// 3. the signature OID selects a known hash + public-key algorithm.
/// 4. the TBS bytes are hashed exactly as they appeared on the wire.
/// 5. the signature verifies under the issuer's public key.
pub fn validate(cert: &X509Certificate, issuer_cert: &X509Certificate) -> Result<(), StackError> {
    if cert.issuer.raw != issuer_cert.subject.raw {
        return Err(StackError::BadCertificate("issuer does not match issuer certificate subject"));
    }

    if issuer_cert.version >= 2 {
        let is_ca = issuer_cert.basic_constraints.map(|bc| bc.ca).unwrap_or(false);
        if !is_ca {
            return Err(StackError::BadCertificate("issuer certificate is not a CA"));
        }
    }

    let algo = classify_signature_oid(&cert.signature_oid_outer)?;
    let digest = match algo {
        SignatureAlgorithm::Rsa(hash) => hash_tbs(hash, cert.tbs),
        SignatureAlgorithm::Dsa(hash) => hash_tbs(hash, cert.tbs),
    };

    match (algo, &issuer_cert.public_key) {
        (SignatureAlgorithm::Rsa(_), SubjectPublicKey::Rsa { n, e }) => {
            let key = RsaPublicKey {
                n: bignum::Bignum::from_bytes_be(n),
                e: bignum::Bignum::from_bytes_be(e),
            };
            rsa::verify(&key, &digest, cert.signature)
        }
        (SignatureAlgorithm::Dsa(_), SubjectPublicKey::Dsa { p, q, g, y }) => {
            let key = DsaPublicKey {
                params: DsaParams {
                    p: bignum::Bignum::from_bytes_be(p),
                    q: bignum::Bignum::from_bytes_be(q),
                    g: bignum::Bignum::from_bytes_be(g),
                },
                y: bignum::Bignum::from_bytes_be(y),
            };
            let sig = dsa::decode_signature(cert.signature)?;
            dsa::verify(&key, &digest, &sig)
        }
        _ => Err(StackError::UnsupportedSignatureAlgo),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{parse_certificate, BasicConstraints, Name, SubjectPublicKey, X509Certificate};
    use crypto::prng::Xorshift64;

    fn identity_rsa_keypair(n_bytes: usize) -> (rsa::RsaPublicKey, rsa::RsaPrivateKey) {
        let n = bignum::Bignum::from_bytes_be(&vec![0xFFu8; n_bytes]);
        let e = bignum::Bignum::from_u64(1);
        let d = bignum::Bignum::from_u64(1);
        (
            rsa::RsaPublicKey { n: n.clone(), e: e.clone() },
            rsa::RsaPrivateKey { n, e, d, p: None, q: None, d_p: None, d_q: None, q_inv: None },
        )
    }

    fn leaf_and_issuer<'a>(
        tbs: &'a [u8],
        signature: &'a [u8],
        issuer_raw: &'a [u8],
        subject_raw: &'a [u8],
        n: &'a [u8],
        e: &'a [u8],
        issuer_version: u8,
        issuer_is_ca: bool,
    ) -> (X509Certificate<'a>, X509Certificate<'a>) {
        let leaf = X509Certificate {
            tbs,
            version: 2,
            serial: &[0x01],
            signature_oid_inner: crate::cert::OID_SHA256_WITH_RSA.to_string(),
            issuer: Name { raw: issuer_raw, attributes: vec![] },
            not_before: b"230101000000Z",
            not_after: b"251231235959Z",
            subject: Name { raw: subject_raw, attributes: vec![] },
            public_key: SubjectPublicKey::Rsa { n, e },
            issuer_unique_id: None,
            subject_unique_id: None,
            basic_constraints: None,
            signature_oid_outer: crate::cert::OID_SHA256_WITH_RSA.to_string(),
            signature,
        };
        let issuer = X509Certificate {
            tbs: b"issuer-tbs-unused-in-these-tests",
            version: issuer_version,
            serial: &[0x02],
            signature_oid_inner: crate::cert::OID_SHA256_WITH_RSA.to_string(),
            issuer: Name { raw: issuer_raw, attributes: vec![] },
            not_before: b"200101000000Z",
            not_after: b"301231235959Z",
            subject: Name { raw: issuer_raw, attributes: vec![] },
            public_key: SubjectPublicKey::Rsa { n, e },
            issuer_unique_id: None,
            subject_unique_id: None,
            basic_constraints: if issuer_version >= 2 {
                Some(BasicConstraints { ca: issuer_is_ca, path_len_constraint: None })
            } else {
                None
            },
            signature_oid_outer: crate::cert::OID_SHA256_WITH_RSA.to_string(),
            signature: &[],
        };
        (leaf, issuer)
    }

    #[test]
    fn validate_accepts_correctly_signed_leaf() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes-as-they-appeared-on-the-wire";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let (leaf, issuer) = leaf_and_issuer(tbs, &signature, b"issuer-name", b"leaf-name", &n, &e, 2, true);
        assert!(validate(&leaf, &issuer).is_ok());
    }

    #[test]
    fn validate_rejects_mismatched_issuer_subject() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let (leaf, issuer) =
            leaf_and_issuer(tbs, &signature, b"issuer-name", b"leaf-name", &n, &e, 2, true);
        let mut issuer = issuer;
        issuer.subject.raw = b"different-name";
        assert_eq!(
            validate(&leaf, &issuer),
            Err(StackError::BadCertificate("issuer does not match issuer certificate subject"))
        );
    }

    #[test]
    fn validate_rejects_non_ca_v3_issuer() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let (leaf, issuer) =
            leaf_and_issuer(tbs, &signature, b"issuer-name", b"leaf-name", &n, &e, 2, false);
        assert_eq!(
            validate(&leaf, &issuer),
            Err(StackError::BadCertificate("issuer certificate is not a CA"))
        );
    }

    #[test]
    fn validate_allows_v1_issuer_without_basic_constraints() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let (leaf, issuer) =
            leaf_and_issuer(tbs, &signature, b"issuer-name", b"leaf-name", &n, &e, 0, false);
        assert!(validate(&leaf, &issuer).is_ok());
    }

    #[test]
    fn validate_rejects_tampered_tbs() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let tampered_tbs: &[u8] = b"tbs-bytex";
        let (leaf, issuer) = leaf_and_issuer(
            tampered_tbs,
            &signature,
            b"issuer-name",
            b"leaf-name",
            &n,
            &e,
            2,
            true,
        );
        assert_eq!(validate(&leaf, &issuer), Err(StackError::InvalidSignature));
    }

    #[test]
    fn validate_rejects_unsupported_signature_oid() {
        let (pubkey, privkey) = identity_rsa_keypair(64);
        let n = pubkey.n.to_bytes_be_padded(64);
        let e = pubkey.e.to_bytes_be_padded(64);
        let tbs = b"tbs-bytes";
        let digest = crypto::digest::digest::<crypto::Sha256>(tbs);
        let signature = rsa::sign(&privkey, &digest).unwrap();

        let (mut leaf, issuer) =
            leaf_and_issuer(tbs, &signature, b"issuer-name", b"leaf-name", &n, &e, 2, true);
        leaf.signature_oid_outer = "9.9.9.9".to_string();
        assert_eq!(validate(&leaf, &issuer), Err(StackError::UnsupportedSignatureAlgo));
    }

    #[test]
    fn validate_accepts_dsa_signed_leaf() {
        let params = DsaParams {
            p: bignum::Bignum::from_u64(283),
            q: bignum::Bignum::from_u64(47),
            g: bignum::Bignum::from_u64(60),
        };
        let x = bignum::Bignum::from_u64(24);
        let y = params.g.exp_mod(&x, &params.p).unwrap();
        let privkey = pkey::dsa::DsaPrivateKey { params: params.clone(), x };
        let pubkey_bytes_p = params.p.to_bytes_be();
        let pubkey_bytes_q = params.q.to_bytes_be();
        let pubkey_bytes_g = params.g.to_bytes_be();
        let pubkey_bytes_y = y.to_bytes_be();

        let tbs = b"dsa-tbs-bytes";
        let digest = [0x11u8; 20]; // SHA-1-sized, matches DSA's classic pairing
        let mut rng = Xorshift64::new(77);
        let sig = dsa::sign(&privkey, &digest, &mut rng).unwrap();
        let encoded_sig = dsa::encode_signature(&sig);

        let leaf = X509Certificate {
            tbs,
            version: 2,
            serial: &[0x01],
            signature_oid_inner: crate::cert::OID_DSA_WITH_SHA1.to_string(),
            issuer: Name { raw: b"issuer-name", attributes: vec![] },
            not_before: b"230101000000Z",
            not_after: b"251231235959Z",
            subject: Name { raw: b"leaf-name", attributes: vec![] },
            public_key: SubjectPublicKey::Dsa {
                p: &pubkey_bytes_p,
                q: &pubkey_bytes_q,
                g: &pubkey_bytes_g,
                y: &pubkey_bytes_y,
            },
            issuer_unique_id: None,
            subject_unique_id: None,
            basic_constraints: None,
            signature_oid_outer: crate::cert::OID_DSA_WITH_SHA1.to_string(),
            signature: &encoded_sig,
        };
        let issuer = X509Certificate {
            tbs: b"issuer-tbs",
            version: 2,
            serial: &[0x02],
            signature_oid_inner: crate::cert::OID_DSA_WITH_SHA1.to_string(),
            issuer: Name { raw: b"issuer-name", attributes: vec![] },
            not_before: b"200101000000Z",
            not_after: b"301231235959Z",
            subject: Name { raw: b"issuer-name", attributes: vec![] },
            public_key: SubjectPublicKey::Dsa {
                p: &pubkey_bytes_p,
                q: &pubkey_bytes_q,
                g: &pubkey_bytes_g,
                y: &pubkey_bytes_y,
            },
            issuer_unique_id: None,
            subject_unique_id: None,
            basic_constraints: Some(BasicConstraints { ca: true, path_len_constraint: None }),
            signature_oid_outer: crate::cert::OID_DSA_WITH_SHA1.to_string(),
            signature: &[],
        };

        assert!(validate(&leaf, &issuer).is_ok());
    }

    #[test]
    fn parse_then_validate_self_signed_rejects_mismatched_signature() {
        // A syntactically valid certificate whose signature bytes are
        // garbage must fail validation even though parsing succeeds.
        fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
            let mut out = vec![tag, value.len() as u8];
            out.extend_from_slice(value);
            out
        }
        fn der_seq(parts: &[&[u8]]) -> Vec<u8> {
            let mut value = Vec::new();
            for part in parts {
                value.extend_from_slice(part);
            }
            der_tlv(0x30, &value)
        }
        let cn_oid = [0x55, 0x04, 0x03];
        let name = {
            let atv = der_seq(&[&der_tlv(0x06, &cn_oid), &der_tlv(0x13, b"Self")]);
            der_seq(&[&der_tlv(0x31, &atv)])
        };
        let alg_id = der_seq(&[&der_tlv(0x06, &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B]), &der_tlv(0x05, &[])]);
        let validity = der_seq(&[&der_tlv(0x17, b"230101000000Z"), &der_tlv(0x17, b"251231235959Z")]);
        let rsa_pub = der_seq(&[&der_tlv(0x02, &[0x01, 0xAB]), &der_tlv(0x02, &[0x01, 0x01])]);
        let spki = {
            let mut bits = vec![0x00];
            bits.extend_from_slice(&rsa_pub);
            der_seq(&[&alg_id, &der_tlv(0x03, &bits)])
        };
        let tbs = der_seq(&[&der_tlv(0x02, &[0x01]), &alg_id, &name, &validity, &name, &spki]);
        let sig = der_tlv(0x03, &[0x00, 0x01, 0x02, 0x03]);
        let cert_der = der_seq(&[&tbs, &alg_id, &sig]);

        let cert = parse_certificate(&cert_der).unwrap();
        assert_eq!(validate(&cert, &cert), Err(StackError::InvalidSignature));
    }
}
