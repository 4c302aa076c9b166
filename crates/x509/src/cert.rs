/// X.509 certificate parsing (§4.6), walking the outer
/// `SEQUENCE { TBSCertificate, signatureAlgorithm, signatureValue }`.
/// Optional TBS fields (issuer/subject unique IDs, extensions) are only
/// read when the certificate's version makes them legal, per §11.
use crate::asn1::{
    check_oid, decode_oid, DerReader, Tlv, CLASS_CONTEXT, CLASS_UNIVERSAL, TAG_BIT_STRING,
    TAG_BOOLEAN, TAG_GENERALIZED_TIME, TAG_INTEGER, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE,
    TAG_SET, TAG_UTC_TIME,
};
use common::StackError;

pub const OID_COMMON_NAME: &str = "2.5.4.3";
pub const OID_ORGANIZATION: &str = "2.5.4.10";
pub const OID_ORGANIZATIONAL_UNIT: &str = "2.5.4.11";
pub const OID_COUNTRY: &str = "2.5.4.6";
pub const OID_LOCALITY: &str = "2.5.4.7";
pub const OID_STATE: &str = "2.5.4.8";

pub const OID_BASIC_CONSTRAINTS: &str = "2.5.29.19";
pub const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
pub const OID_DSA: &str = "1.2.840.10040.4.1";

/// Signature algorithm OIDs §4.6 requires recognizing when selecting the
/// verification hash. SHA-224 variants are named but not implemented (no
/// `sha224` module exists in `crypto`); selecting one fails
/// `UnsupportedSignatureAlgo` just like a genuinely unknown OID.
pub const OID_MD5_WITH_RSA: &str = "1.2.840.113549.1.1.4";
pub const OID_SHA1_WITH_RSA: &str = "1.2.840.113549.1.1.5";
pub const OID_SHA224_WITH_RSA: &str = "1.2.840.113549.1.1.14";
pub const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
pub const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
pub const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";
pub const OID_DSA_WITH_SHA1: &str = "1.2.840.10040.4.3";
pub const OID_DSA_WITH_SHA224: &str = "2.16.840.1.101.3.4.3.1";
pub const OID_DSA_WITH_SHA256: &str = "2.16.840.1.101.3.4.3.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureHash {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa(SignatureHash),
    Dsa(SignatureHash),
}

pub fn classify_signature_oid(oid: &str) -> Result<SignatureAlgorithm, StackError> {
    use SignatureAlgorithm::*;
    use SignatureHash::*;
    match oid {
        OID_MD5_WITH_RSA => Ok(Rsa(Md5)),
        OID_SHA1_WITH_RSA => Ok(Rsa(Sha1)),
        OID_SHA256_WITH_RSA => Ok(Rsa(Sha256)),
        OID_SHA384_WITH_RSA => Ok(Rsa(Sha384)),
        OID_SHA512_WITH_RSA => Ok(Rsa(Sha512)),
        OID_DSA_WITH_SHA1 => Ok(Dsa(Sha1)),
        OID_DSA_WITH_SHA256 => Ok(Dsa(Sha256)),
        _ => Err(StackError::UnsupportedSignatureAlgo),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdnAttribute<'a> {
    pub oid: String,
    pub value: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name<'a> {
    /// Raw DER bytes of the Name SEQUENCE, used for the byte-exact
    /// issuer/subject comparison §4.6's validation step 1 requires.
    pub raw: &'a [u8],
    pub attributes: Vec<RdnAttribute<'a>>,
}

impl<'a> Name<'a> {
    pub fn common_name(&self) -> Option<&'a [u8]> {
        self.attributes
            .iter()
            .find(|a| a.oid == OID_COMMON_NAME)
            .map(|a| a.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len_constraint: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectPublicKey<'a> {
    Rsa { n: &'a [u8], e: &'a [u8] },
    Dsa { p: &'a [u8], q: &'a [u8], g: &'a [u8], y: &'a [u8] },
    Unknown { oid: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Certificate<'a> {
    pub tbs: &'a [u8],
    pub version: u8,
    pub serial: &'a [u8],
    pub signature_oid_inner: String,
    pub issuer: Name<'a>,
    pub not_before: &'a [u8],
    pub not_after: &'a [u8],
    pub subject: Name<'a>,
    pub public_key: SubjectPublicKey<'a>,
    pub issuer_unique_id: Option<&'a [u8]>,
    pub subject_unique_id: Option<&'a [u8]>,
    pub basic_constraints: Option<BasicConstraints>,
    pub signature_oid_outer: String,
    pub signature: &'a [u8],
}

pub fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, StackError> {
    let mut outer = DerReader::new(der);
    let cert_seq = outer.read_tlv()?;
    expect_universal_sequence(&cert_seq)?;

    let mut inner = DerReader::new(cert_seq.value);

    let tbs_tlv = inner.read_tlv()?;
    expect_universal_sequence(&tbs_tlv)?;
    let tbs = &cert_seq.value[tbs_tlv.header_start..tbs_tlv.header_start + tbs_tlv.total_len];

    let (
        version,
        serial,
        signature_oid_inner,
        issuer,
        not_before,
        not_after,
        subject,
        public_key,
        issuer_unique_id,
        subject_unique_id,
        basic_constraints,
    ) = parse_tbs(tbs_tlv.value)?;

    let sig_alg_tlv = inner.read_tlv()?;
    let signature_oid_outer = extract_algorithm_oid(sig_alg_tlv.value)?;

    let sig_tlv = inner.read_tlv()?;
    if sig_tlv.tag.class != CLASS_UNIVERSAL || sig_tlv.tag.number != TAG_BIT_STRING {
        return Err(StackError::InvalidTag("signatureValue is not a BIT STRING"));
    }
    let signature = bit_string_bytes(sig_tlv.value)?;

    Ok(X509Certificate {
        tbs,
        version,
        serial,
        signature_oid_inner,
        issuer,
        not_before,
        not_after,
        subject,
        public_key,
        issuer_unique_id,
        subject_unique_id,
        basic_constraints,
        signature_oid_outer,
        signature,
    })
}

#[allow(clippy::type_complexity)]
fn parse_tbs(
    data: &[u8],
) -> Result<
    (
        u8,
        &[u8],
        String,
        Name<'_>,
        &[u8],
        &[u8],
        Name<'_>,
        SubjectPublicKey<'_>,
        Option<&[u8]>,
        Option<&[u8]>,
        Option<BasicConstraints>,
    ),
    StackError,
> {
    let mut tbs = DerReader::new(data);

    let mut version = 0u8;
    if tbs.peek_tag().map(|t| t.class == CLASS_CONTEXT && t.number == 0) == Some(true) {
        let version_ctx = tbs.read_tlv()?;
        let mut inner = DerReader::new(version_ctx.value);
        let version_int = inner.read_tlv()?;
        if version_int.tag.class != CLASS_UNIVERSAL || version_int.tag.number != TAG_INTEGER {
            return Err(StackError::InvalidHeader("version is not an INTEGER"));
        }
        version = *version_int.value.last().unwrap_or(&0);
    }

    let serial_tlv = tbs.read_tlv()?;
    if serial_tlv.tag.number != TAG_INTEGER {
        return Err(StackError::InvalidHeader("serialNumber is not an INTEGER"));
    }
    let serial = serial_tlv.value;

    let sig_alg_tlv = tbs.read_tlv()?;
    let signature_oid_inner = extract_algorithm_oid(sig_alg_tlv.value)?;

    let issuer_tlv = tbs.read_tlv()?;
    expect_universal_sequence(&issuer_tlv)?;
    let issuer = parse_name(issuer_tlv.value, data_slice(data, &issuer_tlv))?;

    let validity_tlv = tbs.read_tlv()?;
    let (not_before, not_after) = parse_validity(validity_tlv.value)?;

    let subject_tlv = tbs.read_tlv()?;
    expect_universal_sequence(&subject_tlv)?;
    let subject = parse_name(subject_tlv.value, data_slice(data, &subject_tlv))?;

    let spki_tlv = tbs.read_tlv()?;
    expect_universal_sequence(&spki_tlv)?;
    let public_key = parse_spki(spki_tlv.value)?;

    let mut issuer_unique_id = None;
    let mut subject_unique_id = None;
    let mut basic_constraints = None;

    if version >= 1 && tbs.peek_tag().map(|t| t.class == CLASS_CONTEXT && t.number == 1) == Some(true) {
        let tlv = tbs.read_tlv()?;
        issuer_unique_id = Some(tlv.value);
    }
    if version >= 1 && tbs.peek_tag().map(|t| t.class == CLASS_CONTEXT && t.number == 2) == Some(true) {
        let tlv = tbs.read_tlv()?;
        subject_unique_id = Some(tlv.value);
    }
    if version >= 2 && tbs.peek_tag().map(|t| t.class == CLASS_CONTEXT && t.number == 3) == Some(true) {
        let ext_container = tbs.read_tlv()?;
        basic_constraints = parse_extensions(ext_container.value)?;
    }

    Ok((
        version,
        serial,
        signature_oid_inner,
        issuer,
        not_before,
        not_after,
        subject,
        public_key,
        issuer_unique_id,
        subject_unique_id,
        basic_constraints,
    ))
}

/// Helper so `parse_name` can be handed the raw DER slice (tag + length +
/// value) a `Tlv` describes, for the byte-exact Name comparison.
fn data_slice<'a>(data: &'a [u8], tlv: &Tlv<'a>) -> &'a [u8] {
    &data[tlv.header_start..tlv.header_start + tlv.total_len]
}

fn expect_universal_sequence(tlv: &Tlv) -> Result<(), StackError> {
    if tlv.tag.class != CLASS_UNIVERSAL || tlv.tag.number != TAG_SEQUENCE || !tlv.tag.constructed {
        return Err(StackError::InvalidTag("expected a universal SEQUENCE"));
    }
    Ok(())
}

fn parse_name<'a>(value: &'a [u8], raw: &'a [u8]) -> Result<Name<'a>, StackError> {
    let mut attributes = Vec::new();
    let mut reader = DerReader::new(value);
    while !reader.is_empty() {
        let set_tlv = reader.read_tlv()?;
        if set_tlv.tag.number != TAG_SET {
            continue;
        }
        let mut set_reader = DerReader::new(set_tlv.value);
        while !set_reader.is_empty() {
            let atv_tlv = set_reader.read_tlv()?;
            if atv_tlv.tag.number != TAG_SEQUENCE {
                continue;
            }
            let mut atv = DerReader::new(atv_tlv.value);
            let oid_tlv = atv.read_tlv()?;
            if oid_tlv.tag.number != TAG_OID {
                continue;
            }
            let oid = decode_oid(oid_tlv.value);
            let val_tlv = atv.read_tlv()?;
            attributes.push(RdnAttribute { oid, value: val_tlv.value });
        }
    }
    Ok(Name { raw, attributes })
}

fn parse_validity(data: &[u8]) -> Result<(&[u8], &[u8]), StackError> {
    let mut reader = DerReader::new(data);
    let not_before_tlv = reader.read_tlv()?;
    if not_before_tlv.tag.number != TAG_UTC_TIME && not_before_tlv.tag.number != TAG_GENERALIZED_TIME {
        return Err(StackError::InvalidHeader("notBefore is not a recognized Time"));
    }
    let not_after_tlv = reader.read_tlv()?;
    if not_after_tlv.tag.number != TAG_UTC_TIME && not_after_tlv.tag.number != TAG_GENERALIZED_TIME {
        return Err(StackError::InvalidHeader("notAfter is not a recognized Time"));
    }
    Ok((not_before_tlv.value, not_after_tlv.value))
}

fn extract_algorithm_oid(data: &[u8]) -> Result<String, StackError> {
    let mut reader = DerReader::new(data);
    let oid_tlv = reader.read_tlv()?;
    if oid_tlv.tag.number != TAG_OID {
        return Err(StackError::InvalidHeader("AlgorithmIdentifier missing OID"));
    }
    Ok(decode_oid(oid_tlv.value))
}

fn bit_string_bytes(value: &[u8]) -> Result<&[u8], StackError> {
    if value.is_empty() {
        return Err(StackError::InvalidLength("empty BIT STRING"));
    }
    Ok(&value[1..])
}

fn parse_spki(value: &[u8]) -> Result<SubjectPublicKey<'_>, StackError> {
    let mut reader = DerReader::new(value);
    let alg_tlv = reader.read_tlv()?;
    expect_universal_sequence(&alg_tlv)?;
    let mut alg = DerReader::new(alg_tlv.value);
    let oid_tlv = alg.read_tlv()?;
    if oid_tlv.tag.number != TAG_OID {
        return Err(StackError::InvalidHeader("SPKI algorithm missing OID"));
    }
    let oid = decode_oid(oid_tlv.value);

    let key_bits_tlv = reader.read_tlv()?;
    if key_bits_tlv.tag.number != TAG_BIT_STRING {
        return Err(StackError::InvalidTag("subjectPublicKey is not a BIT STRING"));
    }
    let key_bytes = bit_string_bytes(key_bits_tlv.value)?;

    match oid.as_str() {
        OID_RSA_ENCRYPTION => {
            let mut key_reader = DerReader::new(key_bytes);
            let seq = key_reader.read_tlv()?;
            expect_universal_sequence(&seq)?;
            let mut fields = DerReader::new(seq.value);
            let n_tlv = fields.read_tlv()?;
            let e_tlv = fields.read_tlv()?;
            if n_tlv.tag.number != TAG_INTEGER || e_tlv.tag.number != TAG_INTEGER {
                return Err(StackError::InvalidHeader("RSAPublicKey fields are not INTEGERs"));
            }
            Ok(SubjectPublicKey::Rsa { n: n_tlv.value, e: e_tlv.value })
        }
        OID_DSA => {
            // Domain parameters (p, q, g) live in the AlgorithmIdentifier's
            // parameters field, the public value y in subjectPublicKey.
            let params_tlv = alg.read_tlv()?;
            expect_universal_sequence(&params_tlv)?;
            let mut params = DerReader::new(params_tlv.value);
            let p_tlv = params.read_tlv()?;
            let q_tlv = params.read_tlv()?;
            let g_tlv = params.read_tlv()?;

            let mut key_reader = DerReader::new(key_bytes);
            let y_tlv = key_reader.read_tlv()?;
            if y_tlv.tag.number != TAG_INTEGER {
                return Err(StackError::InvalidHeader("DSA public key is not an INTEGER"));
            }
            Ok(SubjectPublicKey::Dsa {
                p: p_tlv.value,
                q: q_tlv.value,
                g: g_tlv.value,
                y: y_tlv.value,
            })
        }
        other => Ok(SubjectPublicKey::Unknown { oid: other.to_string() }),
    }
}

/// Walk `Extensions ::= SEQUENCE OF Extension` and return BasicConstraints
/// if present; other extensions are skipped since nothing else in §4.6
/// needs them.
fn parse_extensions(ctx_value: &[u8]) -> Result<Option<BasicConstraints>, StackError> {
    let mut ext_reader = DerReader::new(ctx_value);
    let ext_seq = ext_reader.read_tlv()?;
    expect_universal_sequence(&ext_seq)?;

    let mut exts = DerReader::new(ext_seq.value);
    let mut basic_constraints = None;

    while !exts.is_empty() {
        let ext_tlv = exts.read_tlv()?;
        expect_universal_sequence(&ext_tlv)?;
        let mut ext = DerReader::new(ext_tlv.value);

        let oid_tlv = ext.read_tlv()?;
        if oid_tlv.tag.number != TAG_OID {
            continue;
        }
        let oid = decode_oid(oid_tlv.value);

        if ext.peek_tag().map(|t| t.number == TAG_BOOLEAN) == Some(true) {
            let _critical = ext.read_tlv()?;
        }

        let value_tlv = ext.read_tlv()?;
        if value_tlv.tag.number != TAG_OCTET_STRING {
            continue;
        }

        if oid == OID_BASIC_CONSTRAINTS {
            basic_constraints = Some(parse_basic_constraints(value_tlv.value)?);
        }
    }

    Ok(basic_constraints)
}

fn parse_basic_constraints(data: &[u8]) -> Result<BasicConstraints, StackError> {
    let mut reader = DerReader::new(data);
    let seq = reader.read_tlv()?;
    expect_universal_sequence(&seq)?;

    let mut inner = DerReader::new(seq.value);
    let mut ca = false;
    let mut path_len_constraint = None;

    if inner.peek_tag().map(|t| t.number == TAG_BOOLEAN) == Some(true) {
        let tlv = inner.read_tlv()?;
        ca = tlv.value.first().copied().unwrap_or(0) != 0;
    }
    if inner.peek_tag().map(|t| t.number == TAG_INTEGER) == Some(true) {
        let tlv = inner.read_tlv()?;
        let mut v = 0u32;
        for &b in tlv.value {
            v = (v << 8) | b as u32;
        }
        path_len_constraint = Some(v);
    }

    Ok(BasicConstraints { ca, path_len_constraint })
}

pub fn check_oid_matches(tlv: &Tlv, expected: &str) -> Result<(), StackError> {
    check_oid(tlv, expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        if value.len() < 128 {
            out.push(value.len() as u8);
        } else if value.len() < 256 {
            out.push(0x81);
            out.push(value.len() as u8);
        } else {
            out.push(0x82);
            out.push((value.len() >> 8) as u8);
            out.push((value.len() & 0xFF) as u8);
        }
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

    fn build_name(cn: &[u8]) -> Vec<u8> {
        let cn_oid = [0x55, 0x04, 0x03];
        let atv = der_seq(&[&der_tlv(TAG_OID, &cn_oid), &der_tlv(0x13, cn)]);
        let rdn = der_tlv(0x31, &atv);
        der_seq(&[&rdn])
    }

    fn build_rsa_spki() -> Vec<u8> {
        let n = der_tlv(TAG_INTEGER, &[0x00, 0xAB, 0xCD]);
        let e = der_tlv(TAG_INTEGER, &[0x01, 0x00, 0x01]);
        let rsa_pub_key = der_seq(&[&n, &e]);
        let bit_string = {
            let mut v = vec![0x00];
            v.extend_from_slice(&rsa_pub_key);
            der_tlv(TAG_BIT_STRING, &v)
        };
        let alg_id = der_seq(&[
            &der_tlv(TAG_OID, &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01]),
            &der_tlv(0x05, &[]),
        ]);
        der_seq(&[&alg_id, &bit_string])
    }

    fn build_cert(version_byte: u8) -> Vec<u8> {
        let alg_id = der_seq(&[
            &der_tlv(TAG_OID, &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B]),
            &der_tlv(0x05, &[]),
        ]);
        let issuer = build_name(b"Root");
        let subject = build_name(b"Leaf");
        let validity = der_seq(&[
            &der_tlv(TAG_UTC_TIME, b"230101000000Z"),
            &der_tlv(TAG_UTC_TIME, b"251231235959Z"),
        ]);
        let spki = build_rsa_spki();

        let version_ctx = der_tlv(0xA0, &der_tlv(TAG_INTEGER, &[version_byte]));

        let mut tbs_parts: Vec<Vec<u8>> = vec![
            version_ctx,
            der_tlv(TAG_INTEGER, &[0x01]),
            alg_id.clone(),
            issuer,
            validity,
            subject,
            spki,
        ];

        if version_byte >= 2 {
            let bc = der_seq(&[&der_tlv(TAG_BOOLEAN, &[0xFF])]);
            let bc_octet = der_tlv(TAG_OCTET_STRING, &bc);
            let ext = der_seq(&[&der_tlv(TAG_OID, &[0x55, 0x1D, 0x13]), &bc_octet]);
            let extensions = der_seq(&[&ext]);
            tbs_parts.push(der_tlv(0xA3, &extensions));
        }

        let tbs_refs: Vec<&[u8]> = tbs_parts.iter().map(|p| p.as_slice()).collect();
        let tbs = der_seq(&tbs_refs);

        let sig = der_tlv(TAG_BIT_STRING, &[0x00, 0xDE, 0xAD]);
        der_seq(&[&tbs, &alg_id, &sig])
    }

    #[test]
    fn parses_v3_certificate_with_basic_constraints() {
        let der = build_cert(2);
        let cert = parse_certificate(&der).unwrap();
        assert_eq!(cert.version, 2);
        assert_eq!(cert.issuer.common_name(), Some(&b"Root"[..]));
        assert_eq!(cert.subject.common_name(), Some(&b"Leaf"[..]));
        assert_eq!(cert.not_before, b"230101000000Z");
        assert_eq!(cert.not_after, b"251231235959Z");
        assert_eq!(cert.basic_constraints, Some(BasicConstraints { ca: true, path_len_constraint: None }));
        assert_eq!(cert.signature, &[0xDE, 0xAD]);
        assert_eq!(cert.signature_oid_outer, OID_SHA256_WITH_RSA);
        match cert.public_key {
            SubjectPublicKey::Rsa { n, e } => {
                assert_eq!(n, &[0x00, 0xAB, 0xCD]);
                assert_eq!(e, &[0x01, 0x00, 0x01]);
            }
            _ => panic!("expected RSA public key"),
        }
    }

    #[test]
    fn v1_certificate_has_no_extensions_even_if_present_in_bytes_would_be_rejected() {
        let der = build_cert(0);
        let cert = parse_certificate(&der).unwrap();
        assert_eq!(cert.version, 0);
        assert_eq!(cert.basic_constraints, None);
    }

    #[test]
    fn classify_signature_oid_recognizes_rsa_sha256() {
        assert_eq!(
            classify_signature_oid(OID_SHA256_WITH_RSA).unwrap(),
            SignatureAlgorithm::Rsa(SignatureHash::Sha256)
        );
    }

    #[test]
    fn classify_signature_oid_rejects_sha224() {
        assert!(classify_signature_oid(OID_SHA224_WITH_RSA).is_err());
    }

    #[test]
    fn classify_signature_oid_rejects_unknown() {
        assert!(classify_signature_oid("9.9.9").is_err());
    }

    #[test]
    fn tbs_raw_bytes_match_original_der() {
        let der = build_cert(2);
        let cert = parse_certificate(&der).unwrap();
        // tbs must be the exact wire bytes so hashing it for signature
        // verification reproduces what the issuer actually signed.
        assert_eq!(cert.tbs[0], 0x30);
    }
}
