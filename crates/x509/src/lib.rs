pub mod asn1;
pub mod cert;
pub mod validate;

pub use cert::{
    classify_signature_oid, BasicConstraints, Name, RdnAttribute, SignatureAlgorithm,
    SignatureHash, SubjectPublicKey, X509Certificate,
};
pub use validate::validate;
