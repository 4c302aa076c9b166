/// Public-key algorithms used by the handshake engine (§4.3–§4.5): RSA
/// encryption/PKCS#1 signing, DSA signing, and Diffie–Hellman key agreement.
/// All built on `bignum::Bignum` modular arithmetic.

pub mod rsa;
pub mod dsa;
pub mod dh;

pub use rsa::{RsaPrivateKey, RsaPublicKey};
pub use dsa::{DsaParams, DsaPrivateKey, DsaPublicKey, DsaSignature};
pub use dh::{DhKeyPair, DhParams};
