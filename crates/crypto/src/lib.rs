/// Cryptographic primitives for the network stack.
///
/// All implementations are from scratch with zero external dependencies.
///
/// # Modules
///
/// - [`digest`] — shared hash interface unifying MD5/SHA-1/SHA-256/SHA-384/SHA-512
/// - [`md5`] — MD5 hash function (RFC 1321)
/// - [`sha1`] — SHA-1 hash function (FIPS 180-4)
/// - [`sha256`] — SHA-256 hash function (FIPS 180-4)
/// - [`sha2_64`] — SHA-384/SHA-512 hash functions (FIPS 180-4)
/// - [`hmac`] — HMAC message authentication, generic over [`digest::Digest`] (RFC 2104)
/// - [`prf`] — TLS/SSL pseudo-random function family (§4.2)
/// - [`aes`] — AES-128/256 block cipher, CBC mode (FIPS 197)
/// - [`gcm`] — AES-GCM authenticated encryption (NIST SP 800-38D)
/// - [`rc4`] — RC4 stream cipher
/// - [`prng`] — random byte sources implementing `common::RandomSource`
/// - [`constant_time`] — constant-time comparison utilities

pub mod digest;
pub mod md5;
pub mod sha1;
pub mod sha256;
pub mod sha2_64;
pub mod hmac;
pub mod prf;
pub mod aes;
pub mod gcm;
pub mod rc4;
pub mod prng;
pub mod constant_time;

// Re-export the most commonly used items at the crate root for convenience.

pub use digest::Digest;
pub use md5::{Md5, md5};
pub use sha1::{Sha1, sha1};
pub use sha256::{Sha256, sha256};
pub use sha2_64::{Sha384, Sha512, sha384, sha512};
pub use hmac::{Hmac, HmacSha256, hmac, hmac_sha256};
pub use prf::{prf_tls10, prf_tls12_sha256, prf_tls12_sha384, ssl3_prf};
pub use aes::{AesKeySchedule, aes_encrypt_block, aes_decrypt_block, cbc_encrypt, cbc_decrypt};
pub use gcm::AesGcm;
pub use rc4::Rc4;
pub use prng::{OsRandom, Xorshift64};
pub use constant_time::ct_eq;
