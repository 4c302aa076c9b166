//! # TLS client/server (SSL 3.0 through TLS 1.2)
//!
//! Record layer, legacy handshake state machine, master-secret/key-block
//! derivation, and high-level `TlsClient`/`TlsServer` types for RSA, DHE_RSA,
//! DHE_DSS, and DH_anon key exchange. Certificate parsing lives in the
//! sibling `x509` crate; RSA/DSA/DH key operations in `pkey`.
//! **Zero external crate dependencies.**

pub mod record;
pub mod handshake;
pub mod key_schedule;
pub mod session;
pub mod client;
pub mod server;
