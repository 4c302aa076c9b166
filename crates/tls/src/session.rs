/// Per-direction bulk cipher state, wrapping the generic [`crate::record`]
/// protect/unprotect functions behind a single enum so [`crate::client`] and
/// [`crate::server`] don't each re-derive the MAC-algorithm dispatch (§4.9).
use common::StackError;
use crypto::md5::Md5;
use crypto::sha1::Sha1;
use crypto::sha256::Sha256;
use crypto::{AesGcm, AesKeySchedule, Rc4};

use crate::handshake::{BulkCipher, CipherSpec, MacAlgo};
use crate::key_schedule::DirectionKeys;
use crate::record::{self, ContentType, ProtocolVersion};

pub enum CipherState {
    Cbc { mac_key: Vec<u8>, sched: AesKeySchedule, mac: MacAlgo, iv: [u8; 16] },
    Stream { mac_key: Vec<u8>, rc4: Rc4, mac: MacAlgo },
    Gcm { gcm: AesGcm, fixed_iv: [u8; 4] },
}

impl CipherState {
    pub fn new(spec: &CipherSpec, keys: &DirectionKeys) -> Result<Self, StackError> {
        match spec.bulk {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => {
                let sched = AesKeySchedule::new(&keys.enc_key)
                    .map_err(StackError::InvalidKey)?;
                let mut iv = [0u8; 16];
                if !keys.iv.is_empty() {
                    iv.copy_from_slice(&keys.iv);
                }
                Ok(Self::Cbc { mac_key: keys.mac_key.clone(), sched, mac: spec.mac, iv })
            }
            BulkCipher::Rc4_128 => {
                let rc4 = Rc4::new(&keys.enc_key).map_err(StackError::InvalidKey)?;
                Ok(Self::Stream { mac_key: keys.mac_key.clone(), rc4, mac: spec.mac })
            }
            BulkCipher::Aes128Gcm => {
                let gcm = AesGcm::new(&keys.enc_key);
                let mut fixed_iv = [0u8; 4];
                fixed_iv.copy_from_slice(&keys.iv);
                Ok(Self::Gcm { gcm, fixed_iv })
            }
        }
    }

    pub fn protect(&mut self, seq: u64, content_type: ContentType, version: ProtocolVersion, fragment: &[u8]) -> Vec<u8> {
        match self {
            Self::Cbc { mac_key, sched, mac, iv } => {
                let out = match mac {
                    MacAlgo::Md5 => record::cbc_protect::<Md5>(mac_key, sched, iv, seq, content_type, version, fragment),
                    MacAlgo::Sha1 => record::cbc_protect::<Sha1>(mac_key, sched, iv, seq, content_type, version, fragment),
                    MacAlgo::Sha256 => record::cbc_protect::<Sha256>(mac_key, sched, iv, seq, content_type, version, fragment),
                };
                if version.minor < ProtocolVersion::TLS1_1.minor {
                    let explicit_len = out.len().saturating_sub(16);
                    iv.copy_from_slice(&out[explicit_len..]);
                }
                out
            }
            Self::Stream { mac_key, rc4, mac } => match mac {
                MacAlgo::Md5 => record::stream_protect::<Md5>(mac_key, rc4, seq, content_type, version, fragment),
                MacAlgo::Sha1 => record::stream_protect::<Sha1>(mac_key, rc4, seq, content_type, version, fragment),
                MacAlgo::Sha256 => record::stream_protect::<Sha256>(mac_key, rc4, seq, content_type, version, fragment),
            },
            Self::Gcm { gcm, fixed_iv } => record::gcm_protect(gcm, fixed_iv, seq, content_type, version, fragment),
        }
    }

    pub fn unprotect(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        record_bytes: &[u8],
    ) -> Result<Vec<u8>, StackError> {
        let result = match self {
            Self::Cbc { mac_key, sched, mac, iv } => {
                let plaintext = match mac {
                    MacAlgo::Md5 => record::cbc_unprotect::<Md5>(mac_key, sched, iv, seq, content_type, version, record_bytes),
                    MacAlgo::Sha1 => record::cbc_unprotect::<Sha1>(mac_key, sched, iv, seq, content_type, version, record_bytes),
                    MacAlgo::Sha256 => record::cbc_unprotect::<Sha256>(mac_key, sched, iv, seq, content_type, version, record_bytes),
                };
                if version.minor < ProtocolVersion::TLS1_1.minor && record_bytes.len() >= 16 {
                    iv.copy_from_slice(&record_bytes[record_bytes.len() - 16..]);
                }
                plaintext
            }
            Self::Stream { mac_key, rc4, mac } => match mac {
                MacAlgo::Md5 => record::stream_unprotect::<Md5>(mac_key, rc4, seq, content_type, version, record_bytes),
                MacAlgo::Sha1 => record::stream_unprotect::<Sha1>(mac_key, rc4, seq, content_type, version, record_bytes),
                MacAlgo::Sha256 => record::stream_unprotect::<Sha256>(mac_key, rc4, seq, content_type, version, record_bytes),
            },
            Self::Gcm { gcm, fixed_iv } => record::gcm_unprotect(gcm, fixed_iv, seq, content_type, version, record_bytes),
        };
        result.map_err(StackError::DecodingFailed)
    }
}
