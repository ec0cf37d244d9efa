use crate::{layout, Error, Half, TAG_SIZE};
use byteorder::ReadBytesExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io::Read;

type HmacSha256 = Hmac<Sha256>;

/// Combined retail key file: "unfixed infos" blob followed by "locked secret".
pub const KEY_FILE_SIZE: usize = 160;
const MASTER_KEY_SIZE: usize = 80;
pub(crate) const MAGIC_BYTES_MAX: u8 = 16;

const SEED_SIZE: usize = 64;
const DRBG_OUTPUT_SIZE: usize = 32;

/// One 80-byte master key blob.
#[derive(Clone)]
struct MasterKey {
    hmac_key: [u8; 16],
    type_string: [u8; 14],
    magic_size: u8,
    magic_bytes: [u8; 16],
    xor_pad: [u8; 32],
}

impl MasterKey {
    fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut hmac_key = [0; 16];
        reader.read_exact(&mut hmac_key)?;
        let mut type_string = [0; 14];
        reader.read_exact(&mut type_string)?;
        let _rfu = reader.read_u8()?;
        let magic_size = reader.read_u8()?;
        let mut magic_bytes = [0; 16];
        reader.read_exact(&mut magic_bytes)?;
        let mut xor_pad = [0; 32];
        reader.read_exact(&mut xor_pad)?;
        if magic_size > MAGIC_BYTES_MAX {
            return Err(Error::MagicBytes(magic_size));
        }
        Ok(Self {
            hmac_key,
            type_string,
            magic_size,
            magic_bytes,
            xor_pad,
        })
    }

    /// Build the derivation input for this blob: type string (NUL included),
    /// the seed head padded out by the magic bytes, the doubled serial, and
    /// the salt folded through the xor pad.
    fn prepare(&self, seed: &Seed) -> Vec<u8> {
        let type_len = self
            .type_string
            .iter()
            .position(|&b| b == 0)
            .map(|i| i + 1)
            .unwrap_or(self.type_string.len());
        let magic_size = self.magic_size as usize;

        let mut input = Vec::with_capacity(type_len + 0x20 + 0x20);
        input.extend_from_slice(&self.type_string[..type_len]);
        input.extend_from_slice(&seed.0[..0x10 - magic_size]);
        input.extend_from_slice(&self.magic_bytes[..magic_size]);
        input.extend_from_slice(&seed.0[0x10..0x20]);
        input.extend(
            seed.0[0x20..0x40]
                .iter()
                .zip(&self.xor_pad)
                .map(|(s, p)| s ^ p),
        );
        input
    }

    fn derive(&self, seed: &Seed) -> DerivedKeys {
        let input = self.prepare(seed);
        let cipher = drbg_step(&self.hmac_key, &input, 0);
        let mac = drbg_step(&self.hmac_key, &input, 1);
        DerivedKeys {
            aes_key: cipher[..16].try_into().unwrap(),
            aes_iv: cipher[16..].try_into().unwrap(),
            hmac_key: mac[..16].try_into().unwrap(),
        }
    }
}

/// One iteration of the HMAC-SHA256 DRBG the format derives keys with.
fn drbg_step(hmac_key: &[u8; 16], input: &[u8], iteration: u16) -> [u8; DRBG_OUTPUT_SIZE] {
    let mut mac = HmacSha256::new_from_slice(hmac_key).expect("hmac accepts any key length");
    mac.update(&iteration.to_be_bytes());
    mac.update(input);
    mac.finalize().into_bytes().into()
}

/// Per-record keys, derived fresh for every decrypt/encrypt call.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct DerivedKeys {
    pub(crate) aes_key: [u8; 16],
    pub(crate) aes_iv: [u8; 16],
    pub(crate) hmac_key: [u8; 16],
}

/// Non-secret per-tag bytes mixed into derivation: write counter, serial
/// (doubled), and keygen salt, all sliced from the internal image.
pub(crate) struct Seed([u8; SEED_SIZE]);

impl Seed {
    pub(crate) fn from_internal(internal: &[u8; TAG_SIZE]) -> Self {
        let mut seed = [0; SEED_SIZE];
        seed[0x00..0x02]
            .copy_from_slice(&internal[layout::WRITE_COUNTER..layout::WRITE_COUNTER + 2]);
        seed[0x10..0x18].copy_from_slice(&internal[layout::UID..layout::UID + layout::UID_LEN]);
        seed[0x18..0x20].copy_from_slice(&internal[layout::UID..layout::UID + layout::UID_LEN]);
        seed[0x20..0x40].copy_from_slice(&internal[layout::SALT..layout::SALT + layout::SALT_LEN]);
        Seed(seed)
    }
}

/// The two long-lived master key blobs. Opaque; never printed.
#[derive(Clone)]
pub struct KeyMaterial {
    unfixed_info: MasterKey,
    locked_secret: MasterKey,
}

impl KeyMaterial {
    /// Parse a combined 160-byte retail key file.
    pub fn from_combined(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != KEY_FILE_SIZE {
            return Err(Error::KeySize {
                got: bytes.len(),
                expected: KEY_FILE_SIZE,
            });
        }
        let mut reader = bytes;
        Ok(Self {
            unfixed_info: MasterKey::read(&mut reader)?,
            locked_secret: MasterKey::read(&mut reader)?,
        })
    }

    /// Parse the two blobs from separate 80-byte buffers.
    pub fn from_separate(unfixed_info: &[u8], locked_secret: &[u8]) -> Result<Self, Error> {
        for blob in [unfixed_info, locked_secret] {
            if blob.len() != MASTER_KEY_SIZE {
                return Err(Error::KeySize {
                    got: blob.len(),
                    expected: MASTER_KEY_SIZE,
                });
            }
        }
        let (mut unfixed_info, mut locked_secret) = (unfixed_info, locked_secret);
        Ok(Self {
            unfixed_info: MasterKey::read(&mut unfixed_info)?,
            locked_secret: MasterKey::read(&mut locked_secret)?,
        })
    }

    /// Read a combined key file to the end.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, Error> {
        let mut bytes = Vec::with_capacity(KEY_FILE_SIZE);
        reader.read_to_end(&mut bytes)?;
        Self::from_combined(&bytes)
    }

    pub(crate) fn derive(&self, half: Half, seed: &Seed) -> DerivedKeys {
        match half {
            Half::Tag => self.locked_secret.derive(seed),
            Half::Data => self.unfixed_info.derive(seed),
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key bytes stay out of logs
        f.write_str("KeyMaterial(..)")
    }
}
