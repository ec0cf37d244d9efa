use crate::keys::{DerivedKeys, Seed};
use crate::{layout, Error, Half, KeyMaterial, CASCADE_TAG, TAG_SIZE, UID_SIZE};
use aes::cipher::{KeyIvInit, StreamCipher};
use byteorder::{ReadBytesExt, BE};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Decrypted record in internal byte order, integrity tags recomputed.
///
/// Produced by [`TagCodec::decrypt`], or from an already-plaintext image via
/// [`TagData::from_bytes`]. Mutating the serial through [`TagData::set_uid`]
/// keeps the hardware check bytes and the PWD/PACK registers consistent; the
/// integrity tags are a property of the whole record and are only rewritten
/// when the record is encrypted again.
#[derive(Clone, PartialEq, Eq)]
pub struct TagData {
    internal: [u8; TAG_SIZE],
}

impl TagData {
    /// Wrap a plaintext internal-order image. Only the shape is checked here;
    /// the serial's check bytes are normalized so a hand-assembled image ends
    /// up consistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let internal: [u8; TAG_SIZE] =
            bytes.try_into().map_err(|_| Error::RecordSize(bytes.len()))?;
        let mut data = TagData { internal };
        let uid = data.uid();
        if uid[0] != CASCADE_TAG {
            data.set_uid(uid)?;
        }
        Ok(data)
    }

    pub(crate) fn from_internal(internal: [u8; TAG_SIZE]) -> Self {
        TagData { internal }
    }

    pub fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.internal
    }

    /// The 7-byte hardware serial (BCC0 stripped out).
    pub fn uid(&self) -> [u8; UID_SIZE] {
        let stored = &self.internal[layout::UID..layout::UID + layout::UID_LEN];
        let mut uid = [0; UID_SIZE];
        uid[..3].copy_from_slice(&stored[..3]);
        uid[3..].copy_from_slice(&stored[4..8]);
        uid
    }

    /// Replace the serial, recomputing BCC0/BCC1 and the serial-derived
    /// PWD/PACK registers. The payload is untouched.
    pub fn set_uid(&mut self, uid: [u8; UID_SIZE]) -> Result<(), Error> {
        if uid[0] == CASCADE_TAG {
            return Err(Error::ReservedUid(uid[0]));
        }
        let (bcc0, bcc1) = layout::bcc(&uid);
        let stored = &mut self.internal[layout::UID..layout::UID + layout::UID_LEN];
        stored[..3].copy_from_slice(&uid[..3]);
        stored[3] = bcc0;
        stored[4..8].copy_from_slice(&uid[3..]);
        self.internal[layout::BCC1] = bcc1;
        self.internal[layout::PWD..layout::PWD + 4].copy_from_slice(&layout::password(&uid));
        self.internal[layout::PACK..layout::PACK + 2].copy_from_slice(&[0x80, 0x80]);
        Ok(())
    }

    /// Figurine identifier (character, variant, model, series).
    pub fn figure_id(&self) -> u64 {
        (&self.internal[layout::FIGURE_ID..])
            .read_u64::<BE>()
            .expect("image is longer than the id field")
    }

    pub fn write_counter(&self) -> u16 {
        (&self.internal[layout::WRITE_COUNTER..])
            .read_u16::<BE>()
            .expect("image is longer than the counter field")
    }

    /// The region covered by the stream cipher (settings and app data).
    pub fn payload(&self) -> &[u8] {
        &self.internal[layout::CRYPT..layout::CRYPT + layout::CRYPT_LEN]
    }

    pub fn tag_hmac(&self) -> &[u8] {
        &self.internal[layout::TAG_HMAC..layout::TAG_HMAC + layout::HMAC_LEN]
    }

    pub fn data_hmac(&self) -> &[u8] {
        &self.internal[layout::DATA_HMAC..layout::DATA_HMAC + layout::HMAC_LEN]
    }
}

impl std::fmt::Debug for TagData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TagData(uid {}, figure {:#018x})",
            hex::encode(self.uid()),
            self.figure_id()
        )
    }
}

/// Codec over one set of master key material.
///
/// Stateless apart from the immutable keys; a single instance can be shared
/// across threads.
#[derive(Debug, Clone)]
pub struct TagCodec {
    keys: KeyMaterial,
}

impl TagCodec {
    pub fn new(keys: KeyMaterial) -> Self {
        TagCodec { keys }
    }

    /// Decrypt and verify a raw dump in tag byte order.
    ///
    /// Both halves are checked against their stored integrity tags in
    /// constant time; a record derived from unverified seed bytes never
    /// escapes this function.
    pub fn decrypt(&self, dump: &[u8]) -> Result<TagData, Error> {
        let tag: &[u8; TAG_SIZE] = dump.try_into().map_err(|_| Error::DumpSize(dump.len()))?;
        let internal = layout::to_internal(tag);

        let seed = Seed::from_internal(&internal);
        let tag_keys = self.keys.derive(Half::Tag, &seed);
        let data_keys = self.keys.derive(Half::Data, &seed);

        let mut plain = internal;
        crypt(&data_keys, &mut plain);

        // Recompute both tags over the plaintext. Order matters: the data
        // tag covers the tag tag.
        write_hmac(
            &tag_keys.hmac_key,
            &plain.clone(),
            layout::TAG_HMAC_INPUT,
            layout::TAG_HMAC_INPUT_LEN,
            &mut plain,
            layout::TAG_HMAC,
        );
        write_hmac(
            &data_keys.hmac_key,
            &plain.clone(),
            layout::DATA_HMAC_INPUT,
            layout::DATA_HMAC_INPUT_LEN,
            &mut plain,
            layout::DATA_HMAC,
        );

        for (half, offset) in [
            (Half::Tag, layout::TAG_HMAC),
            (Half::Data, layout::DATA_HMAC),
        ] {
            let computed = &plain[offset..offset + layout::HMAC_LEN];
            let stored = &internal[offset..offset + layout::HMAC_LEN];
            if !bool::from(computed.ct_eq(stored)) {
                return Err(Error::Integrity(half));
            }
        }

        tracing::debug!(uid = %hex::encode(&plain[layout::UID..layout::UID + 3]), "decrypted dump");
        Ok(TagData::from_internal(plain))
    }

    /// Run the decrypt pipeline for its verdict only.
    pub fn validate(&self, dump: &[u8]) -> Result<(), Error> {
        self.decrypt(dump).map(|_| ())
    }

    /// Re-encrypt a record into a dump in tag byte order.
    ///
    /// Keys are derived from the record's current serial and write counter,
    /// so a mutated serial re-keys the cipher on its own. Fails only on a
    /// malformed record (reserved serial byte smuggled in via
    /// [`TagData::from_bytes`]).
    pub fn encrypt(&self, data: &TagData) -> Result<[u8; TAG_SIZE], Error> {
        let uid = data.uid();
        if uid[0] == CASCADE_TAG {
            return Err(Error::ReservedUid(uid[0]));
        }

        // Recompute the hardware check bytes. BCC0 sits inside the signed
        // serial block, but BCC1 is covered by neither integrity tag and
        // would otherwise carry a stale value straight from the source dump.
        let mut out = data.internal;
        let (bcc0, bcc1) = layout::bcc(&uid);
        out[layout::UID + 3] = bcc0;
        out[layout::BCC1] = bcc1;

        let seed = Seed::from_internal(&out);
        let tag_keys = self.keys.derive(Half::Tag, &seed);
        let data_keys = self.keys.derive(Half::Data, &seed);

        write_hmac(
            &tag_keys.hmac_key,
            &out.clone(),
            layout::TAG_HMAC_INPUT,
            layout::TAG_HMAC_INPUT_LEN,
            &mut out,
            layout::TAG_HMAC,
        );
        write_hmac(
            &data_keys.hmac_key,
            &out.clone(),
            layout::DATA_HMAC_INPUT,
            layout::DATA_HMAC_INPUT_LEN,
            &mut out,
            layout::DATA_HMAC,
        );
        crypt(&data_keys, &mut out);

        Ok(layout::to_tag(&out))
    }
}

/// AES-CTR over the encrypted region, in place. Symmetric for both
/// directions; only the data-half keys drive the cipher.
fn crypt(keys: &DerivedKeys, image: &mut [u8; TAG_SIZE]) {
    let mut cipher = Aes128Ctr::new(&keys.aes_key.into(), &keys.aes_iv.into());
    cipher.apply_keystream(&mut image[layout::CRYPT..layout::CRYPT + layout::CRYPT_LEN]);
}

fn write_hmac(
    key: &[u8; 16],
    input: &[u8],
    input_offset: usize,
    input_len: usize,
    output: &mut [u8],
    output_offset: usize,
) {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(&input[input_offset..input_offset + input_len]);
    output[output_offset..output_offset + layout::HMAC_LEN]
        .copy_from_slice(&mac.finalize().into_bytes());
}
