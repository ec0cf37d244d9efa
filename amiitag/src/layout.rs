//! Fixed byte layout of a 540-byte dump.
//!
//! The crypto operates on a reordered "internal" image in which the signed
//! regions are contiguous; the tag itself stores the same bytes in hardware
//! page order. Offsets below are internal-image offsets unless noted.

use crate::{CASCADE_TAG, TAG_SIZE, UID_SIZE};

/// Serial plus BCC0 check byte, as laid out on pages 0-1 of the tag.
pub(crate) const UID: usize = 0x1D4;
pub(crate) const UID_LEN: usize = 0x8;
/// BCC1 check byte (tag offset 0x008).
pub(crate) const BCC1: usize = 0x000;
/// Big-endian write counter.
pub(crate) const WRITE_COUNTER: usize = 0x029;
/// Big-endian figurine identifier (character/model).
pub(crate) const FIGURE_ID: usize = 0x1DC;
/// Per-tag keygen salt mixed into derivation.
pub(crate) const SALT: usize = 0x1E8;
pub(crate) const SALT_LEN: usize = 0x20;
/// AES-CTR region.
pub(crate) const CRYPT: usize = 0x02C;
pub(crate) const CRYPT_LEN: usize = 0x188;
/// Stored HMAC over the tag half.
pub(crate) const TAG_HMAC: usize = 0x1B4;
/// Input region of the tag-half HMAC.
pub(crate) const TAG_HMAC_INPUT: usize = 0x1D4;
pub(crate) const TAG_HMAC_INPUT_LEN: usize = 0x34;
/// Stored HMAC over the data half.
pub(crate) const DATA_HMAC: usize = 0x008;
/// Input region of the data-half HMAC (covers the tag-half HMAC at 0x1B4).
pub(crate) const DATA_HMAC_INPUT: usize = 0x029;
pub(crate) const DATA_HMAC_INPUT_LEN: usize = 0x1DF;
pub(crate) const HMAC_LEN: usize = 0x20;
/// Dynamic lock, CFG0/1, PWD and PACK pages, carried through unchanged by the
/// cipher (tag and internal offsets coincide).
pub(crate) const PASSTHROUGH: usize = 0x208;
/// PWD register (tag page 0x85).
pub(crate) const PWD: usize = 0x214;
/// PACK register.
pub(crate) const PACK: usize = 0x218;

/// (internal offset, tag offset, length) for every region of the image.
const SECTIONS: &[(usize, usize, usize)] = &[
    (0x000, 0x008, 0x008),
    (0x008, 0x080, 0x020),
    (0x028, 0x010, 0x024),
    (0x04C, 0x0A0, 0x168),
    (0x1B4, 0x034, 0x020),
    (0x1D4, 0x000, 0x008),
    (0x1DC, 0x054, 0x02C),
    (0x208, 0x208, 0x014),
];

pub(crate) fn to_internal(tag: &[u8; TAG_SIZE]) -> [u8; TAG_SIZE] {
    let mut out = [0; TAG_SIZE];
    for &(internal, hw, len) in SECTIONS {
        out[internal..internal + len].copy_from_slice(&tag[hw..hw + len]);
    }
    out
}

pub(crate) fn to_tag(internal: &[u8; TAG_SIZE]) -> [u8; TAG_SIZE] {
    let mut out = [0; TAG_SIZE];
    for &(intl, hw, len) in SECTIONS {
        out[hw..hw + len].copy_from_slice(&internal[intl..intl + len]);
    }
    out
}

/// Check bytes over a serial: BCC0 covers the first cascade level (with the
/// cascade tag folded in), BCC1 the second.
pub(crate) fn bcc(uid: &[u8; UID_SIZE]) -> (u8, u8) {
    (
        CASCADE_TAG ^ uid[0] ^ uid[1] ^ uid[2],
        uid[3] ^ uid[4] ^ uid[5] ^ uid[6],
    )
}

/// PWD register value readers derive from the serial.
pub(crate) fn password(uid: &[u8; UID_SIZE]) -> [u8; 4] {
    [
        uid[1] ^ uid[3] ^ 0xAA,
        uid[2] ^ uid[4] ^ 0x55,
        uid[3] ^ uid[5] ^ 0xAA,
        uid[4] ^ uid[6] ^ 0x55,
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reorder_round_trip() {
        let mut tag = [0u8; TAG_SIZE];
        for (i, b) in tag.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        assert_eq!(to_tag(&to_internal(&tag)), tag);

        let mut internal = [0u8; TAG_SIZE];
        for (i, b) in internal.iter_mut().enumerate() {
            *b = (i % 239) as u8;
        }
        assert_eq!(to_internal(&to_tag(&internal)), internal);
    }

    #[test]
    fn test_sections_cover_image() {
        let mut seen = [false; TAG_SIZE];
        for &(internal, _, len) in SECTIONS {
            for s in &mut seen[internal..internal + len] {
                assert!(!*s, "overlapping internal section");
                *s = true;
            }
        }
        assert!(seen.iter().all(|s| *s));

        let mut seen = [false; TAG_SIZE];
        for &(_, hw, len) in SECTIONS {
            for s in &mut seen[hw..hw + len] {
                assert!(!*s, "overlapping tag section");
                *s = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_bcc() {
        let uid = [0x04, 0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6];
        let (bcc0, bcc1) = bcc(&uid);
        assert_eq!(bcc0, 0x88 ^ 0x04 ^ 0xA1 ^ 0xB2);
        assert_eq!(bcc1, 0xC3 ^ 0xD4 ^ 0xE5 ^ 0xF6);
    }
}
