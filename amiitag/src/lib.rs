mod error;
mod keys;
mod layout;
mod serial;
mod tag;

pub use {
    error::*,
    keys::{KeyMaterial, KEY_FILE_SIZE},
    serial::RandomSerials,
    tag::*,
};

/// Full size of an NTAG215 figurine dump.
pub const TAG_SIZE: usize = 540;

/// Length of the 7-byte hardware serial (check bytes excluded).
pub const UID_SIZE: usize = 7;

/// ISO 14443-3 cascade tag. Reserved; a serial must never start with it.
pub const CASCADE_TAG: u8 = 0x88;

/// Manufacturer code generated serials start with (NXP).
pub const NXP_MANUFACTURER: u8 = 0x04;

/// The format splits the signed region into two independently keyed halves.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum Half {
    /// Hardware identity block, keyed from the "locked secret" master key.
    Tag,
    /// Application payload, keyed from the "unfixed infos" master key.
    Data,
}
